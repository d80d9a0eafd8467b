/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Bounds a chunk must satisfy to be embedded.
pub const MIN_CHUNK_CHARS: usize = 50;
pub const MAX_CHUNK_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
}

/// Round a byte position up to the next char boundary.
fn ceil_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Round a byte position down to the previous char boundary.
fn floor_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

pub fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.len() <= max_chunk_size {
        return vec![TextChunk {
            text: text.to_string(),
            chunk_index: 0,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chunk_index = 0;

    while start < text.len() {
        let end = ceil_char_boundary(text, (start + max_chunk_size).min(text.len()));

        let actual_end = if end < text.len() {
            find_break_point(text, start, end)
        } else {
            end
        };

        let chunk_text = text[start..actual_end].trim().to_string();
        if !chunk_text.is_empty() {
            chunks.push(TextChunk {
                text: chunk_text,
                chunk_index,
            });
            chunk_index += 1;
        }

        let next_start = if actual_end > overlap {
            floor_char_boundary(text, actual_end - overlap)
        } else {
            actual_end
        };

        if next_start <= start {
            start = actual_end;
        } else {
            start = next_start;
        }
    }

    chunks
}

/// Prefer paragraph breaks, then line breaks, then sentence ends, then
/// spaces; fall back to a hard cut.
fn find_break_point(text: &str, start: usize, max_end: usize) -> usize {
    let segment = &text[start..max_end];

    if let Some(pos) = segment.rfind("\n\n") {
        return start + pos + 2;
    }
    if let Some(pos) = segment.rfind('\n') {
        return start + pos + 1;
    }
    for sentinel in [". ", "? ", "! "] {
        if let Some(pos) = segment.rfind(sentinel) {
            return start + pos + sentinel.len();
        }
    }
    if let Some(pos) = segment.rfind(' ') {
        return start + pos + 1;
    }
    max_end
}

/// Whether a chunk is worth embedding.
pub fn validate_chunk(chunk: &str) -> Result<(), String> {
    let len = chunk.chars().count();
    if len < MIN_CHUNK_CHARS {
        return Err(format!(
            "chunk too short ({} chars, minimum {})",
            len, MIN_CHUNK_CHARS
        ));
    }
    if len > MAX_CHUNK_CHARS {
        return Err(format!(
            "chunk too long ({} chars, maximum {})",
            len, MAX_CHUNK_CHARS
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_is_a_single_chunk() {
        let chunks = chunk_text("short", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n  ", 100, 10).is_empty());
    }

    #[test]
    fn long_text_splits_with_sequential_indexes() {
        let text = "The robot walks forward. ".repeat(40);
        let chunks = chunk_text(&text, 200, 40);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn breaks_at_paragraph_boundaries_when_possible() {
        let paragraph = "word ".repeat(30);
        let text = format!("{}\n\n{}", paragraph.trim(), paragraph.trim());
        let chunks = chunk_text(&text, 180, 0);
        assert!(chunks[0].text.ends_with("word"));
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "alpha beta gamma delta ".repeat(30);
        let chunks = chunk_text(&text, 120, 40);
        assert!(chunks.len() > 1);
        let first_tail: String = chunks[0].text.chars().rev().take(10).collect();
        assert!(
            chunks[1].text.contains(first_tail.chars().rev().collect::<String>().trim()),
            "second chunk should repeat the tail of the first"
        );
    }

    #[test]
    fn multibyte_text_never_splits_inside_a_char() {
        let text = "géométrie et cinématique du robot humanoïde. ".repeat(20);
        let chunks = chunk_text(&text, 100, 20);
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn chunk_validation_bounds() {
        assert!(validate_chunk("too short").is_err());
        let valid = "v".repeat(MIN_CHUNK_CHARS);
        assert!(validate_chunk(&valid).is_ok());
        let long = "v".repeat(MAX_CHUNK_CHARS + 1);
        assert!(validate_chunk(&long).is_err());
    }
}
