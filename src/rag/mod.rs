pub mod embeddings;
pub mod vector_store;

use std::sync::Arc;

use anyhow::Result;

use crate::completion::CompletionClient;
use crate::models::SourceRef;
use self::embeddings::EmbeddingClient;
use self::vector_store::{RetrievedChunk, VectorStore};

/// How many chunks similarity search returns.
const TOP_K: u64 = 5;

/// How many retrieved chunks make it into the prompt.
const PROMPT_CHUNK_LIMIT: usize = 3;

/// Per-chunk character cap in the prompt.
const PROMPT_CHUNK_CHARS: usize = 300;

/// Maximum distinct sources returned to the caller.
const MAX_SOURCES: usize = 3;

const SYSTEM_INSTRUCTIONS: &str = "\
You are a friendly AI assistant helping readers understand a book's content.

CORE BEHAVIOR:
- Be conversational, clear, and professional
- Provide helpful explanations based on the book content
- Write in natural paragraphs (not bullet points unless listing specific items)
- Never mention \"RAG\", \"chunks\", \"tools\", \"embeddings\", or internal processes
- Never show similarity scores, debug info, or technical artifacts

RESPONSE FORMAT:
- Start directly with your answer (no meta-commentary)
- Use 2-3 clear paragraphs to explain concepts
- Sound like a knowledgeable tutor, not a robot
- Keep explanations accessible but accurate";

const NO_CONTEXT_ANSWER: &str =
    "I couldn't find relevant information in the book to answer your question.";

const GREETING_ANSWER: &str =
    "Hello! I'm here to help you with questions about the book. What would you like to know?";

const THANKS_ANSWER: &str =
    "You're welcome! Feel free to ask if you have any other questions.";

const GREETING_WORDS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
    "howdy",
];

const THANKS_WORDS: &[&str] = &["thanks", "thank you", "thx", "ty", "appreciate"];

/// Coarse classification of an incoming message, used to answer
/// conversational filler without touching any external API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Greeting,
    Thanks,
    Ambiguous,
    Knowledge,
}

fn classify(message: &str) -> QueryKind {
    let lower = message.trim().to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    if GREETING_WORDS
        .iter()
        .any(|w| lower == *w || (words.len() <= 2 && words.contains(w)))
    {
        return QueryKind::Greeting;
    }

    if words.len() <= 3 && THANKS_WORDS.iter().any(|w| lower.contains(w)) {
        return QueryKind::Thanks;
    }

    // One- to three-letter queries ("ai") and bare single words need
    // clarification before retrieval is worth the cost.
    let trimmed = message.trim();
    if trimmed.chars().count() <= 3 && trimmed.chars().all(|c| c.is_alphabetic()) {
        return QueryKind::Ambiguous;
    }
    if words.len() == 1 && trimmed.chars().count() > 3 {
        return QueryKind::Ambiguous;
    }

    QueryKind::Knowledge
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when
/// anything was cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

fn build_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .take(PROMPT_CHUNK_LIMIT)
        .enumerate()
        .map(|(i, chunk)| {
            let section = if chunk.section.is_empty() {
                "Unknown"
            } else {
                &chunk.section
            };
            format!(
                "[Source {} - {}]:\n{}",
                i + 1,
                section,
                truncate_chars(&chunk.content, PROMPT_CHUNK_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "A student asks: \"{}\"\n\n\
         Here's relevant information from the book:\n{}\n\n\
         Provide a clear, natural explanation in 2-3 paragraphs. Write conversationally - \
         no bullet points, no meta-commentary, no mention of \"sources\" or \"context\". \
         Just explain the concept clearly.",
        question, context
    )
}

/// Collapse retrieved chunks into the source list shown to the caller,
/// keeping the first hit per section.
fn dedup_sources(chunks: &[RetrievedChunk]) -> Vec<SourceRef> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();

    for chunk in chunks {
        if !seen.insert(chunk.section.clone()) {
            continue;
        }
        sources.push(SourceRef {
            file_path: chunk.file_path.clone(),
            section: chunk.section.clone(),
            relevance_score: chunk.score,
        });
        if sources.len() >= MAX_SOURCES {
            break;
        }
    }

    sources
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub context_used: bool,
}

/// The retrieval-augmented query pipeline: classify, retrieve, assemble a
/// prompt, and call the completion API.
pub struct RagEngine {
    embeddings: Arc<EmbeddingClient>,
    vector_store: Arc<VectorStore>,
    completion: CompletionClient,
}

impl RagEngine {
    pub fn new(
        embeddings: Arc<EmbeddingClient>,
        vector_store: Arc<VectorStore>,
        completion: CompletionClient,
    ) -> Self {
        Self {
            embeddings,
            vector_store,
            completion,
        }
    }

    /// Answer a question. With `selected_text` the supplied excerpt is the
    /// only context and vector search is bypassed; otherwise the whole book
    /// index is searched.
    pub async fn answer(&self, question: &str, selected_text: Option<&str>) -> Result<RagAnswer> {
        match classify(question) {
            QueryKind::Greeting => {
                return Ok(RagAnswer {
                    answer: GREETING_ANSWER.to_string(),
                    sources: Vec::new(),
                    context_used: false,
                })
            }
            QueryKind::Thanks => {
                return Ok(RagAnswer {
                    answer: THANKS_ANSWER.to_string(),
                    sources: Vec::new(),
                    context_used: false,
                })
            }
            QueryKind::Ambiguous => {
                return Ok(RagAnswer {
                    answer: format!(
                        "I'd be happy to explain '{}'! Could you provide a bit more detail? \
                         For example, are you asking about its definition, how it works, or \
                         where it appears in the book?",
                        question.trim()
                    ),
                    sources: Vec::new(),
                    context_used: false,
                })
            }
            QueryKind::Knowledge => {}
        }

        match selected_text {
            Some(text) => self.answer_selection(question, text).await,
            None => self.answer_full_book(question).await,
        }
    }

    async fn answer_full_book(&self, question: &str) -> Result<RagAnswer> {
        let query_vector = self.embeddings.embed_query(question).await?;
        let chunks = self.vector_store.search(query_vector, TOP_K).await?;

        if chunks.is_empty() {
            tracing::warn!("no context chunks found for query");
            return Ok(RagAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                context_used: false,
            });
        }

        let prompt = build_prompt(question, &chunks);
        let answer = self.completion.generate(SYSTEM_INSTRUCTIONS, &prompt).await?;

        Ok(RagAnswer {
            answer,
            sources: dedup_sources(&chunks),
            context_used: true,
        })
    }

    async fn answer_selection(&self, question: &str, selected_text: &str) -> Result<RagAnswer> {
        let chunk = RetrievedChunk {
            content: selected_text.to_string(),
            file_path: "selected_text".to_string(),
            section: "selected".to_string(),
            chapter: "selected".to_string(),
            chunk_index: 0,
            score: 1.0,
        };

        let prompt = build_prompt(question, std::slice::from_ref(&chunk));
        let answer = self.completion.generate(SYSTEM_INSTRUCTIONS, &prompt).await?;

        // The caller supplied the context, so there are no sources to cite.
        Ok(RagAnswer {
            answer,
            sources: Vec::new(),
            context_used: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, section: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            file_path: format!("chapters/{}.md", section),
            section: section.to_string(),
            chapter: "chapters".to_string(),
            chunk_index: 0,
            score,
        }
    }

    #[test]
    fn classifies_greetings() {
        assert_eq!(classify("hello"), QueryKind::Greeting);
        assert_eq!(classify("Hey there"), QueryKind::Greeting);
        assert_eq!(classify("good morning"), QueryKind::Greeting);
    }

    #[test]
    fn classifies_thanks() {
        assert_eq!(classify("thanks"), QueryKind::Thanks);
        assert_eq!(classify("thank you"), QueryKind::Thanks);
    }

    #[test]
    fn classifies_short_queries_as_ambiguous() {
        assert_eq!(classify("ai"), QueryKind::Ambiguous);
        assert_eq!(classify("actuators"), QueryKind::Ambiguous);
    }

    #[test]
    fn classifies_real_questions_as_knowledge() {
        assert_eq!(
            classify("How does inverse kinematics work?"),
            QueryKind::Knowledge
        );
    }

    #[test]
    fn prompt_contains_question_and_labelled_sources() {
        let chunks = vec![
            chunk("Robots use sensors.", "Sensing", 0.9),
            chunk("Motors move joints.", "Actuation", 0.8),
        ];
        let prompt = build_prompt("How do robots sense?", &chunks);
        assert!(prompt.contains("A student asks: \"How do robots sense?\""));
        assert!(prompt.contains("[Source 1 - Sensing]:"));
        assert!(prompt.contains("[Source 2 - Actuation]:"));
    }

    #[test]
    fn prompt_takes_at_most_three_chunks() {
        let chunks: Vec<RetrievedChunk> = (0..5)
            .map(|i| chunk("content", &format!("Section{}", i), 0.5))
            .collect();
        let prompt = build_prompt("question here", &chunks);
        assert!(prompt.contains("[Source 3 - Section2]:"));
        assert!(!prompt.contains("[Source 4"));
    }

    #[test]
    fn prompt_truncates_long_chunks_on_char_boundaries() {
        let long = "é".repeat(500);
        let chunks = vec![chunk(&long, "Unicode", 0.9)];
        let prompt = build_prompt("question here", &chunks);
        let rendered: String = "é".repeat(300);
        assert!(prompt.contains(&format!("{}...", rendered)));
        assert!(!prompt.contains(&"é".repeat(301)));
    }

    #[test]
    fn truncate_keeps_short_text_intact() {
        assert_eq!(truncate_chars("short", 300), "short");
    }

    #[test]
    fn sources_deduplicate_by_section_and_cap_at_three() {
        let chunks = vec![
            chunk("a", "Intro", 0.9),
            chunk("b", "Intro", 0.8),
            chunk("c", "Sensing", 0.7),
            chunk("d", "Actuation", 0.6),
            chunk("e", "Control", 0.5),
        ];
        let sources = dedup_sources(&chunks);
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].section, "Intro");
        assert_eq!(sources[0].relevance_score, 0.9);
        assert_eq!(sources[1].section, "Sensing");
        assert_eq!(sources[2].section, "Actuation");
    }
}
