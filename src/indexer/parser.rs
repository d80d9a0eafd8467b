use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static TITLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid title pattern"));
static SECTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^##\s+(.+)$").expect("valid section pattern"));

/// One parsed markdown file of the book.
#[derive(Debug, Clone)]
pub struct BookDocument {
    /// Path relative to the source directory.
    pub file_path: String,
    /// First `#` heading, or the file stem when there is none.
    pub title: String,
    /// All `##` headings, in order.
    pub sections: Vec<String>,
    /// Parent directory name.
    pub chapter: String,
    pub content: String,
}

pub fn parse_markdown_file(root: &Path, path: &Path) -> Result<BookDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let file_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(parse_markdown(&content, file_path, stem, chapter_of(path)))
}

fn chapter_of(path: &Path) -> String {
    path.parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parse_markdown(content: &str, file_path: String, stem: String, chapter: String) -> BookDocument {
    let title = TITLE_PATTERN
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or(stem);

    let sections = SECTION_PATTERN
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect();

    BookDocument {
        file_path,
        title,
        sections,
        chapter,
        content: content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> BookDocument {
        parse_markdown(
            content,
            "ch01/intro.md".to_string(),
            "intro".to_string(),
            "ch01".to_string(),
        )
    }

    #[test]
    fn title_comes_from_first_h1() {
        let doc = parse("# Physical AI\n\nSome text.\n\n# Second Title\n");
        assert_eq!(doc.title, "Physical AI");
    }

    #[test]
    fn title_falls_back_to_file_stem() {
        let doc = parse("No headings here, just prose.\n");
        assert_eq!(doc.title, "intro");
    }

    #[test]
    fn sections_are_h2_headings_in_order() {
        let doc = parse("# Title\n\n## Sensors\n\ntext\n\n## Actuators\n\n### Not a section\n");
        assert_eq!(doc.sections, vec!["Sensors", "Actuators"]);
    }

    #[test]
    fn chapter_is_the_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let chapter_dir = dir.path().join("chapter-02");
        std::fs::create_dir(&chapter_dir).unwrap();
        let file = chapter_dir.join("kinematics.md");
        std::fs::write(&file, "# Kinematics\n").unwrap();

        let doc = parse_markdown_file(dir.path(), &file).unwrap();
        assert_eq!(doc.chapter, "chapter-02");
        assert_eq!(doc.file_path, "chapter-02/kinematics.md");
        assert_eq!(doc.title, "Kinematics");
    }
}
