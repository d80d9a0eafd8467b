use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively collect the markdown files under `dir`.
pub fn walk_markdown_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("md"))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_markdown_recursively_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("chapter-1");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("intro.md"), "# Intro").unwrap();
        std::fs::write(nested.join("section.MD"), "# Section").unwrap();
        std::fs::write(nested.join("notes.txt"), "not markdown").unwrap();

        let mut files = walk_markdown_files(dir.path());
        files.sort();

        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("section.MD"));
        assert!(files[1].ends_with("intro.md"));
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(walk_markdown_files(dir.path()).is_empty());
    }
}
