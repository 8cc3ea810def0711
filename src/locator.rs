//! File discovery and classification.
//!
//! The rest of the crate treats this module as a provider of `Path -> Kind`
//! classification: suffix and name-pattern rules assign each candidate file a
//! kind exactly once, and no other component mutates it afterwards.

use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::config::Config;
use crate::types::Kind;

/// Classify a path by its file name.
///
/// Name patterns win over bare suffixes: `metadata*.yml` is metadata even
/// though it is also YAML, and `questions*.md` is still markdown (the
/// questions-data kind is reserved for the generated YAML form).
///
/// # Panics
///
/// Panics if a hardcoded classification regex is invalid (compile-time
/// invariant).
pub fn classify(path: &Path) -> Kind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let metadata = Regex::new(r"^metadata.*\.ya?ml$").expect("valid regex");
    let questions_data = Regex::new(r"^questions.*\.ya?ml$").expect("valid regex");

    if metadata.is_match(&name) {
        return Kind::Metadata;
    }
    if questions_data.is_match(&name) {
        return Kind::Questions;
    }
    if name.ends_with(".tex") && !name.ends_with(".md.tex") {
        return Kind::Document;
    }
    if name.ends_with(".md") || name.ends_with(".mdown") || name.ends_with(".markdown") {
        return Kind::Markdown;
    }
    if name.ends_with(".bib") {
        return Kind::Bibliography;
    }
    return Kind::Other;
}

/// Whether a file name matches the "questions" markdown naming pattern,
/// the authorable source a questions data file is generated from.
pub fn is_questions_markdown(name: &str) -> bool {
    let pattern = Regex::new(r"^questions.*\.(md|mdown|markdown)$").expect("valid regex");
    return pattern.is_match(&name.to_lowercase());
}

/// Walk `root` and yield every classified file passing the config filters,
/// in sorted order for deterministic batches.
pub fn discover(root: &Path, config: &Config) -> Vec<(PathBuf, Kind)> {
    let mut found: Vec<(PathBuf, Kind)> = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !config.should_scan(&relative.to_string_lossy()) {
            continue;
        }
        found.push((path.to_path_buf(), classify(path)));
    }

    return found;
}

/// Convenience filter over `discover` output.
pub fn of_kind(files: &[(PathBuf, Kind)], kind: Kind) -> Vec<PathBuf> {
    return files
        .iter()
        .filter(|(_, k)| *k == kind)
        .map(|(p, _)| p.clone())
        .collect();
}

/// Dot-directories (`.git` and friends) never contain authorable sources.
fn is_hidden(path: &Path) -> bool {
    return path
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.') && n.to_string_lossy().len() > 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_suffix() {
        assert_eq!(classify(Path::new("syllabus.tex")), Kind::Document);
        assert_eq!(classify(Path::new("chapter.md")), Kind::Markdown);
        assert_eq!(classify(Path::new("chapter.markdown")), Kind::Markdown);
        assert_eq!(classify(Path::new("refs.bib")), Kind::Bibliography);
        assert_eq!(classify(Path::new("logo.eps")), Kind::Other);
    }

    #[test]
    fn markdown_tex_is_not_a_document() {
        assert_eq!(classify(Path::new("chapter.md.tex")), Kind::Other);
    }

    #[test]
    fn name_patterns_win_over_suffixes() {
        assert_eq!(classify(Path::new("metadata.yml")), Kind::Metadata);
        assert_eq!(classify(Path::new("metadata-istqb.yaml")), Kind::Metadata);
        assert_eq!(classify(Path::new("questions.yml")), Kind::Questions);
        assert_eq!(classify(Path::new("questions-extra.yaml")), Kind::Questions);
        assert_eq!(classify(Path::new("other.yml")), Kind::Other);
    }

    #[test]
    fn questions_markdown_pattern() {
        assert!(is_questions_markdown("questions.md"));
        assert!(is_questions_markdown("Questions-sample.markdown"));
        assert!(!is_questions_markdown("chapter.md"));
        assert!(!is_questions_markdown("questions.yml"));
    }
}
