//! Reference graph builder: from a top-level document to the fragments it
//! references.
//!
//! Recognizes two directive shapes, `\markdownInput[opts]{path}` and
//! `\addbibresource{path}`, resolves each path argument relative to the
//! including document, and infers the authorable markdown sibling of a
//! structured-questions data file. Pure path resolution: a missing file is
//! the validator's problem, not this module's.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::context::RunContext;
use crate::error::Error;
use crate::locator;
use crate::types::{Directive, FileLocation, Kind};

/// Scan one document for inclusion directives, in source order.
///
/// Each directive record carries the character offset of its path argument so
/// "file not found" diagnostics can cite the literal argument and line.
///
/// # Errors
///
/// Returns `Error::Io` if the document cannot be read.
///
/// # Panics
///
/// Panics if a hardcoded directive regex is invalid (compile-time invariant).
pub fn scan_document(ctx: &mut RunContext, document: &Path) -> Result<Vec<Directive>, Error> {
    // The argument may span lines; (?s) lets `.` cross newlines as in the
    // LaTeX reader.
    let markdown_input = Regex::new(r"(?s)\\markdownInput(?:\[.*?\])?\{(.*?)\}").expect("valid regex");
    let add_bib_resource = Regex::new(r"(?s)\\addbibresource\{(.*?)\}").expect("valid regex");

    let text = ctx.read(document)?;
    let mut directives = Vec::new();

    for pattern in [&markdown_input, &add_bib_resource] {
        for captures in pattern.captures_iter(&text) {
            let Some(argument) = captures.get(1) else {
                continue;
            };
            directives.push(build_directive(document, argument.as_str(), argument.start()));
        }
    }

    directives.sort_by_key(|d| d.location.offset);
    return Ok(directives);
}

/// Flatten directive records into the ordered, deduplicated fragment set.
pub fn fragments(directives: &[Directive]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    for directive in directives {
        for path in &directive.resolved {
            if seen.insert(path.clone()) {
                paths.push(path.clone());
            }
        }
    }
    return paths;
}

/// Resolve one directive argument against the including document's directory.
fn build_directive(document: &Path, argument: &str, offset: usize) -> Directive {
    let argument_path = PathBuf::from(argument);
    let resolved_path = if argument_path.is_absolute() {
        normalize_path(&argument_path)
    } else {
        let base = document.parent().unwrap_or(Path::new(""));
        normalize_path(&base.join(&argument_path))
    };

    let mut resolved = vec![resolved_path.clone()];
    resolved.extend(questions_markdown_siblings(&resolved_path));

    return Directive {
        argument: argument_path,
        location: FileLocation::new(document, offset),
        resolved,
    };
}

/// For a structured-questions data file, also yield any sibling matching the
/// "questions" markdown naming pattern with the same stem. That sibling is
/// the authorable source the data file is generated from.
fn questions_markdown_siblings(path: &Path) -> Vec<PathBuf> {
    if locator::classify(path) != Kind::Questions {
        return Vec::new();
    }
    let Some(parent) = path.parent() else {
        return Vec::new();
    };
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
        return Vec::new();
    };

    let Ok(entries) = std::fs::read_dir(parent) else {
        return Vec::new();
    };
    let mut siblings: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            name.strip_prefix(&stem).is_some_and(|rest| rest.starts_with('.'))
                && locator::is_questions_markdown(&name)
        })
        .collect();
    siblings.sort();
    return siblings;
}

/// Collapse `.` and `..` components in a path without touching the filesystem.
/// Preserves leading `..` when there is nothing left to pop.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    components.last(),
                    Some(c) if !matches!(c, Component::ParentDir | Component::RootDir)
                );
                if can_pop {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            other => components.push(other),
        }
    }
    return components.iter().collect();
}
