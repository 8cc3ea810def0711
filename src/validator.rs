//! Cross-reference and citation validation for one top-level document.
//!
//! Confirms every directive argument exists, every identifier use resolves to
//! a definition, and every citation resolves to a bibliography entry, all
//! scoped to the fragments reachable from that document. Validation fails
//! fast on the first unresolved use; unused-definition findings are non-fatal
//! warnings emitted independently, each at most once per process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::Config;
use crate::context::RunContext;
use crate::diagnostics;
use crate::error::Error;
use crate::graph;
use crate::locator;
use crate::registry::{self, Registry};
use crate::types::{Citation, CrossReference, Directive, FileLocation, Kind, Suggestion};

/// Characters allowed in a bibliography key, as used by both bracketed and
/// text citations. `:`/`.`/`?` are legal inside a key but are trimmed when
/// trailing, so sentence punctuation after a citation is not captured.
const KEY_CHARS: &str =
    "-abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789#$%&+<>~/_:.?";

/// Validate one top-level document against its reachable fragments.
///
/// `discovered` is the full discovery listing, used for "file not found"
/// suggestions and for partitioning reachable fragments by kind.
///
/// # Errors
///
/// Returns the first `MissingFile`, `DuplicateDefinition`,
/// `MissingReference`, or `MissingCitation` encountered, or `Error::Io` on
/// unreadable files.
pub fn validate_document(
    ctx: &mut RunContext,
    config: &Config,
    document: &Path,
    discovered: &[(PathBuf, Kind)],
) -> Result<(), Error> {
    let directives = graph::scan_document(ctx, document)?;
    check_directive_targets(ctx, &directives, discovered)?;

    let reachable = graph::fragments(&directives);
    let md_paths: Vec<PathBuf> = reachable
        .iter()
        .filter(|p| p.exists() && locator::classify(p) == Kind::Markdown)
        .cloned()
        .collect();
    let bib_paths: Vec<PathBuf> = reachable
        .iter()
        .filter(|p| p.exists() && locator::classify(p) == Kind::Bibliography)
        .cloned()
        .collect();

    let identifiers = registry::markdown_identifiers(ctx, &md_paths)?;
    let bib_keys = registry::bibliography_keys(ctx, &bib_paths)?;

    let mut references: Vec<CrossReference> = Vec::new();
    let mut citations: Vec<Citation> = Vec::new();
    for path in &md_paths {
        let text = ctx.read(path)?;
        references.extend(cross_references(&text, path));
        citations.extend(extract_citations(&text, path));
    }

    // Warnings are independent of the fail-fast pass below; emit them first
    // so an early error does not suppress them.
    let mut warned = warn_unused(ctx, &identifiers, &references, md_paths.len(), document)?;
    warned += warn_unused_citations(ctx, &bib_keys, &citations, document)?;

    for reference in &references {
        if identifiers.get(&reference.name).is_some() || config.is_builtin(&reference.name) {
            continue;
        }
        return Err(missing_reference(ctx, reference, &identifiers, md_paths.len(), document)?);
    }

    for citation in &citations {
        if bib_keys.get(&citation.key).is_some() || config.is_builtin(&citation.key) {
            continue;
        }
        return Err(missing_citation(ctx, citation, &bib_keys, bib_paths.len(), document)?);
    }

    tracing::info!(
        "validated document \"{}\": {} fragments, {} cross-references, {} citations, {} new warnings",
        document.display(),
        reachable.len(),
        references.len(),
        citations.len(),
        warned
    );
    return Ok(());
}

/// Extract identifier uses from fragment text: relative autolinks `<#name>`
/// and relative direct links `](#name)`, in positional order.
///
/// # Panics
///
/// Panics if a hardcoded link regex is invalid (compile-time invariant).
pub fn cross_references(text: &str, path: &Path) -> Vec<CrossReference> {
    let autolink = Regex::new(r"<#(.+?)>").expect("valid regex");
    let direct_link = Regex::new(r"\]\(#(.+?)\)").expect("valid regex");

    let mut references = Vec::new();
    for pattern in [&autolink, &direct_link] {
        for captures in pattern.captures_iter(text) {
            if let Some(name) = captures.get(1) {
                references.push(CrossReference {
                    location: FileLocation::new(path, name.start()),
                    name: name.as_str().to_string(),
                });
            }
        }
    }
    references.sort_by_key(|r| r.location.offset);
    return references;
}

/// Extract citations from fragment text: `@` followed by a key token.
///
/// Word-boundary protection: an `@` directly preceded by a key character or
/// another `@` is embedded in some other token (an email address, a doubled
/// `@@`) and is not a citation. Keys may contain internal `:`/`.`/`?`;
/// trailing runs of those characters are sentence punctuation and are
/// trimmed from the captured key.
pub fn extract_citations(text: &str, path: &Path) -> Vec<Citation> {
    let mut citations = Vec::new();
    let bytes = text.as_bytes();
    let mut position = 0usize;

    while let Some(at) = text[position..].find('@').map(|i| position + i) {
        position = at + 1;
        if at > 0 {
            let previous = bytes[at - 1] as char;
            if previous == '@' || KEY_CHARS.contains(previous) {
                continue;
            }
        }
        let key_start = at + 1;
        let key_end = text[key_start..]
            .find(|c: char| !KEY_CHARS.contains(c))
            .map_or(text.len(), |i| key_start + i);
        if key_end == key_start {
            continue;
        }
        let key = text[key_start..key_end].trim_end_matches([':', '.', '?']);
        if key.is_empty() {
            continue;
        }
        citations.push(Citation {
            key: key.to_string(),
            location: FileLocation::new(path, key_start),
        });
        position = key_end;
    }

    return citations;
}

/// Raise `MissingFile` for the first directive whose resolved candidates all
/// fail to exist, suggesting the nearest discovered path.
fn check_directive_targets(
    ctx: &mut RunContext,
    directives: &[Directive],
    discovered: &[(PathBuf, Kind)],
) -> Result<(), Error> {
    for directive in directives {
        if directive.resolved.iter().any(|p| p.exists()) {
            continue;
        }
        let candidates: Vec<String> =
            discovered.iter().map(|(p, _)| p.display().to_string()).collect();
        let suggestion =
            diagnostics::nearest_match(&directive.argument.display().to_string(), candidates.iter().map(String::as_str));
        return Err(Error::MissingFile {
            argument: directive.argument.clone(),
            file: directive.location.path.clone(),
            line: ctx.line_number(&directive.location)?,
            suggestion,
        });
    }
    return Ok(());
}

/// Build the `MissingCitation` error for one unresolved citation.
fn missing_citation(
    ctx: &mut RunContext,
    citation: &Citation,
    bib_keys: &Registry,
    entry_count: usize,
    document: &Path,
) -> Result<Error, Error> {
    return Ok(Error::MissingCitation {
        document: document.to_path_buf(),
        entry_count,
        file: citation.location.path.clone(),
        key: citation.key.clone(),
        line: ctx.line_number(&citation.location)?,
        suggestion: nearest_definition(ctx, &citation.key, bib_keys)?,
    });
}

/// Build the `MissingReference` error for one unresolved identifier use.
fn missing_reference(
    ctx: &mut RunContext,
    reference: &CrossReference,
    identifiers: &Registry,
    fragment_count: usize,
    document: &Path,
) -> Result<Error, Error> {
    return Ok(Error::MissingReference {
        document: document.to_path_buf(),
        file: reference.location.path.clone(),
        fragment_count,
        line: ctx.line_number(&reference.location)?,
        name: reference.name.clone(),
        suggestion: nearest_definition(ctx, &reference.name, identifiers)?,
    });
}

/// The single nearest defined name, cited at its definition, when the
/// registry is non-empty.
fn nearest_definition(
    ctx: &mut RunContext,
    target: &str,
    registry: &Registry,
) -> Result<Option<Suggestion>, Error> {
    let Some(name) = diagnostics::nearest_match(target, registry.names()) else {
        return Ok(None);
    };
    let Some(definition) = registry.get(&name) else {
        return Ok(None);
    };
    let location = definition.location.clone();
    return Ok(Some(Suggestion {
        file: location.path.clone(),
        line: ctx.line_number(&location)?,
        name,
    }));
}

/// Warn once per unused identifier definition. Returns how many warnings
/// this call newly emitted.
fn warn_unused(
    ctx: &mut RunContext,
    identifiers: &Registry,
    references: &[CrossReference],
    fragment_count: usize,
    document: &Path,
) -> Result<usize, Error> {
    let used: HashSet<&str> = references.iter().map(|r| r.name.as_str()).collect();
    let mut emitted = 0_usize;
    for definition in identifiers.iter() {
        if used.contains(definition.name.as_str()) {
            continue;
        }
        let line = ctx.line_number(&definition.location)?;
        if diagnostics::warn_once(&format!(
            "identifier \"{}\" defined on line {} of file \"{}\" is unused in any of the {} markdown fragments of document \"{}\"",
            definition.name,
            line,
            definition.location.path.display(),
            fragment_count,
            document.display()
        )) {
            emitted += 1;
        }
    }
    return Ok(emitted);
}

/// Warn once per uncited bibliography entry. Returns how many warnings this
/// call newly emitted.
fn warn_unused_citations(
    ctx: &mut RunContext,
    bib_keys: &Registry,
    citations: &[Citation],
    document: &Path,
) -> Result<usize, Error> {
    let used: HashSet<&str> = citations.iter().map(|c| c.key.as_str()).collect();
    let mut emitted = 0_usize;
    for definition in bib_keys.iter() {
        if used.contains(definition.name.as_str()) {
            continue;
        }
        let line = ctx.line_number(&definition.location)?;
        if diagnostics::warn_once(&format!(
            "bibliography key \"{}\" defined on line {} of file \"{}\" is never cited by document \"{}\"",
            definition.name,
            line,
            definition.location.path.display(),
            document.display()
        )) {
            emitted += 1;
        }
    }
    return Ok(emitted);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.tex");
        (dir, doc)
    }

    fn validate(dir: &tempfile::TempDir, doc: &Path) -> Result<(), Error> {
        let config = Config::load(dir.path()).unwrap();
        let discovered = locator::discover(dir.path(), &config);
        let mut ctx = RunContext::new();
        validate_document(&mut ctx, &config, doc, &discovered)
    }

    #[test]
    fn cross_reference_shapes() {
        let refs = cross_references(
            "see <#section:intro> and [the figure](#figure:diagram-1)\n",
            Path::new("frag.md"),
        );
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["section:intro", "figure:diagram-1"]);
    }

    #[test]
    fn citation_extraction_trims_and_guards_boundaries() {
        let text = "As shown by @smith1999. Contact mail@example.com, not a citation.\n";
        let citations = extract_citations(text, Path::new("frag.md"));
        let keys: Vec<&str> = citations.iter().map(|c| c.key.as_str()).collect();
        // "example" after the email's @ must not be misread; "com" follows a
        // key char too.
        assert_eq!(keys, vec!["smith1999"]);
    }

    #[test]
    fn citation_keys_keep_internal_punctuation_but_trim_trailing() {
        let text = "compare @fowler:1999 with @knuth84. or even @ok?\n";
        let citations = extract_citations(text, Path::new("frag.md"));
        let keys: Vec<&str> = citations.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["fowler:1999", "knuth84", "ok"]);
    }

    #[test]
    fn citation_offsets_point_at_the_key() {
        let text = "cite @jones2001: here\n";
        let citations = extract_citations(text, Path::new("frag.md"));
        assert_eq!(citations[0].key, "jones2001");
        assert_eq!(citations[0].location.offset, 6);
    }

    #[test]
    fn valid_document_passes() {
        let (dir, doc) = repo();
        std::fs::write(&doc, "\\markdownInput{intro.md}\n\\addbibresource{refs.bib}\n").unwrap();
        std::fs::write(
            dir.path().join("intro.md"),
            "# Intro {#intro}\n\nsee <#section:intro> and @smith1999\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("refs.bib"), "@article{smith1999,\n}\n").unwrap();

        validate(&dir, &doc).unwrap();
    }

    #[test]
    fn missing_fragment_cites_argument_and_line() {
        let (dir, doc) = repo();
        std::fs::write(&doc, "% preamble\n\\markdownInput{missing.md}\n").unwrap();
        std::fs::write(dir.path().join("present.md"), "text\n").unwrap();

        let err = validate(&dir, &doc).unwrap_err();
        let Error::MissingFile { argument, line, .. } = err else {
            panic!("expected MissingFile, got {err}");
        };
        assert_eq!(argument, PathBuf::from("missing.md"));
        assert_eq!(line, 2);
    }

    #[test]
    fn missing_reference_suggests_nearest_definition() {
        let (dir, doc) = repo();
        std::fs::write(&doc, "\\markdownInput{intro.md}\n").unwrap();
        std::fs::write(
            dir.path().join("intro.md"),
            "# Intro {#intro}\n\nsee <#section:intr>\n",
        )
        .unwrap();

        let err = validate(&dir, &doc).unwrap_err();
        let Error::MissingReference { name, suggestion, line, .. } = err else {
            panic!("expected MissingReference, got {err}");
        };
        assert_eq!(name, "section:intr");
        assert_eq!(line, 3);
        let suggestion = suggestion.expect("registry non-empty");
        assert_eq!(suggestion.name, "section:intro");
        assert_eq!(suggestion.line, 1);
    }

    #[test]
    fn missing_citation_suggests_nearest_key() {
        let (dir, doc) = repo();
        std::fs::write(&doc, "\\markdownInput{ch.md}\n\\addbibresource{refs.bib}\n").unwrap();
        std::fs::write(dir.path().join("ch.md"), "cited @smith99 here\n").unwrap();
        std::fs::write(
            dir.path().join("refs.bib"),
            "@article{smith1999,\n}\n@book{jones2001,\n}\n",
        )
        .unwrap();

        let err = validate(&dir, &doc).unwrap_err();
        let Error::MissingCitation { key, suggestion, .. } = err else {
            panic!("expected MissingCitation, got {err}");
        };
        assert_eq!(key, "smith99");
        assert_eq!(suggestion.expect("bib non-empty").name, "smith1999");
    }

    #[test]
    fn unused_definitions_warn_exactly_once() {
        let (dir, doc) = repo();
        let fragment = dir.path().join("ch.md");
        std::fs::write(
            &fragment,
            "# Used {#used}\n\n# Spare {#spare}\n\nsee <#section:used>\n",
        )
        .unwrap();

        let mut ctx = RunContext::new();
        let identifiers = registry::markdown_identifiers(&mut ctx, &[fragment.clone()]).unwrap();
        let text = ctx.read(&fragment).unwrap();
        let references = cross_references(&text, &fragment);

        // Only the unreferenced definition is warned about.
        let first = warn_unused(&mut ctx, &identifiers, &references, 1, &doc).unwrap();
        assert_eq!(first, 1);

        // A second pass in the same process emits nothing new.
        let second = warn_unused(&mut ctx, &identifiers, &references, 1, &doc).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn uncited_bibliography_keys_warn_exactly_once() {
        let (dir, doc) = repo();
        let bib = dir.path().join("refs.bib");
        std::fs::write(&bib, "@article{cited2020,\n}\n@book{shelf1999,\n}\n").unwrap();

        let mut ctx = RunContext::new();
        let bib_keys = registry::bibliography_keys(&mut ctx, &[bib.clone()]).unwrap();
        let citations = extract_citations("see @cited2020\n", Path::new("ch.md"));

        let first = warn_unused_citations(&mut ctx, &bib_keys, &citations, &doc).unwrap();
        assert_eq!(first, 1);
        let second = warn_unused_citations(&mut ctx, &bib_keys, &citations, &doc).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn builtins_are_always_resolved() {
        let (dir, doc) = repo();
        std::fs::write(&doc, "\\markdownInput{ch.md}\n").unwrap();
        std::fs::write(dir.path().join("ch.md"), "see <#section:references>\n").unwrap();

        validate(&dir, &doc).unwrap();
    }
}
