//! Identifier and bibliography-key registries.
//!
//! Scans the fragments reachable from one top-level document and records
//! every definition with its location. Uniqueness is scoped to that reachable
//! set: a fragment legitimately reused by two unrelated documents with
//! non-overlapping identifier sets is never flagged. A second insertion of
//! the same name is a hard error naming both locations.

use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;

use crate::context::RunContext;
use crate::error::Error;
use crate::types::{Definition, FileLocation};

/// Definitions in insertion order plus a name index for O(1) lookups.
/// Insertion order drives deterministic unused-definition reporting.
#[derive(Debug)]
pub struct Registry {
    definitions: Vec<Definition>,
    index: HashMap<String, usize>,
    what: &'static str,
}

impl Registry {
    /// Create an empty registry. `what` is the word used in duplicate
    /// diagnostics ("identifier" or "bibliography key").
    pub fn new(what: &'static str) -> Self {
        return Self { definitions: Vec::new(), index: HashMap::new(), what };
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Option<&Definition> {
        return self.index.get(name).map(|&i| &self.definitions[i]);
    }

    /// Iterate definitions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        return self.definitions.iter();
    }

    /// All defined names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        return self.definitions.iter().map(|d| d.name.as_str());
    }

    /// Record one definition, failing immediately on the second insertion of
    /// a name. The error cites both definitions by line number.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateDefinition` on collision, or `Error::Io` if a
    /// line number cannot be computed.
    pub fn insert(
        &mut self,
        ctx: &mut RunContext,
        name: String,
        location: FileLocation,
    ) -> Result<(), Error> {
        if let Some(&existing) = self.index.get(&name) {
            let first = self.definitions[existing].location.clone();
            return Err(Error::DuplicateDefinition {
                first_file: first.path.clone(),
                first_line: ctx.line_number(&first)?,
                name,
                second_file: location.path.clone(),
                second_line: ctx.line_number(&location)?,
                what: self.what,
            });
        }
        self.index.insert(name.clone(), self.definitions.len());
        self.definitions.push(Definition { location, name });
        return Ok(());
    }
}

/// Build the identifier registry from markdown fragments.
///
/// Three attribute shapes define identifiers: heading attribute blocks
/// (`section:`), image captions (`figure:`), and pipe-table caption lines
/// (`table:`). Each `#name` token inside an attribute block yields one
/// identifier located at the token itself, for precise diagnostics.
///
/// # Errors
///
/// Returns `Error::DuplicateDefinition` on the second definition of a name,
/// or `Error::Io` if a fragment cannot be read.
pub fn markdown_identifiers(
    ctx: &mut RunContext,
    fragment_paths: &[PathBuf],
) -> Result<Registry, Error> {
    let patterns = AttributePatterns::new();
    let mut registry = Registry::new("identifier");

    for path in fragment_paths {
        let text = ctx.read(path)?;
        for (name, offset) in patterns.identifiers(&text) {
            registry.insert(ctx, name, FileLocation::new(path, offset))?;
        }
    }

    return Ok(registry);
}

/// Build the bibliography-key registry from `.bib` fragments.
///
/// A key is the token between the opening brace of a record block and its
/// trailing comma; the definition location is the key token itself.
///
/// # Errors
///
/// Returns `Error::DuplicateDefinition` on the second definition of a key,
/// or `Error::Io` if a fragment cannot be read.
pub fn bibliography_keys(
    ctx: &mut RunContext,
    bib_paths: &[PathBuf],
) -> Result<Registry, Error> {
    let entry = Regex::new(r"(?m)^[ \t]*@[^{]+\{(.+?)[ \t]*,[ \t]*$").expect("valid regex");
    let mut registry = Registry::new("bibliography key");

    for path in bib_paths {
        let text = ctx.read(path)?;
        for captures in entry.captures_iter(&text) {
            let Some(key) = captures.get(1) else {
                continue;
            };
            registry.insert(
                ctx,
                key.as_str().to_string(),
                FileLocation::new(path, key.start()),
            )?;
        }
    }

    return Ok(registry);
}

/// The three attribute grammars, compiled once per pass.
struct AttributePatterns {
    atx_heading: Regex,
    figure: Regex,
    identifier: Regex,
    setext_heading: Regex,
    table: Regex,
}

impl AttributePatterns {
    /// # Panics
    ///
    /// Panics if a hardcoded attribute regex is invalid (compile-time
    /// invariant).
    fn new() -> Self {
        return Self {
            // `# Heading {#sec:intro .class}` — attribute list at end of an
            // ATX heading line.
            atx_heading: Regex::new(r"(?m)^[ \t]*#.*\{([^}]*)\}[ \t]*$").expect("valid regex"),
            // `![Caption text](...)` — the caption is a single implicit
            // identifier.
            figure: Regex::new(r"!\[([^\]]+)").expect("valid regex"),
            // `#name` tokens inside an attribute list.
            identifier: Regex::new(r"#(\S+)").expect("valid regex"),
            // `Heading {#sec:intro}` followed by an `=`/`-` underline.
            setext_heading: Regex::new(r"(?m)^[ \t]*[^#\s].*\{([^}]*)\}[ \t]*\n[ \t]*[=-]")
                .expect("valid regex"),
            // ` : Table caption {#tab:results}` — 1-3 leading spaces.
            table: Regex::new(r"(?m)^[ \t]{1,3}:.*\{([^}]*)\}[ \t]*$").expect("valid regex"),
        };
    }

    /// Extract `(prefixed_name, byte_offset)` pairs from one fragment, in
    /// positional order within each shape.
    fn identifiers(&self, text: &str) -> Vec<(String, usize)> {
        let mut found = Vec::new();

        // Both heading forms feed the `section:` prefix; merge them by
        // position so first/second in duplicate diagnostics follows source
        // order.
        let mut heading_blocks: Vec<(usize, String)> = Vec::new();
        for pattern in [&self.atx_heading, &self.setext_heading] {
            for captures in pattern.captures_iter(text) {
                if let Some(attrs) = captures.get(1) {
                    heading_blocks.push((attrs.start(), attrs.as_str().to_string()));
                }
            }
        }
        heading_blocks.sort_by_key(|(offset, _)| *offset);
        for (offset, attrs) in &heading_blocks {
            self.attribute_tokens("section", attrs, *offset, &mut found);
        }

        for captures in self.figure.captures_iter(text) {
            if let Some(caption) = captures.get(1) {
                found.push((format!("figure:{}", caption.as_str()), caption.start()));
            }
        }

        for captures in self.table.captures_iter(text) {
            if let Some(attrs) = captures.get(1) {
                self.attribute_tokens("table", attrs.as_str(), attrs.start(), &mut found);
            }
        }

        return found;
    }

    /// Scan one attribute list for `#name` tokens. The recorded offset is the
    /// token itself, not the start of the attribute list.
    fn attribute_tokens(
        &self,
        prefix: &str,
        attributes: &str,
        attributes_offset: usize,
        found: &mut Vec<(String, usize)>,
    ) {
        for captures in self.identifier.captures_iter(attributes) {
            if let Some(token) = captures.get(1) {
                found.push((
                    format!("{prefix}:{}", token.as_str()),
                    attributes_offset + token.start(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_fragment(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frag.md");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn line_of(ctx: &mut RunContext, definition: &Definition) -> u32 {
        ctx.line_number(&definition.location).unwrap()
    }

    #[test]
    fn atx_heading_attributes_define_sections() {
        let (_dir, path) = temp_fragment("text\n\n# Introduction {#intro .unnumbered}\n");
        let mut ctx = RunContext::new();
        let registry = markdown_identifiers(&mut ctx, &[path]).unwrap();

        let def = registry.get("section:intro").expect("section defined");
        let def = def.clone();
        assert_eq!(line_of(&mut ctx, &def), 3);
        assert!(registry.get("section:unnumbered").is_none());
    }

    #[test]
    fn setext_heading_attributes_define_sections() {
        let (_dir, path) = temp_fragment("Overview {#overview}\n====\nbody\n");
        let mut ctx = RunContext::new();
        let registry = markdown_identifiers(&mut ctx, &[path]).unwrap();

        let def = registry.get("section:overview").expect("section defined").clone();
        assert_eq!(line_of(&mut ctx, &def), 1);
    }

    #[test]
    fn figure_caption_is_an_implicit_identifier() {
        let (_dir, path) = temp_fragment("intro\n\n![diagram-1](images/d1.png)\n");
        let mut ctx = RunContext::new();
        let registry = markdown_identifiers(&mut ctx, &[path]).unwrap();

        let def = registry.get("figure:diagram-1").expect("figure defined").clone();
        assert_eq!(line_of(&mut ctx, &def), 3);
    }

    #[test]
    fn table_caption_attributes_define_tables() {
        let (_dir, path) = temp_fragment("| a | b |\n|---|---|\n\n : Results {#results}\n");
        let mut ctx = RunContext::new();
        let registry = markdown_identifiers(&mut ctx, &[path]).unwrap();

        let def = registry.get("table:results").expect("table defined").clone();
        assert_eq!(line_of(&mut ctx, &def), 4);
    }

    #[test]
    fn duplicate_in_one_fragment_cites_both_lines() {
        let (_dir, path) =
            temp_fragment("# Intro {#sec:intro}\n\ntext\n\n# Intro again {#sec:intro}\n");
        let mut ctx = RunContext::new();
        let err = markdown_identifiers(&mut ctx, &[path]).unwrap_err();

        let Error::DuplicateDefinition { first_line, second_line, name, first_file, second_file, .. } = err
        else {
            panic!("expected DuplicateDefinition");
        };
        assert_eq!(name, "section:sec:intro");
        assert_eq!((first_line, second_line), (1, 5));
        assert_eq!(first_file, second_file);
    }

    #[test]
    fn duplicate_across_fragments_names_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        std::fs::write(&a, "# One {#shared}\n").unwrap();
        std::fs::write(&b, "## Two {#shared}\n").unwrap();

        let mut ctx = RunContext::new();
        let err = markdown_identifiers(&mut ctx, &[a.clone(), b.clone()]).unwrap_err();
        let Error::DuplicateDefinition { first_file, second_file, .. } = err else {
            panic!("expected DuplicateDefinition");
        };
        assert_eq!((first_file, second_file), (a, b));
    }

    #[test]
    fn bib_records_define_keys_at_the_key_token() {
        let dir = tempfile::tempdir().unwrap();
        let bib = dir.path().join("refs.bib");
        std::fs::write(
            &bib,
            "@article{smith1999,\n  title = {On Testing},\n}\n@book{jones2001,\n  title = {More Testing},\n}\n",
        )
        .unwrap();

        let mut ctx = RunContext::new();
        let registry = bibliography_keys(&mut ctx, &[bib]).unwrap();
        let smith = registry.get("smith1999").expect("key defined").clone();
        let jones = registry.get("jones2001").expect("key defined").clone();
        assert_eq!(line_of(&mut ctx, &smith), 1);
        assert_eq!(line_of(&mut ctx, &jones), 4);
    }

    #[test]
    fn duplicate_bib_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bib = dir.path().join("refs.bib");
        std::fs::write(&bib, "@article{dup,\n}\n@misc{dup,\n}\n").unwrap();

        let mut ctx = RunContext::new();
        let err = bibliography_keys(&mut ctx, &[bib]).unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { what: "bibliography key", .. }));
    }
}
