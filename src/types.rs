/// Core domain types for docweave documents, fragments, and diagnostics.
use std::fmt;
use std::path::PathBuf;

/// A used bibliography key, with trailing punctuation already stripped.
#[derive(Debug, Clone)]
pub struct Citation {
    /// Bibliography key as written after the `@`, minus trailing `:`/`.`/`?`.
    pub key: String,
    /// Where the key occurs in the fragment.
    pub location: FileLocation,
}

/// A textual use of an identifier, expecting a matching definition.
/// Not required to be unique; every occurrence is tracked separately.
#[derive(Debug, Clone)]
pub struct CrossReference {
    /// Where the identifier name starts in the fragment.
    pub location: FileLocation,
    /// The referenced identifier, including its kind prefix.
    pub name: String,
}

/// An identifier or bibliography-key definition recorded by the registry.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Where the definition token starts in its file.
    pub location: FileLocation,
    /// The defined name (`section:intro`, `figure:diagram-1`, or a bib key).
    pub name: String,
}

/// One inclusion directive occurrence in a top-level document.
///
/// `resolved` usually holds exactly one path; a structured-questions data
/// file also yields its authorable markdown sibling, so that a renamed or
/// removed sibling cannot silently desynchronize from its generated
/// counterpart.
#[derive(Debug, Clone)]
pub struct Directive {
    /// The literal path argument as written in the directive.
    pub argument: PathBuf,
    /// Where the path argument starts in the including document.
    pub location: FileLocation,
    /// Absolute paths the argument resolves to.
    pub resolved: Vec<PathBuf>,
}

/// The universal coordinate for diagnostics: a byte offset within a file.
/// Converted to a 1-based line number on demand, never cached persistently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    /// Byte offset of the diagnosed token within the file.
    pub offset: usize,
    /// File the offset points into.
    pub path: PathBuf,
}

impl FileLocation {
    /// Build a location from a path and byte offset.
    pub fn new(path: impl Into<PathBuf>, offset: usize) -> Self {
        return Self { path: path.into(), offset };
    }
}

/// Classification of a source file, assigned once by the locator and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A BibTeX bibliography (`.bib`).
    Bibliography,
    /// A top-level LaTeX document (`.tex`, but not `.md.tex`).
    Document,
    /// A markdown text fragment (`.md`, `.mdown`, `.markdown`).
    Markdown,
    /// A YAML metadata fragment (`metadata*.yml`).
    Metadata,
    /// Anything docweave does not process.
    Other,
    /// A structured-questions data file (`questions*.yml`).
    Questions,
}

impl Kind {
    /// Parse the user-facing kind label (as printed by `Display`).
    pub fn parse(label: &str) -> Option<Self> {
        return match label {
            "bibliography" => Some(Kind::Bibliography),
            "document" => Some(Kind::Document),
            "markdown" => Some(Kind::Markdown),
            "metadata" => Some(Kind::Metadata),
            "other" => Some(Kind::Other),
            "questions" => Some(Kind::Questions),
            _ => None,
        };
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Kind::Bibliography => "bibliography",
            Kind::Document => "document",
            Kind::Markdown => "markdown",
            Kind::Metadata => "metadata",
            Kind::Other => "other",
            Kind::Questions => "questions",
        };
        return write!(f, "{label}");
    }
}

/// A "did you mean" candidate attached to a resolution error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// File containing the suggested definition.
    pub file: PathBuf,
    /// 1-based line of the suggested definition.
    pub line: u32,
    /// The suggested name.
    pub name: String,
}

/// A resolved string variable sourced from a metadata fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Qualified name (`metadata.version`, `metadata.variables.product`).
    pub name: String,
    /// The metadata fragment that defined the variable.
    pub source: PathBuf,
    /// The substituted string value.
    pub value: String,
}
