/// Crate-level error types for docweave diagnostics.
use std::path::{Path, PathBuf};

use crate::types::Suggestion;

/// All errors in docweave carry enough context to produce a useful diagnostic
/// without a debugger. Every message cites at least one `(path, line)` pair,
/// and resolution errors append a "did you mean" clause when one resolves.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The same fragment would be substituted two different ways depending on
    /// which top-level document reaches it.
    #[error(
        "variable \"{name}\" in fragment \"{}\" is ambiguous: document \"{}\" resolves it to \"{first_value}\" via metadata \"{}\" but document \"{}\" resolves it to \"{second_value}\" via metadata \"{}\"",
        fragment.display(),
        first_document.display(),
        first_metadata.display(),
        second_document.display(),
        second_metadata.display()
    )]
    AmbiguousVariable {
        /// The first top-level document reaching the fragment.
        first_document: PathBuf,
        /// The metadata fragment supplying the first value.
        first_metadata: PathBuf,
        /// The value resolved for the first document.
        first_value: String,
        /// The shared fragment with conflicting substitutions.
        fragment: PathBuf,
        /// Qualified variable name.
        name: String,
        /// The second top-level document reaching the fragment.
        second_document: PathBuf,
        /// The metadata fragment supplying the second value.
        second_metadata: PathBuf,
        /// The value resolved for the second document.
        second_value: String,
    },

    /// Two metadata fragments of one document define the same qualified name.
    #[error(
        "variable \"{name}\" of document \"{}\" is defined by both metadata file \"{}\" and metadata file \"{}\"",
        document.display(),
        first_metadata.display(),
        second_metadata.display()
    )]
    AmbiguousVariableSource {
        /// The document whose metadata set is ambiguous.
        document: PathBuf,
        /// First metadata fragment defining the name.
        first_metadata: PathBuf,
        /// Qualified variable name.
        name: String,
        /// Second metadata fragment defining the name.
        second_metadata: PathBuf,
    },

    /// An identifier or bibliography key is defined twice within the set of
    /// fragments reachable from one top-level document.
    #[error("{}", duplicate_message(what, name, first_file, *first_line, second_file, *second_line))]
    DuplicateDefinition {
        /// File containing the first definition.
        first_file: PathBuf,
        /// 1-based line of the first definition.
        first_line: u32,
        /// The doubly defined name.
        name: String,
        /// File containing the second definition.
        second_file: PathBuf,
        /// 1-based line of the second definition.
        second_line: u32,
        /// "identifier" or "bibliography key".
        what: &'static str,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// A used bibliography key has no entry in the document's bibliography.
    #[error(
        "bibliography key \"{key}\" referenced on line {line} of file \"{}\" not found in any of the {entry_count} bibliography files of document \"{}\"{}",
        file.display(),
        document.display(),
        suggestion_clause(suggestion)
    )]
    MissingCitation {
        /// The top-level document scoping the bibliography.
        document: PathBuf,
        /// Number of bibliography files searched.
        entry_count: usize,
        /// Fragment containing the citation.
        file: PathBuf,
        /// The unresolved key.
        key: String,
        /// 1-based line of the citation.
        line: u32,
        /// Nearest existing key, when the bibliography is non-empty.
        suggestion: Option<Suggestion>,
    },

    /// A referenced fragment does not exist on disk.
    #[error(
        "file \"{}\" referenced on line {line} of file \"{}\" not found{}",
        argument.display(),
        file.display(),
        path_suggestion_clause(suggestion.as_deref())
    )]
    MissingFile {
        /// The literal path argument from the directive.
        argument: PathBuf,
        /// The document containing the directive.
        file: PathBuf,
        /// 1-based line of the directive argument.
        line: u32,
        /// Nearest discovered path, when any files were discovered.
        suggestion: Option<String>,
    },

    /// A used identifier has no definition and is not a builtin.
    #[error(
        "identifier \"{name}\" referenced on line {line} of file \"{}\" not found in any of the {fragment_count} markdown fragments of document \"{}\"{}",
        file.display(),
        document.display(),
        suggestion_clause(suggestion)
    )]
    MissingReference {
        /// The top-level document scoping the identifier registry.
        document: PathBuf,
        /// Fragment containing the reference.
        file: PathBuf,
        /// Number of markdown fragments searched.
        fragment_count: usize,
        /// 1-based line of the reference.
        line: u32,
        /// The unresolved identifier, including its kind prefix.
        name: String,
        /// Nearest existing definition, when the registry is non-empty.
        suggestion: Option<Suggestion>,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// A `${name}` placeholder has no resolved value.
    #[error(
        "variable \"{name}\" used on line {line} of file \"{}\" is not defined by the metadata of document \"{}\"{}",
        file.display(),
        document.display(),
        variable_suggestion_clause(suggestion)
    )]
    UndefinedVariable {
        /// The top-level document whose metadata was searched.
        document: PathBuf,
        /// Fragment containing the placeholder.
        file: PathBuf,
        /// 1-based line of the placeholder.
        line: u32,
        /// Qualified variable name as written.
        name: String,
        /// Nearest defined variable and its source, when any are defined.
        suggestion: Option<(String, PathBuf)>,
    },

    /// YAML parsing of a metadata fragment failed.
    #[error("yaml: {}: {source}", path.display())]
    Yaml {
        /// The metadata fragment that failed to parse.
        path: PathBuf,
        /// The wrapped YAML error.
        source: serde_yaml::Error,
    },
}

/// Same-file collisions use dedicated phrasing rather than naming the file
/// twice; cross-file collisions name both files.
fn duplicate_message(
    what: &str,
    name: &str,
    first_file: &Path,
    first_line: u32,
    second_file: &Path,
    second_line: u32,
) -> String {
    if first_file == second_file {
        return format!(
            "{what} \"{name}\" is defined twice, once on line {first_line} and once on line {second_line} of file \"{}\"",
            first_file.display()
        );
    }
    return format!(
        "{what} \"{name}\" is defined twice, once on line {first_line} of file \"{}\" and once on line {second_line} of file \"{}\"",
        first_file.display(),
        second_file.display()
    );
}

/// Render a path-only suggestion clause, or nothing.
fn path_suggestion_clause(suggestion: Option<&str>) -> String {
    return match suggestion {
        None => String::new(),
        Some(path) => format!("; did you mean \"{path}\"?"),
    };
}

/// Render the standard `; did you mean ...` clause, or nothing.
fn suggestion_clause(suggestion: &Option<Suggestion>) -> String {
    return match suggestion {
        None => String::new(),
        Some(s) => format!(
            "; did you mean \"{}\" defined on line {} of file \"{}\"?",
            s.name,
            s.line,
            s.file.display()
        ),
    };
}

/// Variable suggestions cite the defining metadata file; YAML keys have no
/// usable line numbers after parsing.
fn variable_suggestion_clause(suggestion: &Option<(String, PathBuf)>) -> String {
    return match suggestion {
        None => String::new(),
        Some((name, source)) => format!(
            "; did you mean \"${{{name}}}\" defined in file \"{}\"?",
            source.display()
        ),
    };
}
