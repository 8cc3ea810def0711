use std::collections::HashSet;
use std::path::Path;

use crate::error::Error;

/// Identifiers considered always resolved without an explicit definition.
const DEFAULT_BUILTINS: [&str; 2] = ["section:references", "section:further-reading"];

/// Project configuration loaded from `.docweave.toml`.
/// Include/exclude patterns are path prefixes applied to discovered files.
pub struct Config {
    builtins: HashSet<String>,
    /// External compiler invocation for `docweave build`, if configured.
    pub compile: Option<CompileCommand>,
    exclude: Vec<String>,
    include: Vec<String>,
    /// Worker cap for document-level compile parallelism.
    pub workers: usize,
}

/// The configured external conversion command. The document path is appended
/// as the final argument.
#[derive(Clone)]
pub struct CompileCommand {
    /// Arguments placed before the document path.
    pub args: Vec<String>,
    /// Program to invoke.
    pub program: String,
}

/// Raw TOML structure for `.docweave.toml`.
#[derive(serde::Deserialize)]
struct DocweaveTomlConfig {
    #[serde(default)]
    builtin_identifiers: Vec<String>,
    #[serde(default)]
    compile: Option<RawCompile>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    workers: Option<usize>,
}

/// Raw `[compile]` table.
#[derive(serde::Deserialize)]
struct RawCompile {
    #[serde(default)]
    args: Vec<String>,
    command: String,
}

impl Config {
    /// Load config from `.docweave.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. Returns an error if the
    /// file exists but is malformed — never silently falls back to defaults
    /// when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(".docweave.toml");
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::defaults()),
            Err(e) => return Err(Error::Io(e)),
        };

        let raw: DocweaveTomlConfig = toml::from_str(&content)?;
        let mut builtins: HashSet<String> =
            DEFAULT_BUILTINS.iter().map(ToString::to_string).collect();
        builtins.extend(raw.builtin_identifiers);

        return Ok(Self {
            builtins,
            compile: raw.compile.map(|c| CompileCommand { args: c.args, program: c.command }),
            exclude: raw.exclude,
            include: raw.include,
            workers: raw.workers.unwrap_or_else(default_workers).max(1),
        });
    }

    /// Default config: scan everything, builtin identifiers only, no compiler.
    fn defaults() -> Self {
        return Self {
            builtins: DEFAULT_BUILTINS.iter().map(ToString::to_string).collect(),
            compile: None,
            exclude: Vec::new(),
            include: Vec::new(),
            workers: default_workers(),
        };
    }

    /// Whether a name is always considered resolved.
    pub fn is_builtin(&self, name: &str) -> bool {
        return self.builtins.contains(name);
    }

    /// Check whether a discovered file path should enter the batch.
    ///
    /// A path is included if no include patterns are set (scan everything),
    /// or if the path starts with at least one include pattern.
    /// An included path is then excluded if it starts with any exclude pattern.
    pub fn should_scan(&self, relative_path: &str) -> bool {
        let included = self.include.is_empty()
            || self.include.iter().any(|p| relative_path.starts_with(p.as_str()));

        if !included {
            return false;
        }

        return !self.exclude.iter().any(|p| relative_path.starts_with(p.as_str()));
    }
}

/// One worker per document up to the machine's parallelism.
fn default_workers() -> usize {
    return std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_scans_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.should_scan("anything/at/all.md"));
        assert!(config.is_builtin("section:references"));
        assert!(config.compile.is_none());
    }

    #[test]
    fn include_exclude_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".docweave.toml"),
            "include = [\"docs/\"]\nexclude = [\"docs/drafts/\"]\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.should_scan("docs/chapter.md"));
        assert!(!config.should_scan("docs/drafts/wip.md"));
        assert!(!config.should_scan("src/main.rs"));
    }

    #[test]
    fn extra_builtins_and_compile_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".docweave.toml"),
            "builtin_identifiers = [\"section:glossary\"]\n\n[compile]\ncommand = \"latexmk\"\nargs = [\"-lualatex\"]\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.is_builtin("section:glossary"));
        assert!(config.is_builtin("section:references"));
        let compile = config.compile.expect("compile command configured");
        assert_eq!(compile.program, "latexmk");
        assert_eq!(compile.args, vec!["-lualatex".to_string()]);
    }

    #[test]
    fn malformed_config_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".docweave.toml"), "include = 3\n").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
