//! Variable substitution engine.
//!
//! Resolves `metadata.<key>` / `metadata.variables.<key>` names from the
//! metadata fragments reachable from each top-level document, substitutes
//! `${name}` placeholders in shared fragment text, and guarantees that every
//! touched fragment is restored to its original bytes on exit unless the
//! caller explicitly commits.
//!
//! The batch-wide dry run must complete before any real write: applying
//! substitutions incrementally could leave a shared fragment patched
//! inconsistently if an ambiguity were discovered mid-batch.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

use crate::context::RunContext;
use crate::diagnostics;
use crate::error::Error;
use crate::types::{FileLocation, Variable};

/// Originals of every currently patched fragment, process-wide, so an
/// interrupt can restore the repository before the process exits. Entries
/// are tagged by owning `PatchSet`.
static BACKUPS: Mutex<Vec<(u64, PathBuf, String)>> = Mutex::new(Vec::new());

/// Next `PatchSet` tag.
static NEXT_PATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Everything the engine needs to know about one top-level document.
pub struct DocumentPlan {
    /// The top-level document.
    pub document: PathBuf,
    /// Reachable text fragments eligible for substitution, in reach order.
    pub fragments: Vec<PathBuf>,
    /// Variables resolved from the document's metadata fragments.
    pub variables: VariableSet,
}

/// The result of rendering one fragment for one document.
#[derive(Debug)]
pub struct Rendered {
    /// `(name, value, source)` for each distinct variable resolved, in usage
    /// order. The ambiguity check compares the simplified `(name, value)`
    /// view; the source feeds the diagnostic.
    pub bindings: Vec<Variable>,
    /// The substituted fragment text.
    pub text: String,
}

/// Variables visible to one document's substitution pass, keyed by qualified
/// name.
#[derive(Debug)]
pub struct VariableSet {
    document: PathBuf,
    index: HashMap<String, usize>,
    variables: Vec<Variable>,
}

impl VariableSet {
    /// Gather variables from a document's reachable metadata fragments.
    ///
    /// Every string-valued top-level key becomes `metadata.<key>`; every
    /// string-valued key inside a nested `variables` mapping becomes
    /// `metadata.variables.<key>`. Non-string values are not substitutable
    /// and are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Error::AmbiguousVariableSource` if two metadata fragments
    /// define the same qualified name, or `Error::Yaml` on a malformed
    /// fragment.
    pub fn from_metadata(
        ctx: &mut RunContext,
        document: &Path,
        metadata_paths: &[PathBuf],
    ) -> Result<Self, Error> {
        let mut set = Self {
            document: document.to_path_buf(),
            index: HashMap::new(),
            variables: Vec::new(),
        };

        for path in metadata_paths {
            let text = ctx.read(path)?;
            let value: serde_yaml::Value = serde_yaml::from_str(&text)
                .map_err(|source| Error::Yaml { path: path.clone(), source })?;
            let Some(mapping) = value.as_mapping() else {
                continue;
            };

            for (key, entry) in mapping {
                let Some(key) = key.as_str() else {
                    continue;
                };
                if let Some(value) = entry.as_str() {
                    set.insert(format!("metadata.{key}"), value.to_string(), path)?;
                } else if key == "variables"
                    && let Some(nested) = entry.as_mapping()
                {
                    for (nested_key, nested_entry) in nested {
                        let (Some(nested_key), Some(value)) =
                            (nested_key.as_str(), nested_entry.as_str())
                        else {
                            continue;
                        };
                        set.insert(
                            format!("metadata.variables.{nested_key}"),
                            value.to_string(),
                            path,
                        )?;
                    }
                }
            }
        }

        return Ok(set);
    }

    /// Look up a variable by qualified name.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        return self.index.get(name).map(|&i| &self.variables[i]);
    }

    /// Whether any variable is defined.
    pub fn is_empty(&self) -> bool {
        return self.variables.is_empty();
    }

    /// All qualified names, in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        return self.variables.iter().map(|v| v.name.as_str());
    }

    fn insert(&mut self, name: String, value: String, source: &Path) -> Result<(), Error> {
        if let Some(&existing) = self.index.get(&name) {
            return Err(Error::AmbiguousVariableSource {
                document: self.document.clone(),
                first_metadata: self.variables[existing].source.clone(),
                name,
                second_metadata: source.to_path_buf(),
            });
        }
        self.index.insert(name.clone(), self.variables.len());
        self.variables.push(Variable { name, source: source.to_path_buf(), value });
        return Ok(());
    }
}

/// Substitute placeholders in one fragment's text without touching disk.
///
/// Escaping rule: an even run of backslashes before `${` is halved and kept
/// literal, and the placeholder is substituted; an odd run loses one
/// backslash and the placeholder stays literal text. So `\${x}` yields the
/// literal `${x}`, while `\\${x}` yields one backslash followed by the value
/// of `x`.
///
/// # Errors
///
/// Returns `Error::UndefinedVariable` for an unresolvable name, with a fuzzy
/// suggestion when any variables are defined, or `Error::Io` if the fragment
/// cannot be read.
///
/// # Panics
///
/// Panics if the hardcoded placeholder regex is invalid (compile-time
/// invariant).
pub fn render_fragment(
    ctx: &mut RunContext,
    fragment: &Path,
    variables: &VariableSet,
) -> Result<Rendered, Error> {
    let placeholder = Regex::new(r"(\\*)\$\{([^}]+)\}").expect("valid regex");
    let text = ctx.read(fragment)?;

    let mut output = String::with_capacity(text.len());
    let mut bindings: Vec<Variable> = Vec::new();
    let mut bound: HashSet<String> = HashSet::new();
    let mut last = 0usize;

    for captures in placeholder.captures_iter(&text) {
        let (Some(whole), Some(backslashes), Some(name)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        output.push_str(&text[last..whole.start()]);
        last = whole.end();

        let run = backslashes.len();
        output.push_str(&"\\".repeat(run / 2));

        if run % 2 == 1 {
            // Escaped: keep the placeholder literal, minus one backslash.
            output.push_str("${");
            output.push_str(name.as_str());
            output.push('}');
            continue;
        }

        let Some(variable) = variables.get(name.as_str()) else {
            let dollar = FileLocation::new(fragment, whole.start() + run);
            return Err(undefined_variable(ctx, name.as_str(), &dollar, variables)?);
        };
        output.push_str(&variable.value);
        if bound.insert(variable.name.clone()) {
            bindings.push(variable.clone());
        }
    }
    output.push_str(&text[last..]);

    return Ok(Rendered { bindings, text: output });
}

/// Dry-run the whole batch and detect cross-document ambiguity.
///
/// Every document is rendered against every fragment it reaches, without
/// touching disk. For a fragment reached by more than one document the
/// simplified `(name, value)` resolutions must agree; a mismatch is an
/// ambiguity error naming the fragment, both documents, both values, and the
/// metadata fragment that supplied each.
///
/// Returns the rendered text for each fragment whose content would change.
///
/// # Errors
///
/// Returns `Error::AmbiguousVariable` on a resolution conflict, or any
/// rendering error.
pub fn dry_run(
    ctx: &mut RunContext,
    plans: &[DocumentPlan],
) -> Result<HashMap<PathBuf, String>, Error> {
    let mut rendered: HashMap<PathBuf, String> = HashMap::new();
    let mut reached: HashMap<PathBuf, (PathBuf, Vec<Variable>)> = HashMap::new();

    for plan in plans {
        for fragment in &plan.fragments {
            if !fragment.exists() {
                continue;
            }
            let result = render_fragment(ctx, fragment, &plan.variables)?;

            if let Some((previous_document, previous_bindings)) = reached.get(fragment) {
                check_agreement(
                    fragment,
                    previous_document,
                    previous_bindings,
                    &plan.document,
                    &result.bindings,
                )?;
            } else {
                let original = ctx.read(fragment)?;
                if *original != *result.text {
                    rendered.insert(fragment.clone(), result.text);
                }
                reached.insert(
                    fragment.clone(),
                    (plan.document.clone(), result.bindings),
                );
            }
        }
    }

    return Ok(rendered);
}

/// Apply substitutions for a whole batch of documents.
///
/// The global dry run runs to completion first (hard ordering guarantee);
/// only then are fragments rewritten, each at most once even when reachable
/// from several documents. The returned `PatchSet` restores every touched
/// fragment when dropped, unless committed.
///
/// # Errors
///
/// Returns ambiguity or rendering errors from the dry run, or `Error::Io`
/// from patching. Fragments already patched are restored before the error
/// propagates.
pub fn substitute_batch(
    ctx: &mut RunContext,
    plans: &[DocumentPlan],
) -> Result<PatchSet, Error> {
    let rendered = dry_run(ctx, plans)?;

    let mut patches = PatchSet::new();
    for plan in plans {
        for fragment in &plan.fragments {
            if let Some(text) = rendered.get(fragment) {
                patches.patch(fragment, text)?;
            }
        }
    }
    return Ok(patches);
}

/// Restore every fragment backed up so far, regardless of owner, before the
/// process exits on interrupt. A build must never leave the repository with
/// substituted placeholder text in place of variables.
pub fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        restore_entries(drain_backups(None));
        std::process::exit(130);
    });
    if let Err(e) = result {
        tracing::warn!("could not install interrupt handler: {e}");
    }
}

/// A scoped set of fragment rewrites.
///
/// "Acquire" captures original bytes and writes the new content; "release"
/// restores the original bytes on every exit path, including early return
/// and errors, unless `commit` dismisses the scope.
pub struct PatchSet {
    committed: bool,
    id: u64,
    patched: HashSet<PathBuf>,
}

impl PatchSet {
    /// Open an empty patch scope.
    pub fn new() -> Self {
        return Self {
            committed: false,
            id: NEXT_PATCH_ID.fetch_add(1, Ordering::Relaxed),
            patched: HashSet::new(),
        };
    }

    /// Rewrite one fragment, backing up its original bytes first. Returns
    /// `false` without touching disk if this scope already patched the path
    /// (the per-fragment "already patched in this batch" guard).
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the fragment cannot be read or written.
    pub fn patch(&mut self, path: &Path, new_text: &str) -> Result<bool, Error> {
        if !self.patched.insert(path.to_path_buf()) {
            return Ok(false);
        }
        let original = std::fs::read_to_string(path)?;
        match BACKUPS.lock() {
            Ok(mut backups) => backups.push((self.id, path.to_path_buf(), original)),
            Err(poisoned) => poisoned.into_inner().push((self.id, path.to_path_buf(), original)),
        }
        std::fs::write(path, new_text)?;
        return Ok(true);
    }

    /// Number of fragments patched by this scope.
    pub fn len(&self) -> usize {
        return self.patched.len();
    }

    /// Whether this scope patched anything.
    pub fn is_empty(&self) -> bool {
        return self.patched.is_empty();
    }

    /// Keep the substituted content on disk and dismiss the scope.
    pub fn commit(mut self) {
        drain_backups(Some(self.id));
        self.committed = true;
    }

    /// Restore this scope's fragments now, in reverse patch order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` on the first fragment that cannot be written back.
    pub fn restore(&mut self) -> Result<(), Error> {
        for (path, original) in drain_backups(Some(self.id)).into_iter().rev() {
            std::fs::write(&path, original)?;
        }
        self.patched.clear();
        return Ok(());
    }
}

impl Default for PatchSet {
    fn default() -> Self {
        return Self::new();
    }
}

impl Drop for PatchSet {
    fn drop(&mut self) {
        if !self.committed {
            restore_entries(drain_backups(Some(self.id)));
        }
    }
}

/// Compare the simplified resolutions of a shared fragment between two
/// reaching documents.
fn check_agreement(
    fragment: &Path,
    first_document: &Path,
    first_bindings: &[Variable],
    second_document: &Path,
    second_bindings: &[Variable],
) -> Result<(), Error> {
    let first_by_name: HashMap<&str, &Variable> =
        first_bindings.iter().map(|v| (v.name.as_str(), v)).collect();

    for second in second_bindings {
        let Some(first) = first_by_name.get(second.name.as_str()) else {
            continue;
        };
        if first.value != second.value {
            return Err(Error::AmbiguousVariable {
                first_document: first_document.to_path_buf(),
                first_metadata: first.source.clone(),
                first_value: first.value.clone(),
                fragment: fragment.to_path_buf(),
                name: second.name.clone(),
                second_document: second_document.to_path_buf(),
                second_metadata: second.source.clone(),
                second_value: second.value.clone(),
            });
        }
    }
    return Ok(());
}

/// Remove and return backup entries, all of them or one scope's, preserving
/// push order.
fn drain_backups(id: Option<u64>) -> Vec<(PathBuf, String)> {
    let mut guard = match BACKUPS.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let mut drained = Vec::new();
    let mut kept = Vec::new();
    for entry in guard.drain(..) {
        if id.is_none_or(|wanted| entry.0 == wanted) {
            drained.push((entry.1, entry.2));
        } else {
            kept.push(entry);
        }
    }
    *guard = kept;
    return drained;
}

/// Write originals back in reverse order, logging rather than propagating
/// failures (used on drop and interrupt paths).
fn restore_entries(entries: Vec<(PathBuf, String)>) {
    for (path, original) in entries.into_iter().rev() {
        if let Err(e) = std::fs::write(&path, original) {
            tracing::error!("failed to restore \"{}\": {e}", path.display());
        }
    }
}

/// Build the `UndefinedVariable` error for one unresolvable placeholder.
fn undefined_variable(
    ctx: &mut RunContext,
    name: &str,
    location: &FileLocation,
    variables: &VariableSet,
) -> Result<Error, Error> {
    let suggestion = if variables.is_empty() {
        None
    } else {
        diagnostics::nearest_match(name, variables.names()).and_then(|nearest| {
            variables.get(&nearest).map(|v| (nearest, v.source.clone()))
        })
    };
    return Ok(Error::UndefinedVariable {
        document: variables.document.clone(),
        file: location.path.clone(),
        line: ctx.line_number(location)?,
        name: name.to_string(),
        suggestion,
    });
}
