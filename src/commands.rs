//! Core CLI commands for docweave: check, build, files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::compile::{self, CommandInvoker};
use crate::config::Config;
use crate::context::RunContext;
use crate::error::Error;
use crate::graph;
use crate::locator;
use crate::types::Kind;
use crate::validator;
use crate::vars::{self, DocumentPlan};

/// Validate every top-level document in the repository, including a
/// batch-wide substitution dry run so cross-document variable conflicts
/// surface before any build is attempted.
///
/// # Errors
///
/// Returns the first validation, variable, or I/O error encountered.
pub fn check(root: &Path) -> Result<ExitCode, Error> {
    let config = Config::load(root)?;
    let discovered = locator::discover(root, &config);
    let documents = locator::of_kind(&discovered, Kind::Document);
    let mut ctx = RunContext::new();

    for document in &documents {
        validator::validate_document(&mut ctx, &config, document, &discovered)?;
    }

    let plans = build_plans(&mut ctx, &documents)?;
    vars::dry_run(&mut ctx, &plans)?;

    tracing::info!("checked {} documents, all references resolve", documents.len());
    println!("ok: {} documents checked", documents.len());
    return Ok(ExitCode::SUCCESS);
}

/// Validate, substitute variables into shared fragments, compile every
/// document with the configured external command, and restore the fragments
/// to their original bytes. With `keep`, the substituted fragments are left
/// on disk instead of being restored.
///
/// Validation runs for the whole batch before the first byte is written to
/// any fragment; a failing document aborts the build with sources untouched.
///
/// # Errors
///
/// Returns validation, variable, or I/O errors. Compiler failures are
/// reported per document and surface as a failure exit code, not an error.
pub fn build(root: &Path, keep: bool) -> Result<ExitCode, Error> {
    let config = Config::load(root)?;
    let Some(command) = config.compile.clone() else {
        eprintln!("error: no [compile] command configured in .docweave.toml");
        return Ok(ExitCode::FAILURE);
    };

    let discovered = locator::discover(root, &config);
    let documents = locator::of_kind(&discovered, Kind::Document);
    let mut ctx = RunContext::new();

    for document in &documents {
        validator::validate_document(&mut ctx, &config, document, &discovered)?;
    }

    let plans = build_plans(&mut ctx, &documents)?;

    vars::install_interrupt_handler();
    let mut patches = vars::substitute_batch(&mut ctx, &plans)?;
    if !patches.is_empty() {
        tracing::info!("substituted variables in {} fragments", patches.len());
    }

    let invoker = CommandInvoker::new(command);
    let outcomes = compile::compile_all(&invoker, &documents, config.workers);

    // Fragments go back to their authored form whether or not the compiler
    // succeeded, unless the caller asked to inspect the substituted sources.
    if keep {
        patches.commit();
    } else {
        patches.restore()?;
    }

    let mut failed = 0_usize;
    for outcome in &outcomes {
        if outcome.succeeded() {
            continue;
        }
        failed += 1;
        if let Some(failure) = &outcome.failure {
            eprintln!("error: \"{}\": {failure}", outcome.document.display());
        }
    }
    if failed > 0 {
        eprintln!("error: {failed} of {} documents failed to compile", outcomes.len());
        return Ok(ExitCode::FAILURE);
    }

    println!("ok: {} documents compiled", outcomes.len());
    return Ok(ExitCode::SUCCESS);
}

/// List every discovered file with its kind, optionally filtered.
///
/// # Errors
///
/// Returns `Error::Io` or `Error::TomlDe` from config loading.
pub fn files(root: &Path, kind: Option<Kind>) -> Result<ExitCode, Error> {
    let config = Config::load(root)?;
    for (path, file_kind) in locator::discover(root, &config) {
        if kind.is_none_or(|wanted| wanted == file_kind) {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            println!("{file_kind}\t{}", relative.display());
        }
    }
    return Ok(ExitCode::SUCCESS);
}

/// Assemble per-document substitution plans: reachable metadata feeds the
/// variable set, reachable markdown and bibliography fragments are the
/// substitution targets.
fn build_plans(ctx: &mut RunContext, documents: &[PathBuf]) -> Result<Vec<DocumentPlan>, Error> {
    let mut plans = Vec::new();
    for document in documents {
        let directives = graph::scan_document(ctx, document)?;
        let reachable = graph::fragments(&directives);

        let metadata: Vec<PathBuf> = reachable
            .iter()
            .filter(|p| p.exists() && locator::classify(p) == Kind::Metadata)
            .cloned()
            .collect();
        let fragments: Vec<PathBuf> = reachable
            .iter()
            .filter(|p| {
                p.exists()
                    && matches!(locator::classify(p), Kind::Markdown | Kind::Bibliography)
            })
            .cloned()
            .collect();

        plans.push(DocumentPlan {
            document: document.clone(),
            fragments,
            variables: vars::VariableSet::from_metadata(ctx, document, &metadata)?,
        });
    }
    return Ok(plans);
}
