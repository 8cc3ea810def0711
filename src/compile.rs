//! External document compilation.
//!
//! Runs the configured conversion command once per top-level document,
//! fanning work out over a bounded pool of worker threads. One document
//! failing does not cancel the others; the batch reports every outcome.

use std::path::{Path, PathBuf};
use std::process::Command;

use crossbeam_channel::bounded;

use crate::config::CompileCommand;

/// Outcome of compiling one document.
pub struct Outcome {
    /// The compiled document.
    pub document: PathBuf,
    /// `None` on success, otherwise a human-readable failure description.
    pub failure: Option<String>,
}

impl Outcome {
    /// Whether the compiler succeeded for this document.
    pub fn succeeded(&self) -> bool {
        return self.failure.is_none();
    }
}

/// Something that can run the external compiler for one document.
///
/// The seam exists so the batch driver can be exercised without spawning
/// real processes.
pub trait Invoker: Send + Sync {
    /// Run the compiler on `document`. Returns `None` on success, or a
    /// failure description.
    fn invoke(&self, document: &Path) -> Option<String>;
}

/// Invokes the configured command with the document path appended as the
/// final argument, inheriting stdout/stderr so compiler output reaches the
/// terminal.
pub struct CommandInvoker {
    command: CompileCommand,
}

impl CommandInvoker {
    pub fn new(command: CompileCommand) -> Self {
        return Self { command };
    }
}

impl Invoker for CommandInvoker {
    fn invoke(&self, document: &Path) -> Option<String> {
        let status = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(document)
            .status();

        return match status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!("\"{}\" exited with {status}", self.command.program)),
            Err(e) => Some(format!("could not run \"{}\": {e}", self.command.program)),
        };
    }
}

/// Compile every document, at most `workers` at a time.
///
/// Outcomes are returned in the input order regardless of which worker
/// finished first, so batch output is deterministic.
pub fn compile_all(invoker: &dyn Invoker, documents: &[PathBuf], workers: usize) -> Vec<Outcome> {
    if documents.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, documents.len());

    let (work_tx, work_rx) = bounded::<(usize, PathBuf)>(documents.len());
    let (done_tx, done_rx) = bounded::<(usize, Option<String>)>(documents.len());
    for item in documents.iter().cloned().enumerate() {
        work_tx.send(item).expect("bounded to batch size");
    }
    drop(work_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                while let Ok((index, document)) = work_rx.recv() {
                    tracing::info!("compiling \"{}\"", document.display());
                    let failure = invoker.invoke(&document);
                    if done_tx.send((index, failure)).is_err() {
                        return;
                    }
                }
            });
        }
    });
    drop(done_tx);

    let mut failures: Vec<Option<Option<String>>> = vec![None; documents.len()];
    while let Ok((index, failure)) = done_rx.recv() {
        failures[index] = Some(failure);
    }

    return documents
        .iter()
        .zip(failures)
        .map(|(document, failure)| Outcome {
            document: document.clone(),
            failure: failure.flatten(),
        })
        .collect();
}
