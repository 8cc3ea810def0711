//! Per-run context owning the path -> contents cache.
//!
//! One `RunContext` lives for exactly one validation batch and is passed by
//! reference into each pass. Each file is read at most once per batch; the
//! cache is discarded with the context and never shared across runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Error;
use crate::types::FileLocation;

/// Path-keyed source cache plus the location mapper.
#[derive(Default)]
pub struct RunContext {
    sources: HashMap<PathBuf, Arc<str>>,
}

impl RunContext {
    /// Create an empty context for one batch.
    pub fn new() -> Self {
        return Self { sources: HashMap::new() };
    }

    /// Read a file through the cache. The returned `Arc` keeps the borrow
    /// checker out of multi-pass scans over the same file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read.
    pub fn read(&mut self, path: &Path) -> Result<Arc<str>, Error> {
        if let Some(text) = self.sources.get(path) {
            return Ok(Arc::clone(text));
        }
        let text: Arc<str> = Arc::from(std::fs::read_to_string(path)?);
        self.sources.insert(path.to_path_buf(), Arc::clone(&text));
        return Ok(text);
    }

    /// Convert a byte offset within a file into a 1-based line number.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read or the offset lies
    /// beyond the end of the file.
    pub fn line_number(&mut self, location: &FileLocation) -> Result<u32, Error> {
        let text = self.read(&location.path)?;
        let mut consumed = 0usize;
        let mut line = 0u32;
        for segment in text.split_inclusive('\n') {
            line = line.saturating_add(1);
            consumed = consumed.saturating_add(segment.len());
            if consumed > location.offset {
                return Ok(line);
            }
        }
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "tried to determine the line number of byte {} in file \"{}\" but found only {} bytes",
                location.offset,
                location.path.display(),
                consumed
            ),
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frag.md");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn offsets_map_to_one_based_lines() {
        let (_dir, path) = write_temp("first\nsecond\nthird\n");
        let mut ctx = RunContext::new();

        assert_eq!(ctx.line_number(&FileLocation::new(&path, 0)).unwrap(), 1);
        assert_eq!(ctx.line_number(&FileLocation::new(&path, 6)).unwrap(), 2);
        assert_eq!(ctx.line_number(&FileLocation::new(&path, 13)).unwrap(), 3);
    }

    #[test]
    fn offset_past_end_is_an_error() {
        let (_dir, path) = write_temp("short\n");
        let mut ctx = RunContext::new();
        assert!(ctx.line_number(&FileLocation::new(&path, 100)).is_err());
    }

    #[test]
    fn second_read_hits_the_cache() {
        let (_dir, path) = write_temp("cached\n");
        let mut ctx = RunContext::new();
        let first = ctx.read(&path).unwrap();

        // A disk rewrite is invisible within the same batch.
        std::fs::write(&path, "rewritten\n").unwrap();
        let second = ctx.read(&path).unwrap();
        assert_eq!(&*first, &*second);
    }
}
