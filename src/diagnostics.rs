//! Diagnostic helpers: fuzzy "did you mean" matching and once-only warnings.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::Error;

/// Messages already warned in this process lifetime. Re-running validation in
/// the same process must not duplicate an already-emitted warning.
static WARNED: Mutex<Option<HashSet<String>>> = Mutex::new(None);

/// Render an error to stderr the way the CLI surfaces it: the message
/// verbatim, one line, prefixed `error:`.
pub fn print_error(e: &Error) {
    eprintln!("error: {e}");
}

/// Pick the single nearest candidate by edit distance.
///
/// Ties are broken by the lexicographically smaller candidate, making the
/// suggestion fully deterministic regardless of candidate iteration order.
pub fn nearest_match<'a, I>(target: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    return candidates
        .into_iter()
        .min_by_key(|candidate| (levenshtein(target, candidate), candidate.to_string()))
        .map(String::from);
}

/// Emit a warning at most once per distinct message for the process
/// lifetime. Returns whether the message was newly emitted.
pub fn warn_once(message: &str) -> bool {
    let mut guard = match WARNED.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let seen = guard.get_or_insert_with(HashSet::new);
    if seen.insert(message.to_string()) {
        tracing::warn!("{message}");
        return true;
    }
    return false;
}

/// Classic two-row Levenshtein edit distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len().saturating_add(1)];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i.saturating_add(1);
        for (j, &cb) in b.iter().enumerate() {
            let substitution = if ca == cb { previous[j] } else { previous[j].saturating_add(1) };
            let insertion = current[j].saturating_add(1);
            let deletion = previous[j.saturating_add(1)].saturating_add(1);
            current[j.saturating_add(1)] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    return previous[b.len()];
}
