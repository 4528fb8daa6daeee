//! Source snippet check

use crate::Verdict;
use crate::value::strip_whitespace;

/// Look for `snippet` in the raw source, ignoring whitespace and treating
/// both quote characters alike
#[must_use]
pub fn contains(code: &str, snippet: &str) -> Verdict {
    if normalize(code).contains(&normalize(snippet)) {
        Verdict::Pass
    } else {
        Verdict::Failure(format!("expected snippet not found: {snippet}"))
    }
}

fn normalize(text: &str) -> String {
    strip_whitespace(text).replace('"', "'")
}
