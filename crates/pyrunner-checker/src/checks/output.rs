//! Captured stdout check

use crate::Verdict;

/// Compare stdout line by line, ignoring surrounding whitespace and blank
/// lines. With `include`, `expected` only has to appear somewhere in it.
#[must_use]
pub fn output(stdout: &str, expected: &str, include: bool) -> Verdict {
    let actual = normalize_lines(stdout);
    let expected = normalize_lines(expected);

    let matched = if include {
        actual.contains(&expected)
    } else {
        actual == expected
    };

    if matched {
        Verdict::Pass
    } else {
        Verdict::Failure(format!("actual output: {actual}, expected: {expected}"))
    }
}

pub(crate) fn normalize_lines(text: &str) -> String {
    // a `\r\n` pair yields an extra empty piece, dropped with the blank lines
    text.split(is_line_break)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Line boundaries as Python's `str.splitlines` knows them
const fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}
