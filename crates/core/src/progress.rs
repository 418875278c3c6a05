//! Progress text normalization.
//!
//! The fetch engine reports percentages as decorated terminal text
//! (`"\x1b[0;94m 45.5%\x1b[0m"`). [`normalize_percent`] turns any such
//! string into a plain number and never fails; [`format_percent`] is the
//! presentation side used by job snapshots.

use std::sync::LazyLock;

use regex::Regex;

/// Terminal escape sequences (CSI colour and cursor codes).
static ANSI_ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("valid regex"));

/// Lowest normalized percentage.
pub const MIN_PERCENT: f64 = 0.0;
/// Highest normalized percentage.
pub const MAX_PERCENT: f64 = 100.0;

/// Parse a raw progress string into a percentage in `[0.0, 100.0]`.
///
/// Escape sequences are removed first, then every character other than an
/// ASCII digit or `.` is discarded. Anything that does not leave a single
/// well-formed decimal number (empty input, no digits, several dots)
/// yields `0.0`.
pub fn normalize_percent(raw: &str) -> f64 {
    let stripped = ANSI_ESCAPE_RE.replace_all(raw, "");
    let numeric: String = stripped
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if numeric.matches('.').count() > 1 {
        return MIN_PERCENT;
    }

    match numeric.parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(MIN_PERCENT, MAX_PERCENT),
        _ => MIN_PERCENT,
    }
}

/// Render a percentage with exactly two decimals and a `%` suffix.
pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}
