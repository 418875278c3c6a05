//! Filename rules for produced artifacts.

use std::sync::LazyLock;

use regex::Regex;

/// Runs of characters outside the safe set: ASCII alphanumerics, `-`, `_`,
/// `.`, parentheses and the plain space.
static UNSAFE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9\-._() ]+").expect("valid regex"));

/// Replacement for every unsafe run.
pub const PLACEHOLDER: &str = "_";

/// Extensions tried, in priority order, when locating the file the engine
/// produced. Video containers win over still images.
pub const ARTIFACT_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "webm", "jpg", "jpeg", "png"];

/// Rewrite a bare filename so it only contains safe characters.
///
/// Each run of unsafe characters collapses into a single [`PLACEHOLDER`],
/// so applying the rewrite to its own output is a no-op.
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_RUN_RE.replace_all(name, PLACEHOLDER).into_owned()
}
