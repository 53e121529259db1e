//! Helpers for sanitizing strings before they reach ltree columns, generated
//! identifiers or tracing span attributes.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields — reveals file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Sanitizes one ltree label.
///
/// Ltree labels only allow `[A-Za-z0-9_]`. Every other character becomes an
/// underscore, runs of underscores collapse into one, and leading/trailing
/// underscores are dropped.
pub fn ltree_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;

    for ch in raw.chars() {
        let mapped = if ch.is_ascii_alphanumeric() { ch } else { '_' };
        if mapped == '_' {
            if last_underscore {
                continue;
            }
            last_underscore = true;
        } else {
            last_underscore = false;
        }
        out.push(mapped);
    }

    out.trim_matches('_').to_string()
}

/// Sanitizes every label of a dotted path and re-joins the non-empty ones.
pub fn ltree_path(raw: &str) -> String {
    raw.split('.')
        .map(ltree_label)
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Builds a compact identifier fragment: uppercase alphanumerics, everything
/// else folded into single hyphens.
pub fn identifier_fragment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_hyphen = true;

    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }

    out.trim_end_matches('-').to_string()
}
