//! Comparison keys for instruction text.
//!
//! A key is the instruction with line breaks normalized to `\n`, cut to a
//! fixed number of characters. Nothing else is rewritten: prefix comparison
//! downstream is character-exact, so spacing has to survive untouched.

use std::fmt;

/// Default key bound, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 192;

/// Bounded, deterministic comparison key derived from instruction text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, which is the unit of the bound.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Empty keys stand for "no instruction" and must never match anything.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace `\r\n` and lone `\r` with `\n`.
pub fn normalize_line_breaks(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

pub fn compute_canonical_key(text: &str, max_length: usize) -> CanonicalKey {
    if text.trim().is_empty() {
        return CanonicalKey::default();
    }
    let normalized = normalize_line_breaks(text);
    let key = match normalized.char_indices().nth(max_length) {
        Some((cut, _)) => normalized[..cut].to_string(),
        None => normalized,
    };
    CanonicalKey(key)
}

/// The key with a trailing ellipsis removed, if it has one.
///
/// UIs that shorten instructions mark the cut with `...` or `…`; the stem is
/// what the untruncated text is expected to start with.
pub fn truncation_stem(key: &CanonicalKey) -> Option<&str> {
    let s = key.as_str();
    let stem = s
        .strip_suffix('\u{2026}')
        .or_else(|| s.strip_suffix("..."))?
        .trim_end();
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}
