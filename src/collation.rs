// # Collation Service
//
// String comparison used by histogram buckets. The host engine compares
// string values under the column's collation; this module provides the
// subset of that service the statistics layer needs: resolving a numeric
// collation id from the serialized histogram into a comparison strategy.

use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Numeric collation identifier as carried in the serialized histogram.
pub type CollationId = u32;

/// binary (byte-wise) collation
pub const BINARY: CollationId = 63;

/// utf8mb4_general_ci
pub const UTF8MB4_GENERAL_CI: CollationId = 45;

/// utf8mb4_bin
pub const UTF8MB4_BIN: CollationId = 46;

/// utf8mb4_0900_ai_ci (server default)
pub const UTF8MB4_0900_AI_CI: CollationId = 255;

/// Comparison strategy resolved from a collation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
    /// Byte-wise comparison
    Binary,
    /// Case-insensitive comparison after canonical normalization
    CaseInsensitive,
    /// Case- and accent-insensitive comparison
    AccentCaseInsensitive,
}

impl Collation {
    /// Resolve a serialized collation id into a comparison strategy.
    ///
    /// Unknown ids fall back to binary comparison, which never equates
    /// values that a finer collation would keep apart in lookups.
    pub fn resolve(id: CollationId) -> Self {
        match id {
            BINARY | UTF8MB4_BIN => Collation::Binary,
            UTF8MB4_GENERAL_CI => Collation::CaseInsensitive,
            UTF8MB4_0900_AI_CI => Collation::AccentCaseInsensitive,
            _ => Collation::Binary,
        }
    }

    /// Compare two byte strings under this collation.
    ///
    /// Invalid UTF-8 falls back to byte-wise comparison for the
    /// non-binary strategies; histogram string values are produced by the
    /// engine and are expected to be valid.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Collation::Binary => a.cmp(b),
            Collation::CaseInsensitive => match (std::str::from_utf8(a), std::str::from_utf8(b)) {
                (Ok(a), Ok(b)) => ci_key(a).cmp(&ci_key(b)),
                _ => a.cmp(b),
            },
            Collation::AccentCaseInsensitive => {
                match (std::str::from_utf8(a), std::str::from_utf8(b)) {
                    (Ok(a), Ok(b)) => ai_ci_key(a).cmp(&ai_ci_key(b)),
                    _ => a.cmp(b),
                }
            }
        }
    }
}

/// Case-insensitive sort key: canonical composition, then lowercasing.
fn ci_key(s: &str) -> String {
    s.nfc().flat_map(|c| c.to_lowercase()).collect()
}

/// Accent- and case-insensitive sort key: compatibility decomposition,
/// combining marks stripped, then lowercasing.
fn ai_ci_key(s: &str) -> String {
    s.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
        .collect()
}
