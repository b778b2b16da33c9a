//! String normalization
//!
//! Two separate normalizations are kept apart on purpose:
//! - [`identity_key`] produces a comparison key (ledger lookups, duplicate titles)
//! - [`sanitize_for_path`] produces a filesystem-safe name (destination paths)
//!
//! A sanitized name is never compared, and an identity key is never written to disk.

use unicode_normalization::UnicodeNormalization;

/// Characters that cannot appear in a file or directory name on common filesystems
const ILLEGAL_PATH_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Separator between collaborating artists in an artist field
pub const ARTIST_SEPARATOR: char = ';';

/// Build the comparison key for a string
///
/// Applies NFKD decomposition and lower-casing, collapses runs of whitespace,
/// dashes and underscores to a single space, drops everything outside
/// `[a-z0-9 ]` and trims. The result is stable: `identity_key(identity_key(x)) == identity_key(x)`.
///
/// Scripts with no ASCII decomposition (CJK, Cyrillic, ...) reduce to an empty key.
/// Callers must treat an empty key as "no identity" rather than as a match.
pub fn identity_key(s: &str) -> String {
    let mut key = String::with_capacity(s.len());
    let mut pending_space = false;

    for c in s.nfkd().flat_map(char::to_lowercase) {
        if c.is_whitespace() || is_dash(c) || c == '_' {
            pending_space = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_space && !key.is_empty() {
                key.push(' ');
            }
            pending_space = false;
            key.push(c);
        }
    }

    key
}

fn is_dash(c: char) -> bool {
    matches!(c, '-' | '\u{2010}'..='\u{2015}' | '\u{2212}')
}

/// Make a string safe to use as a single file or directory name
///
/// Removes `\ / : * ? " < > |` and control characters, then trims surrounding whitespace.
pub fn sanitize_for_path(s: &str) -> String {
    s.chars()
        .filter(|c| !ILLEGAL_PATH_CHARS.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// First collaborator of a `;`-separated artist field, if any
///
/// `"23HOURS; FRIO; EDDY"` → `Some("23HOURS")`
pub fn primary_artist(artist: &str) -> Option<&str> {
    artist
        .split(ARTIST_SEPARATOR)
        .map(str::trim)
        .find(|a| !a.is_empty())
}

/// All collaborators of a `;`-separated artist field, in order, without blanks
pub fn split_artists(artists: &str) -> Vec<String> {
    artists
        .split(ARTIST_SEPARATOR)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unicode NFC form, lower-cased; used for exact filename variant matching
pub fn nfc_lower(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}
