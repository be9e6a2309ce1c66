//! Text normalization for cache key segments and lookups.

/// Trim, lowercase, and collapse each run of whitespace into one space.
///
/// Both lowercasing and whitespace detection are Unicode-aware.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}
