//! Shared string helpers for query text and Java identifiers.

use heck::ToSnakeCase;

/// Case-insensitive substring search without allocating an uppercase copy.
#[inline]
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    find_ci(haystack, needle).is_some()
}

/// Case-insensitive find, returns the byte offset of the first occurrence of `needle`.
#[inline]
pub fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle_bytes = needle.as_bytes();
    let haystack_bytes = haystack.as_bytes();
    if needle_bytes.len() > haystack_bytes.len() {
        return None;
    }
    haystack_bytes
        .windows(needle_bytes.len())
        .position(|window| window.eq_ignore_ascii_case(needle_bytes))
}

/// Like `find_ci`, but skips matches inside parentheses or single-quoted literals.
pub fn find_top_level_ci(haystack: &str, needle: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let needle_bytes = needle.as_bytes();
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => depth = depth.saturating_sub(1),
            _ if !in_quote && depth == 0 => {
                if bytes[i..].len() >= needle_bytes.len()
                    && bytes[i..i + needle_bytes.len()].eq_ignore_ascii_case(needle_bytes)
                {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Convert a Java identifier to its physical snake_case form.
///
/// `numberOfDoors` becomes `number_of_doors`, `Dog` becomes `dog`.
pub fn snake_case(ident: &str) -> String {
    ident.to_snake_case()
}

/// Strip a package prefix from a (possibly) fully-qualified type name.
///
/// `com.example.Dog` becomes `Dog`; simple names pass through.
#[inline]
pub fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
