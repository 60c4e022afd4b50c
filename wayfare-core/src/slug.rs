//! URL slug derivation for titles and place names.

/// Convert free text into a lowercase, hyphen-separated slug.
///
/// Characters other than ASCII letters, digits, whitespace, hyphens and
/// underscores are dropped; runs of whitespace and hyphens collapse into a
/// single `-`. Leading and trailing separators are trimmed.
///
/// # Examples
/// ```
/// use wayfare_core::slugify;
///
/// assert_eq!(slugify("San Francisco"), "san-francisco");
/// assert_eq!(slugify("  OneBusAway -- Puget Sound! "), "onebusaway-puget-sound");
/// ```
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_separator = true;
        }
    }
    slug
}
