/// Get the leading run of ASCII digits of a string. Empty if it starts with anything else.
pub fn leading_digits(full_str: &str) -> &str {
    let end = full_str
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(full_str.len());

    &full_str[..end]
}

/// Case-insensitive substring check
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
