/// Normalize a title for exact word matching: lowercase, strip everything
/// that isn't alphanumeric, split into words. Used to compare titles
/// token-for-token, never as fuzzy matching.
pub fn title_tokens(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Canonical form of a title: its token sequence joined by single spaces.
pub fn normalize_title(title: &str) -> String {
    title_tokens(title).join(" ")
}

/// Two titles match exactly when their token sequences are equal
/// (case-insensitive, ignoring punctuation and whitespace runs).
pub fn titles_match_exactly(a: &str, b: &str) -> bool {
    title_tokens(a) == title_tokens(b)
}
