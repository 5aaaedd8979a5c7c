/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    &s[..end]
}

/// Unwrap a markdown fence (```` ```json ```` or bare ```` ``` ````) around a
/// model answer. Text without a fence is only trimmed.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) up to the end of the opening line.
    let body = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
        _ => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}
