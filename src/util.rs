//! Small helpers shared across the SDK

/// Truncate a string to a maximum byte length, adding ellipsis if
/// truncated. The cut is floored to a char boundary, so multibyte input
/// never splits a character.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let keep = if max_len <= 3 { max_len } else { max_len - 3 };
    let mut cut = keep;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }

    if max_len <= 3 {
        s[..cut].to_string()
    } else {
        format!("{}...", &s[..cut])
    }
}

/// Generate a unique request ID for log correlation
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
