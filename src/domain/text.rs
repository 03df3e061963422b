pub const PREVIEW_MAX_CHARS: usize = 100;
pub const NOTIFICATION_BODY_MAX_CHARS: usize = 500;

const ELLIPSIS: &str = "...";

/// Truncates `text` to at most `max_chars` characters, ending with an ellipsis when cut.
#[must_use]
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Conversation list preview for a message body.
#[must_use]
pub fn preview(text: &str) -> String {
    truncate_with_ellipsis(text, PREVIEW_MAX_CHARS)
}

#[must_use]
pub fn notification_body(text: &str) -> String {
    truncate_with_ellipsis(text, NOTIFICATION_BODY_MAX_CHARS)
}

/// Case-insensitive substring match.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
