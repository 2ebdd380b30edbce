//! Text helpers shared by log messages, prompts and terminal output

/// Cut `text` to at most `max` characters, ending in "..." when cut
///
/// Counts characters rather than bytes, so multi-byte text is never split.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
