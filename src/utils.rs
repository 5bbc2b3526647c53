//! Utility functions for text processing.

/// Split text into chunks of at most `limit` characters.
///
/// Splitting is strictly by character count in order; a text within the
/// limit comes back as a single chunk. Used for Telegram's message length
/// cap.
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if limit == 0 || chars.len() <= limit {
        return vec![text.to_string()];
    }
    chars
        .chunks(limit)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
