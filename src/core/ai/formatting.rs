//! Formatting utilities for AI responses sent over chat transports.
//!
//! WhatsApp rejects text bodies longer than 4096 characters, so long answers
//! are split into several messages.

/// Maximum characters in one WhatsApp text message.
pub const WHATSAPP_MAX_MESSAGE_CHARS: usize = 4096;

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Prefers to break at the last newline in a chunk, then the last space, and
/// only cuts mid-word when a chunk has neither. Whitespace at the break is
/// dropped.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.trim().chars().collect();

    while rest.len() > max_chars {
        let window = &rest[..max_chars];
        let cut = window
            .iter()
            .rposition(|c| *c == '\n')
            .or_else(|| window.iter().rposition(|c| *c == ' '))
            .filter(|i| *i > 0)
            .unwrap_or(max_chars);

        let chunk: String = rest[..cut].iter().collect();
        chunks.push(chunk.trim_end().to_string());

        let remaining: String = rest[cut..].iter().collect();
        rest = remaining.trim_start().chars().collect();
    }

    if !rest.is_empty() {
        chunks.push(rest.into_iter().collect());
    }

    chunks
}
