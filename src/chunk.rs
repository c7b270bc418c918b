//! Line-boundary text chunker.
//!
//! Splits message text into pieces of at most `max_chars` characters,
//! cutting only between lines. The bound is soft: a single line longer
//! than `max_chars` is kept whole as its own chunk rather than split
//! mid-word.

/// Split `text` into chunks along line boundaries.
///
/// Line endings are normalized to `\n` and the text is trimmed first.
/// Lines are accumulated greedily; the buffer is flushed before a line
/// that would push its newline-joined length past `max_chars`. Empty or
/// whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    // Character length of `current` joined with newlines.
    let mut current_len = 0usize;

    for line in normalized.split('\n') {
        let line_len = line.chars().count();

        if !current.is_empty() && current_len + line_len + 1 > max_chars {
            push_chunk(&mut chunks, &current);
            current.clear();
            current_len = 0;
        }

        if current.is_empty() {
            current_len = line_len;
        } else {
            current_len += line_len + 1;
        }
        current.push(line);
    }

    if !current.is_empty() {
        push_chunk(&mut chunks, &current);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, lines: &[&str]) {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
