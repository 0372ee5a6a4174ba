//! Splits an outbound reply into platform-sized chunks (spec §4.8).
//!
//! Grounded on the teacher's `api::inbound::split_reply` (rightmost-boundary
//! search within a `max` window), generalized with fenced-code-block
//! awareness and the priority order the spec requires: never split inside
//! a ``` fence, else double-newline, else newline, else space, else hard cut.

/// Splits `text` into chunks of at most `max_length` characters, preferring
/// natural boundaries and never breaking inside a fenced code block when an
/// alternative split point exists.
pub fn split_message(text: &str, max_length: usize) -> Vec<String> {
    if max_length == 0 || text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_length {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_length {
            push_nonempty(&mut chunks, remaining.trim());
            break;
        }

        let split_at = find_split_point(remaining, max_length);
        let (chunk, rest) = remaining.split_at(split_at);
        push_nonempty(&mut chunks, chunk.trim_end());
        remaining = rest.trim_start();
    }

    chunks
}

fn push_nonempty(chunks: &mut Vec<String>, s: &str) {
    if !s.is_empty() {
        chunks.push(s.to_string());
    }
}

fn find_split_point(remaining: &str, max_length: usize) -> usize {
    let window = &remaining[..max_length];

    if let Some(p) = fence_aware_split(window, remaining, max_length) {
        return p;
    }

    let third = max_length / 3;
    let half = max_length / 2;

    if let Some(p) = window.rfind("\n\n") {
        if p > third {
            return p + 2;
        }
    }
    if let Some(p) = window.rfind('\n') {
        if p > third {
            return p + 1;
        }
    }
    if let Some(p) = window.rfind(' ') {
        if p > half {
            return p + 1;
        }
    }
    max_length
}

/// Priority 1: never split inside a ``` fenced block. If the window ends
/// inside an odd number of fence markers (i.e. inside an open fence), split
/// at the end of the last complete fenced block within the window, or just
/// before the first fence if that fence starts at least ¼ into the window.
fn fence_aware_split(window: &str, full: &str, max_length: usize) -> Option<usize> {
    let fence_positions: Vec<usize> = window
        .match_indices("```")
        .map(|(i, _)| i)
        .collect();

    if fence_positions.len() % 2 == 0 {
        // Window contains only complete fences (or none) — no mid-fence cut.
        return None;
    }

    // Odd count: the window ends inside an open fence. Find the close of
    // the last complete fenced block before the unmatched opener.
    let unmatched_open = fence_positions[fence_positions.len() - 1];

    if fence_positions.len() >= 2 {
        let last_complete_close = fence_positions[fence_positions.len() - 2];
        // End just after that fence's closing marker, at the following
        // newline if present so the next chunk starts on a clean line.
        let after_close = last_complete_close + 3;
        let end = full[after_close..]
            .find('\n')
            .map(|p| after_close + p + 1)
            .unwrap_or(after_close);
        if end > 0 {
            return Some(end);
        }
    }

    if unmatched_open >= max_length / 4 {
        return Some(unmatched_open);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(split_message("hello", 100), vec!["hello"]);
    }

    #[test]
    fn splits_at_double_newline_past_third() {
        let text = "First paragraph here.\n\nSecond paragraph that follows after.";
        let chunks = split_message(text, 30);
        assert_eq!(chunks[0], "First paragraph here.");
    }

    #[test]
    fn splits_at_space_past_half_when_no_newline() {
        let text = "abcdefgh ijklmnop qrstuvwx yzabcdef";
        let chunks = split_message(text, 20);
        assert!(chunks[0].len() <= 20);
        assert!(!chunks[0].is_empty());
    }

    #[test]
    fn hard_cuts_when_no_boundary_available() {
        let text = "a".repeat(50);
        let chunks = split_message(&text, 20);
        assert_eq!(chunks[0].len(), 20);
    }

    #[test]
    fn never_splits_inside_fenced_code_block() {
        let code = "x".repeat(40);
        let text = format!("intro text\n\n```rust\n{code}\n```\n\nmore text after the block");
        let chunks = split_message(&text, 40);
        for chunk in &chunks {
            let fence_count = chunk.matches("```").count();
            assert_eq!(fence_count % 2, 0, "chunk must not end mid-fence: {chunk:?}");
        }
    }

    #[test]
    fn drops_empty_chunks() {
        let text = "a \n\n\n\nb";
        let chunks = split_message(text, 3);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn reassembly_preserves_content_modulo_boundary_trim() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = split_message(text, 15);
        let joined = chunks.join(" ");
        for word in text.split_whitespace() {
            assert!(joined.contains(word));
        }
    }
}
