//! Truncation Utilities
//!
//! Cuts text to a byte budget on a UTF-8 boundary, keeping the start.
//! Used for email subjects and for echoing provider error bodies into
//! logs.

const ELLIPSIS: &str = "...";

pub fn truncate_text(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    if max_bytes <= ELLIPSIS.len() {
        return ELLIPSIS[..max_bytes].to_string();
    }

    let budget = max_bytes - ELLIPSIS.len();
    let mut end = 0;
    for (idx, c) in content.char_indices() {
        let char_end = idx + c.len_utf8();
        if char_end <= budget {
            end = char_end;
        } else {
            break;
        }
    }

    format!("{}{}", content[..end].trim_end(), ELLIPSIS)
}

/// Collapse line breaks and runs of whitespace into single spaces
pub fn single_line(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}
