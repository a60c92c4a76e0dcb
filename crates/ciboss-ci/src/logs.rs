//! Log capture helpers.
//!
//! All budgets are measured in characters, not bytes, so truncation never
//! splits a UTF-8 sequence.

/// Character budget for captured test output.
pub const MAX_LOG_CHARS: usize = 20_000;

/// Separator placed between stdout and stderr in combined logs.
pub const STDERR_SEPARATOR: &str = "\n--- STDERR ---\n";

/// Keep the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Merge the two output streams: stdout first, then stderr.
pub fn combine_streams(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        return stdout.to_string();
    }
    let mut combined = String::with_capacity(stdout.len() + STDERR_SEPARATOR.len() + stderr.len());
    combined.push_str(stdout);
    combined.push_str(STDERR_SEPARATOR);
    combined.push_str(stderr);
    combined
}

/// Truncate `output` so that `output + marker` fits in `max_chars`.
///
/// The marker always survives intact (itself truncated only if it alone
/// exceeds the budget).
pub fn fit_with_marker(output: &str, marker: &str, max_chars: usize) -> String {
    let marker = if output.is_empty() {
        marker.to_string()
    } else {
        format!("\n{marker}")
    };
    let marker_len = marker.chars().count();
    if marker_len >= max_chars {
        return truncate_chars(marker.trim_start(), max_chars);
    }
    let mut fitted = truncate_chars(output, max_chars - marker_len);
    fitted.push_str(&marker);
    fitted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_shorter_text_untouched() {
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_counts_characters() {
        let text = "é".repeat(30);
        let truncated = truncate_chars(&text, 10);
        assert_eq!(truncated.chars().count(), 10);
    }

    #[test]
    fn test_truncate_exact_budget() {
        let text = "x".repeat(MAX_LOG_CHARS + 500);
        assert_eq!(truncate_chars(&text, MAX_LOG_CHARS).len(), MAX_LOG_CHARS);
    }

    #[test]
    fn test_combine_without_stderr() {
        assert_eq!(combine_streams("ok\n", ""), "ok\n");
    }

    #[test]
    fn test_combine_with_stderr() {
        let combined = combine_streams("out", "err");
        assert_eq!(combined, "out\n--- STDERR ---\nerr");
    }

    #[test]
    fn test_fit_with_marker_preserves_marker() {
        let output = "y".repeat(100);
        let fitted = fit_with_marker(&output, "[timeout]", 50);
        assert_eq!(fitted.chars().count(), 50);
        assert!(fitted.ends_with("\n[timeout]"));
    }

    #[test]
    fn test_fit_with_marker_empty_output() {
        assert_eq!(fit_with_marker("", "[timeout]", 50), "[timeout]");
    }
}
