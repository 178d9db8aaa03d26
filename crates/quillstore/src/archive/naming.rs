use chrono::{DateTime, Utc};

pub const DEFAULT_ARCHIVE_NAME: &str = "project";

const PATH_HOSTILE: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make a project name safe to use as a file name stem.
///
/// Path-hostile and control characters are dropped, whitespace runs become a
/// single `-`, and the result is cut to `max_len` characters. Falls back to
/// [`DEFAULT_ARCHIVE_NAME`] when nothing usable is left.
pub fn sanitize_archive_name(name: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars() {
        if c.is_whitespace() {
            pending_sep = true;
            continue;
        }
        if c.is_control() || PATH_HOSTILE.contains(&c) {
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c);
    }

    let truncated: String = out.chars().take(max_len).collect();
    let trimmed = truncated.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        DEFAULT_ARCHIVE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<sanitized-name>-<YYYY-MM-DD>.<ext>`
pub fn archive_file_name(name: &str, date: DateTime<Utc>, ext: &str, max_len: usize) -> String {
    format!(
        "{}-{}.{}",
        sanitize_archive_name(name, max_len),
        date.format("%Y-%m-%d"),
        ext.trim_start_matches('.')
    )
}
