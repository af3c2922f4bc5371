//! Pure text-editing primitives shared by every storage adapter.
//!
//! All primitives split on `'\n'` so insert, extract and view agree on what
//! a line is. Insert indices are 0-based; view/extract ranges are 1-based
//! inclusive. The asymmetry is intentional and load-bearing for callers.

use crate::error::{MemoryError, Result};

fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Replace exactly one occurrence of `old_str` with `new_str`.
///
/// Zero occurrences is `NotFound`; two or more is `Ambiguous`, with the
/// exact count in the message. `path`, when supplied, is named in both.
pub fn unique_replace(
    text: &str,
    old_str: &str,
    new_str: &str,
    path: Option<&str>,
) -> Result<String> {
    let location = path.map(|p| format!(" in {p}")).unwrap_or_default();
    match text.matches(old_str).count() {
        0 => Err(MemoryError::NotFound(format!(
            "old_str was not found{location}. No changes made; view the file to check the exact text."
        ))),
        1 => Ok(text.replacen(old_str, new_str, 1)),
        n => Err(MemoryError::Ambiguous(format!(
            "old_str appears {n} times{location}; it must appear exactly once. Add surrounding lines to make it unique."
        ))),
    }
}

/// Splice `insert_text` in as a new line at the 0-based index `line`.
///
/// `line == 0` inserts at the top; `line == line_count` appends at the end;
/// anything outside that range is `InvalidLine`.
pub fn insert_at_line<'a>(text: &'a str, line: i64, insert_text: &'a str) -> Result<String> {
    let mut lines = split_lines(text);
    let count = lines.len() as i64;
    if line < 0 || line > count {
        return Err(MemoryError::InvalidLine(format!(
            "Invalid insert_line {line}: the file has {count} lines, so the value must be between 0 and {count}."
        )));
    }
    lines.insert(line as usize, insert_text);
    Ok(lines.join("\n"))
}

/// Extract lines `start..=end`, 1-based inclusive. An `end` beyond the last
/// line clips silently; a `start` past the last line yields nothing.
pub fn extract_lines(text: &str, start: usize, end: usize) -> Vec<&str> {
    let lines = split_lines(text);
    if start < 1 || start > lines.len() {
        return Vec::new();
    }
    let end = end.min(lines.len());
    if end < start {
        return Vec::new();
    }
    lines[start - 1..end].to_vec()
}

/// Render text with right-aligned line numbers in a fixed-width field.
///
/// With no range the whole file renders from line 1. A range `(s, e)` is
/// 1-based inclusive; `e == -1` means "to the end"; numbering restarts at
/// `s` so the displayed numbers match the file's own line numbers.
pub fn render_view(text: &str, range: Option<(i64, i64)>) -> String {
    let lines = split_lines(text);
    let count = lines.len() as i64;
    let (start, end) = match range {
        None => (1, count),
        Some((s, e)) => {
            let s = s.max(1);
            let e = if e == -1 { count } else { e.min(count) };
            (s, e)
        }
    };
    if start > count || end < start {
        return String::new();
    }

    let mut out = Vec::with_capacity((end - start + 1) as usize);
    for (offset, line) in lines[(start - 1) as usize..end as usize].iter().enumerate() {
        out.push(format!("{:>4}: {line}", start + offset as i64));
    }
    out.join("\n")
}
