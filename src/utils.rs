//! Text cleanup, log truncation, and file system helpers.
//!
//! - [`clean_text`] turns API/HTML fragments into plain text
//! - [`truncate_for_log`] keeps long payloads out of the logs
//! - [`truncate_chars`] caps article text before it goes into a prompt
//! - [`looks_truncated`] spots JSON cut off mid-stream by the generation backend
//! - [`ensure_writable_dir`] checks output directories before any work is done

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static UNICODE_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").expect("valid unicode escape regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").expect("valid tag regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Decode entities and escapes, strip markup, and collapse whitespace.
///
/// Handles named entities (`&quot;`), decimal and hex references (`&#39;`,
/// `&#x27;`), literal `\uXXXX` escapes left in JSON-in-JSON payloads, and
/// tags such as the `<b>` highlight markers the search API wraps around hits.
///
/// The steps repeat until the text stops changing, so doubly-escaped input
/// (`&amp;lt;b&amp;gt;`) is fully resolved and cleaning is idempotent.
///
/// # Arguments
///
/// * `raw` - A title, description or page fragment as received
///
/// # Returns
///
/// Plain text with single spaces and no leading or trailing whitespace.
///
/// # Examples
///
/// ```
/// use news_quiz::utils::clean_text;
/// assert_eq!(clean_text("&lt;b&gt;hello&lt;/b&gt;"), "hello");
/// ```
pub fn clean_text(raw: &str) -> String {
    // Every pass shortens the text or only normalises whitespace.
    let mut current = raw.to_string();
    loop {
        let next = clean_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_once(s: &str) -> String {
    let unescaped = UNICODE_ESCAPE_RE.replace_all(s, |caps: &regex::Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    let decoded = html_escape::decode_html_entities(&unescaped);
    let without_tags = TAG_RE.replace_all(&decoded, " ");
    let mapped = without_tags.replace('\u{00A0}', " ");
    WS_RE.replace_all(mapped.trim(), " ").into_owned()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and the remaining byte count appended.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if it fits, otherwise a truncated version with
/// `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```
/// use news_quiz::utils::truncate_for_log;
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Keep at most `max_chars` characters of `s`, with nothing appended.
///
/// Used for prompt input, where a log marker would end up in front of the model.
///
/// ```
/// use news_quiz::utils::truncate_chars;
/// assert_eq!(truncate_chars("가나다라", 2), "가나");
/// assert_eq!(truncate_chars("abc", 10), "abc");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When a generation response is cut off by a token limit the payload fails
/// with an EOF error; callers re-ask once in that case.
///
/// # Arguments
///
/// * `e` - The serde_json error to classify
///
/// # Returns
///
/// `true` if the error is an EOF (end-of-file) error, indicating truncation.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and removes a
/// probe file.
///
/// # Arguments
///
/// * `path` - The directory path to validate
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
