//! Outbound text transforms: markdown subset → host markup, inline-image
//! extraction, and code-point chunking.
//!
//! # Markup
//! The only markdown the compose path understands is the backtick code span:
//! `` `code` `` becomes `<code>code</code>`. Hosts that pass their own markup
//! through get `<font …>` fragments stripped — they render as garbage on the
//! other side.
//!
//! Secret-chat transports understand no markup at all, so
//! [`unescape_for_plain`] folds host markup back to plain text before sending.

use std::path::PathBuf;

// ─── Outgoing conversion ──────────────────────────────────────────────────────

/// Convert composed text into host markup.
///
/// - `` `code` `` → `<code>code</code>` (unclosed backticks stay literal)
/// - `<font …>` / `</font>` fragments are dropped
pub fn convert_outgoing(text: &str) -> String {
    let stripped = strip_font_tags(text);
    let chars: Vec<char> = stripped.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(stripped.len());
    let mut i = 0;

    while i < n {
        if chars[i] == '`' {
            let start = i + 1;
            let mut j = start;
            while j < n && chars[j] != '`' { j += 1; }
            if j < n {
                out.push_str("<code>");
                out.extend(&chars[start..j]);
                out.push_str("</code>");
                i = j + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

/// Remove `<font …>` and `</font>` tags, keeping the enclosed text.
fn strip_font_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = find_tag_start(rest, "font") {
        out.push_str(&rest[..pos]);
        match rest[pos..].find('>') {
            Some(end) => rest = &rest[pos + end + 1..],
            None => { rest = ""; }
        }
    }
    out.push_str(rest);
    out
}

/// Byte offset of the next `<name` or `</name` tag opening, ASCII
/// case-insensitive. The offset always lands on `<`, so it is a char boundary.
fn find_tag_start(text: &str, name: &str) -> Option<usize> {
    let open  = format!("<{name}").into_bytes();
    let close = format!("</{name}").into_bytes();
    match (find_ci(text.as_bytes(), &open), find_ci(text.as_bytes(), &close)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None)    => Some(a),
        (None, Some(b))    => Some(b),
        (None, None)       => None,
    }
}

fn find_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w.eq_ignore_ascii_case(needle))
}

// ─── Secret-chat un-escape ────────────────────────────────────────────────────

/// Fold host markup back to plain text for transports that support none:
/// `<code>` tags are dropped and HTML entities decoded.
pub fn unescape_for_plain(text: &str) -> String {
    let without_tags = text.replace("<code>", "").replace("</code>", "");
    decode_entities(&without_tags)
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;",  "<")
     .replace("&gt;",  ">")
     .replace("&quot;", "\"")
     .replace("&#39;", "'")
     .replace("&nbsp;", "\u{00A0}")
     .replace("&amp;", "&")
}

// ─── Inline images ────────────────────────────────────────────────────────────

/// Pull `<img src="…">` references out of composed text.
///
/// Returns the text with the tags removed plus the referenced paths, in
/// order of appearance. Tags without a `src` attribute are dropped silently.
pub fn extract_inline_images(text: &str) -> (String, Vec<PathBuf>) {
    let mut out    = String::with_capacity(text.len());
    let mut images = Vec::new();
    let mut rest   = text;

    while let Some(pos) = find_tag_start(rest, "img") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.find('>') {
            Some(end) => {
                if let Some(src) = attr_value(&tail[..end], "src") {
                    images.push(PathBuf::from(src));
                }
                rest = &tail[end + 1..];
            }
            None => { rest = ""; }
        }
    }
    out.push_str(rest);
    (out, images)
}

/// Value of a `key="value"` (or single-quoted, or bare) attribute in a tag.
fn attr_value(tag: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=").into_bytes();
    let idx = find_ci(tag.as_bytes(), &needle)?;
    let rem = &tag[idx + needle.len()..];
    if let Some(stripped) = rem.strip_prefix('"') {
        stripped.find('"').map(|end| stripped[..end].to_string())
    } else if let Some(stripped) = rem.strip_prefix('\'') {
        stripped.find('\'').map(|end| stripped[..end].to_string())
    } else {
        let end = rem.find(|c: char| c.is_whitespace() || c == '>').unwrap_or(rem.len());
        Some(rem[..end].to_string())
    }
}

// ─── Chunking ─────────────────────────────────────────────────────────────────

/// Split `text` into chunks of at most `size` Unicode code points, preserving
/// left-to-right order. Empty text yields no chunks.
pub fn split_chunks(text: &str, size: usize) -> Vec<String> {
    debug_assert!(size > 0);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size)
        .map(|c| c.iter().collect())
        .collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
