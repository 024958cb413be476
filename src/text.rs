//! Text cleanup for upstream review fields.

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strips HTML tags, decodes the common entities, replaces control and
/// zero-width characters with spaces, and collapses whitespace.
pub fn clean_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    // Escaped markup decodes into tags, so strip twice.
    let stripped = TAG_RE.replace_all(s, " ");
    let decoded = decode_entities(&stripped);
    let decoded = TAG_RE.replace_all(&decoded, " ");

    let visible: String = decoded
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}' | '\u{a0}')
            {
                ' '
            } else {
                c
            }
        })
        .collect();

    WS_RE.replace_all(&visible, " ").trim().to_string()
}

/// Like [`clean_text`], but maps an empty result to `None`.
pub fn clean_optional(s: Option<&str>) -> Option<String> {
    s.map(clean_text).filter(|t| !t.is_empty())
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    // &amp; last so "&amp;lt;" decodes to "&lt;" and not "<".
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
