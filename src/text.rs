use regex::Regex;
use std::sync::OnceLock;

const STOP_WORDS: [&str; 13] = [
    "the", "it", "is", "to", "and", "a", "in", "of", "that", "this", "etc", "for", "on",
];

fn block_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<\s*(br\s*/?|/\s*(p|div|li|h[1-6]|tr))\s*>").expect("valid regex")
    })
}

/// Real tags and comments only; a bare `<` or `>` in prose is text.
fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[/!]?[A-Za-z][^>]*>").expect("valid regex"))
}

/// Reduces tracker HTML to plain text, one logical line per block element.
pub fn strip_markup(raw: &str) -> String {
    let with_breaks = block_break().replace_all(raw, "\n");
    let without_tags = any_tag().replace_all(&with_breaks, "");
    let decoded = decode_entities(&without_tags);

    let mut lines: Vec<&str> = Vec::new();
    for line in decoded.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Drops the fixed stop-word set, case-insensitively, token by token.
pub fn remove_stop_words(text: &str) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let kept: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !STOP_WORDS.contains(&t.to_lowercase().as_str()))
        .collect();
    tracing::debug!(
        "Removed stop words. Original length: {}, filtered length: {}",
        tokens.len(),
        kept.len()
    );
    kept.join(" ")
}
