use regex::Regex;
use std::sync::OnceLock;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

static TAG_RE: OnceLock<Regex> = OnceLock::new();
static ENTITY_RE: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex"))
}

fn entity_re() -> &'static Regex {
    ENTITY_RE.get_or_init(|| Regex::new(r"&[a-zA-Z]+;").expect("entity regex"))
}

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// Removes markup tags, leaving the text between them untouched.
pub fn strip_tags(s: &str) -> String {
    tag_re().replace_all(s, "").into_owned()
}

/// Sanitizes feed text for display.
///
/// Strips `<...>` tags and named `&name;` entities, drops control characters,
/// collapses whitespace runs to one space and trims both ends. Entities are
/// removed rather than decoded, so `"a &amp; b"` becomes `"a b"`.
///
/// ```
/// use newsdeck::util::clean_text;
///
/// assert_eq!(clean_text("<b>Hi</b> &amp; bye  there"), "Hi bye there");
/// ```
pub fn clean_text(s: &str) -> String {
    let without_tags = tag_re().replace_all(s, "");
    let without_entities = entity_re().replace_all(&without_tags, "");
    let printable: String = without_entities
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    whitespace_re()
        .replace_all(&printable, " ")
        .trim()
        .to_string()
}

/// Terminal column width of `s`.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Shortens `s` to at most `max_width` terminal columns, ending with `...`
/// when anything was cut. Wide characters are never split.
pub fn truncate_to_width(s: &str, max_width: usize) -> String {
    if display_width(s) <= max_width {
        return s.to_string();
    }
    // Too narrow for an ellipsis: hard cut.
    let budget = if max_width > 3 { max_width - 3 } else { max_width };

    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    if max_width > 3 {
        out.push_str("...");
    }
    out
}
