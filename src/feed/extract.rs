//! Best-effort field extraction for loosely structured feed entries.
//!
//! Nothing here fails: each extractor either finds a value or falls back to
//! a documented default.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::util::strip_tags;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Zone-less layouts tried after RFC 3339 and RFC 2822. Read as UTC.
const NAIVE_LAYOUTS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

static RFC822_RE: OnceLock<Regex> = OnceLock::new();
static IMG_RE: OnceLock<Regex> = OnceLock::new();
static BYLINE_RE: OnceLock<Regex> = OnceLock::new();

/// Parses a feed timestamp, falling back to `fallback` (the fetch time).
///
/// Order: RFC 3339 / ISO-like layouts and strict RFC 2822, then a loose
/// `Day, DD Mon YYYY HH:MM[:SS] [+zone]` match, then `fallback`.
pub fn parse_timestamp(raw: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let raw = raw.trim();
    parse_generic(raw)
        .or_else(|| parse_rfc822_loose(raw))
        .unwrap_or(fallback)
}

fn parse_generic(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_rfc822_loose(raw: &str) -> Option<DateTime<Utc>> {
    let re = RFC822_RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:[a-z]{3,},?\s+)?(\d{1,2})\s+([a-z]{3})[a-z]*\.?\s+(\d{4})\s+(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([+-]\d{4}|[a-z]{1,5})\b)?",
        )
        .expect("rfc822 regex")
    });
    let caps = re.captures(raw)?;

    let day: u32 = caps[1].parse().ok()?;
    let month_name = caps[2].to_ascii_lowercase();
    let month = MONTHS.iter().position(|m| *m == month_name)? as u32 + 1;
    let year: i32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;
    let second: u32 = caps.get(6).map_or(Some(0), |m| m.as_str().parse().ok())?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;

    match caps.get(7) {
        Some(zone) => {
            let offset = FixedOffset::east_opt(zone_offset_secs(zone.as_str())?)?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
        None => Some(naive.and_utc()),
    }
}

/// Seconds east of UTC for `+hhmm`/`-hhmm` or an RFC 822 zone name.
fn zone_offset_secs(zone: &str) -> Option<i32> {
    if let Some(digits) = zone.strip_prefix(|c| c == '+' || c == '-') {
        let sign = if zone.starts_with('-') { -1 } else { 1 };
        let hours: i32 = digits.get(0..2)?.parse().ok()?;
        let minutes: i32 = digits.get(2..4)?.parse().ok()?;
        return Some(sign * (hours * 3600 + minutes * 60));
    }

    let hours = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        _ => return None,
    };
    Some(hours * 3600)
}

/// First `<img src="...">` in an HTML fragment.
pub fn extract_image(html: &str) -> Option<String> {
    let re = IMG_RE.get_or_init(|| {
        Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("img regex")
    });
    re.captures(html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|src| !src.is_empty())
}

/// Name from a `by Jane Doe` byline in an HTML fragment.
///
/// "by" matches in any case; the name is one to four capitalized words.
pub fn extract_author(html: &str) -> Option<String> {
    let re = BYLINE_RE.get_or_init(|| {
        Regex::new(r"\b(?i:by)\s+(\p{Lu}[\p{L}'.\-]*(?:\s+\p{Lu}[\p{L}'.\-]*){0,3})")
            .expect("byline regex")
    });
    let text = strip_tags(html);
    re.captures(&text)
        .map(|caps| caps[1].trim().trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty())
}
