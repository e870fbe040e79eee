//! Best-effort field extraction from spreadsheet cells and free-text
//! overview blocks. Every extractor answers `None` instead of failing.

use chrono::NaiveDate;
use cpm_core::CellValue;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::lookup::RegionEntry;

/// Integer part optionally thousands-grouped, optional decimal part.
const NUMBER: &str = r"(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?";

fn compile(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("{NUM}", NUMBER)).expect("static extractor pattern")
}

static BUILT_UP_AREA_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?is)연면적.*?({NUM})\s*㎡"));
static SITE_AREA_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?is)대지면적.*?({NUM})\s*㎡"));

// Four-digit year in one of the accepted date shapes.
static DATE_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\d{4}(?:\.\d{1,2}\.\d{1,2}|-\d{1,2}-\d{1,2}|\d{4})$"));

static GROUND_FLOORS_RE: Lazy<Regex> = Lazy::new(|| compile(r"지상\s*(\d+)\s*층?"));
static BASEMENT_FLOORS_RE: Lazy<Regex> = Lazy::new(|| compile(r"지하\s*(\d+)\s*층?"));

// Order matters: the first pattern that matches wins. The trailing
// `(?:[^수]|$)` keeps "세대수" from being read as a "세대" unit.
static HOUSEHOLD_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"세대수\s*[:：]\s*({NUM})",
        r"세\s+대\s+수\s*[:：]?\s*({NUM})",
        r"({NUM})\s*세대(?:[^수]|$)",
        r"({NUM})\s*세\s+대(?:[^수]|$)",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

static AMOUNT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"금액\s*[:：]?\s*({NUM})",
        r"공사비\s*[:：]?\s*({NUM})",
        r"공사금액\s*[:：]?\s*({NUM})",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaLabel {
    BuiltUp,
    Site,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorLabel {
    Ground,
    Basement,
}

/// Remove thousands separators from a matched number.
pub fn strip_grouping(number: &str) -> String {
    number.replace(',', "")
}

/// Parse a cell into `YYYY-MM-DD`.
///
/// Text is tried as `YYYY.MM.DD`, then `YYYYMMDD`, then `YYYY-MM-DD`.
pub fn parse_date(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty => None,
        CellValue::Date(date) => Some(format_date(*date)),
        CellValue::Number(_) => parse_date_text(&value.to_text()),
        CellValue::Text(text) => parse_date_text(text),
    }
}

pub fn parse_date_text(text: &str) -> Option<String> {
    let text = text.trim();
    if !DATE_SHAPE_RE.is_match(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y.%m.%d")
        .ok()
        .or_else(|| parse_compact_date(text))
        .or_else(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok())
        .map(format_date)
}

fn parse_compact_date(text: &str) -> Option<NaiveDate> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = text[0..4].parse().ok()?;
    let month = text[4..6].parse().ok()?;
    let day = text[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn extract_area(text: &str, label: AreaLabel) -> Option<String> {
    let re = match label {
        AreaLabel::BuiltUp => &*BUILT_UP_AREA_RE,
        AreaLabel::Site => &*SITE_AREA_RE,
    };
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| strip_grouping(m.as_str()))
}

pub fn extract_floors(text: &str, label: FloorLabel) -> Option<i64> {
    let re = match label {
        FloorLabel::Ground => &*GROUND_FLOORS_RE,
        FloorLabel::Basement => &*BASEMENT_FLOORS_RE,
    };
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text).and_then(|caps| caps.get(1)))
        .map(|m| strip_grouping(m.as_str()))
}

pub fn extract_households(text: &str) -> Option<String> {
    first_capture(&HOUSEHOLD_RES, text)
}

pub fn extract_amount(text: &str) -> Option<String> {
    first_capture(&AMOUNT_RES, text)
}

fn is_opening(c: char) -> bool {
    matches!(c, '[' | '(')
}

fn is_closing(c: char) -> bool {
    matches!(c, ']' | ')')
}

/// Drop a short leading bracketed tag such as `[긴급]` or `(재)` from a name.
pub fn clean_project_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= 4 {
        return name.to_string();
    }
    let rest = |close: usize| chars[close + 1..].iter().collect::<String>().trim().to_string();

    if let Some(close) = chars[..4].iter().position(|c| is_closing(*c)) {
        return rest(close);
    }
    if let Some(close) = chars.iter().position(|c| is_closing(*c)) {
        if let Some(open) = chars[..close].iter().position(|c| is_opening(*c)) {
            if open <= 3 {
                return rest(close);
            }
        }
    }
    name.to_string()
}

/// Case-insensitive substring test against a keyword list.
pub fn contains_any_keyword(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .any(|k| name.contains(&k.to_lowercase()))
}

/// Code of the first table entry whose name occurs in `address`.
pub fn map_region(address: &str, table: &[RegionEntry]) -> String {
    if address.trim().is_empty() {
        return String::new();
    }
    table
        .iter()
        .find(|entry| !entry.name.is_empty() && address.contains(entry.name.as_str()))
        .map(|entry| entry.code.clone())
        .unwrap_or_default()
}
