//! Text helpers for Arabic listing pages.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static PRICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d,]+(?:\.\d+)?").unwrap());
static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static TRAILING_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)$").unwrap());

/// Replace Arabic-Indic and Persian digits and separators with ASCII ones.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٬' => ',',
            '٫' => '.',
            _ => c,
        })
        .collect()
}

/// Extract a price in SAR, honouring "million" / "thousand" words.
pub fn parse_price(text: &str) -> Option<f64> {
    let text = normalize_digits(text.trim());
    if text.is_empty() {
        return None;
    }

    let number = PRICE_RE
        .find_iter(&text)
        .map(|m| m.as_str().replace(',', ""))
        .find(|s| !s.is_empty())?;
    let value: f64 = number.parse().ok()?;

    let lower = text.to_lowercase();
    let multiplier = if text.contains("مليون") || lower.contains("million") {
        1_000_000.0
    } else if text.contains("ألف") || text.contains("الف") || lower.contains("thousand") {
        1_000.0
    } else {
        1.0
    };

    Some(value * multiplier)
}

/// Extract an area in square meters.
pub fn parse_size(text: &str) -> Option<f64> {
    let text = normalize_digits(text).replace(',', "");
    DECIMAL_RE.find(&text)?.as_str().parse().ok()
}

pub fn first_integer(text: &str) -> Option<u32> {
    let text = normalize_digits(text);
    INTEGER_RE.find(&text)?.as_str().parse().ok()
}

/// Listing URLs end in `some-title-city-district-1234567`; take the trailing digits.
pub fn extract_id_from_url(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    let last = path.trim_end_matches('/').rsplit('/').next()?;

    if let Some(caps) = TRAILING_ID_RE.captures(last) {
        return Some(caps[1].to_string());
    }
    if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) {
        return Some(last.to_string());
    }
    None
}

pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}
