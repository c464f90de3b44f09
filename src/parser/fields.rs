//! Per-field normalization rules. None of these fail: anything that does not
//! parse becomes `None` (or 0 for review counts).

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+\.?[0-9]*)\s*OZ").unwrap());

/// Stand-in the listing uses when an item has no price.
pub const PRICE_PLACEHOLDER: &str = "Price not available";

/// "$1,234.56" → 1234.56. Anything non-numeric (including the placeholder) is `None`.
pub fn parse_price(price: &str) -> Option<f64> {
    let cleaned = price.replace(['$', ','], "");
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
}

/// Price from the raw `linePrice` value; numbers pass through untouched.
pub fn price_value(raw: Option<&Value>) -> Option<f64> {
    match raw {
        None => parse_price(PRICE_PLACEHOLDER),
        Some(Value::String(s)) => parse_price(s),
        Some(Value::Number(n)) => n.as_f64().filter(|p| p.is_finite()),
        Some(_) => None,
    }
}

/// Strip `<li>`/`</li>` tokens and surrounding whitespace. Non-strings are `None`.
pub fn clean_description(raw: Option<&Value>) -> Option<String> {
    let text = raw?.as_str()?;
    Some(text.replace("<li>", "").replace("</li>", "").trim().to_string())
}

/// First "<number> OZ" quantity in the description.
pub fn extract_weight(description: Option<&str>) -> Option<f64> {
    let caps = WEIGHT_RE.captures(description?)?;
    caps[1].parse::<f64>().ok()
}

pub fn rating_value(raw: Option<&Value>) -> Option<f64> {
    raw?.as_f64()
}

/// Review count, truncated toward zero. Integer strings ("12") are counts too;
/// anything else is 0.
pub fn review_count(raw: Option<&Value>) -> i64 {
    match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}
