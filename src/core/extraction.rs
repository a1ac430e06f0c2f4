//! Extraction normalization - Turns raw image-understanding output into validated items.
//!
//! The external extraction service replies with free text that is *supposed*
//! to be one JSON object, but in practice arrives wrapped in markdown code
//! fences, preceded by reasoning blocks, or double-encoded as a JSON string.
//! [`normalize`] recovers the object in a fixed order of fallbacks and then
//! coerces every item field to its expected type with defaults, so the
//! ledger never sees a half-typed item.
//!
//! Contract properties preserved verbatim from the service: `price` is the
//! total paid for the line (never a recomputed unit price), `calories` is
//! for the entire purchased quantity (never per 100g/100ml), and `quantity`
//! is expressed in the item's stated unit.

use crate::errors::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder used when the service omits an item name entirely.
const UNKNOWN_ITEM_NAME: &str = "Unknown item";

/// One validated line item from an extracted receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    /// Normalized display name
    pub name: String,
    /// Name exactly as printed on the receipt
    pub original_name: String,
    /// Quantity in the stated unit, defaults to 1
    pub quantity: f64,
    /// Unit the quantity is expressed in, defaults to "piece"
    pub unit: String,
    /// Total paid for this line
    pub price: f64,
    /// Calories for the entire purchased quantity
    pub calories: f64,
    /// Optional lowercase type label suggested by the service
    pub product_type: Option<String>,
}

/// A fully normalized extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    /// Validated line items
    pub items: Vec<ParsedItem>,
    /// Receipt total as reported by the service
    pub total: f64,
    /// Receipt date, when the service could read one
    pub date: Option<NaiveDate>,
}

/// Normalizes a raw extraction response into a [`ParsedReceipt`].
///
/// Recovery order: strip reasoning tag blocks, strip markdown code fences,
/// unquote a double-encoded payload, parse; on parse failure extract the
/// first balanced `{...}` substring and retry once.
///
/// # Errors
/// - [`Error::ExtractionMalformed`] when no JSON object can be recovered
/// - [`Error::ExtractionSchemaInvalid`] when `items` is missing or not an array
pub fn normalize(raw: &str) -> Result<ParsedReceipt> {
    let mut text = strip_tag_blocks(raw, "thinking");
    text = strip_tag_blocks(&text, "think");
    text = strip_tag_blocks(&text, "reasoning");
    text = strip_code_fences(&text);

    if looks_double_encoded(&text) {
        text = unquote(&text);
        // The inner payload is sometimes fenced as well.
        text = strip_code_fences(&text);
    }

    let value = parse_with_brace_fallback(&text)?;

    let Some(object) = value.as_object() else {
        return Err(Error::ExtractionMalformed {
            message: "recovered JSON is not an object".to_string(),
        });
    };

    let items = match object.get("items") {
        Some(Value::Array(raw_items)) => raw_items.iter().map(coerce_item).collect(),
        Some(other) => {
            return Err(Error::ExtractionSchemaInvalid {
                message: format!("'items' is not an array (found {other})"),
            });
        }
        None => {
            return Err(Error::ExtractionSchemaInvalid {
                message: "'items' is missing".to_string(),
            });
        }
    };

    Ok(ParsedReceipt {
        items,
        total: coerce_f64(object.get("total"), 0.0),
        date: object.get("date").and_then(coerce_date),
    })
}

/// Removes every `<tag>...</tag>` block, contents included.
///
/// Matching is ASCII case-insensitive; an unclosed opening tag swallows the
/// rest of the text, since reasoning preambles are sometimes cut off.
fn strip_tag_blocks(text: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    // ASCII lowering keeps byte offsets aligned with the original.
    let lowered = text.to_ascii_lowercase();

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(start) = lowered[cursor..].find(&open) {
        let start = cursor + start;
        result.push_str(&text[cursor..start]);
        match lowered[start..].find(&close) {
            Some(end) => cursor = start + end + close.len(),
            None => return result,
        }
    }
    result.push_str(&text[cursor..]);
    result
}

/// Extracts the body of the first markdown code fence, or trims the text
/// when no fence is present. A language tag after the opening fence
/// (```` ```json ````) is skipped.
fn strip_code_fences(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.trim().to_string();
    };

    let after_fence = &text[open + 3..];
    // Skip the optional language identifier up to the end of the line.
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];

    let body = body.find("```").map_or(body, |close| &body[..close]);
    body.trim().to_string()
}

/// Whether the remaining text is itself a quoted JSON string.
fn looks_double_encoded(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('"') && text.ends_with('"')
}

/// Unquotes a double-encoded payload: structured unescape via `serde_json`
/// first, manual escape-sequence replacement as the fallback.
fn unquote(text: &str) -> String {
    if let Ok(inner) = serde_json::from_str::<String>(text) {
        return inner;
    }
    manual_unescape(&text[1..text.len() - 1])
}

/// Replaces the common escape sequences by hand. Used only when the quoted
/// payload is not itself valid JSON (over- or under-escaped).
fn manual_unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

/// Parses the text as JSON, retrying once on the first balanced `{...}`
/// substring when the text carries prose around the object.
fn parse_with_brace_fallback(text: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let candidate =
                extract_balanced_object(text).ok_or_else(|| Error::ExtractionMalformed {
                    message: format!("{first_error}; no balanced object found"),
                })?;
            serde_json::from_str::<Value>(candidate).map_err(|retry_error| {
                Error::ExtractionMalformed {
                    message: format!("{first_error}; retry on extracted object: {retry_error}"),
                }
            })
        }
    }
}

/// Finds the first balanced `{...}` substring, respecting strings and
/// escape sequences so braces inside item names do not break the match.
fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Coerces one raw item object into a [`ParsedItem`] with defaults.
fn coerce_item(raw: &Value) -> ParsedItem {
    let name = coerce_string(raw.get("name"), UNKNOWN_ITEM_NAME);
    let original_name = coerce_string(raw.get("originalName"), &name);
    let product_type = raw
        .get("productType")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    ParsedItem {
        quantity: coerce_f64(raw.get("quantity"), 1.0),
        unit: coerce_string(raw.get("unit"), "piece"),
        price: coerce_f64(raw.get("price"), 0.0),
        calories: coerce_f64(raw.get("calories"), 0.0),
        product_type,
        original_name,
        name,
    }
}

/// Accepts a JSON number or a numeric string; anything else is the default.
fn coerce_f64(value: Option<&Value>, default: f64) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse().unwrap_or(default),
        _ => default,
    }
}

fn coerce_string(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| default.to_string(), ToString::to_string)
}

/// Parses a `YYYY-MM-DD` date, tolerating a trailing time component.
fn coerce_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok())
}
