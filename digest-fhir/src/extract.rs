//! Lenient accessors over raw FHIR JSON.
//!
//! Every helper degrades to `None` or a fallback string instead of failing, so
//! partial clinical data never blocks a digest.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Placeholder for a coded concept that carries no usable text.
pub(crate) const UNKNOWN: &str = "Unknown";

/// Non-empty string field.
pub(crate) fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// First element of an array field.
pub(crate) fn first_of<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    value.get(field)?.as_array()?.first()
}

pub(crate) fn first_coding(concept: &Value) -> Option<&Value> {
    first_of(concept, "coding")
}

/// Display text of a codeable concept, `None` when nothing is usable.
pub(crate) fn resolve_display_opt(concept: Option<&Value>) -> Option<String> {
    let concept = concept?;
    if let Some(text) = str_field(concept, "text") {
        return Some(text.to_string());
    }

    let coding = first_coding(concept)?;
    str_field(coding, "display")
        .or_else(|| str_field(coding, "code"))
        .map(str::to_string)
}

/// `text`, else `coding[0].display`, else `coding[0].code`, else `"Unknown"`.
pub(crate) fn resolve_display(concept: Option<&Value>) -> String {
    resolve_display_opt(concept).unwrap_or_else(|| UNKNOWN.to_string())
}

/// Resolve a concept, substituting `fallback` when it is absent or empty.
pub(crate) fn display_or(concept: Option<&Value>, fallback: &str) -> String {
    resolve_display_opt(concept).unwrap_or_else(|| fallback.to_string())
}

/// True when any coding of `concept` matches `predicate`.
pub(crate) fn any_coding(concept: Option<&Value>, predicate: impl Fn(&Value) -> bool) -> bool {
    concept
        .and_then(|concept| concept.get("coding"))
        .and_then(Value::as_array)
        .is_some_and(|codings| codings.iter().any(predicate))
}

pub(crate) fn has_coding_code(concept: Option<&Value>, code: &str) -> bool {
    any_coding(concept, |coding| str_field(coding, "code") == Some(code))
}

/// First date found among `fields`; period objects contribute their `start`.
pub(crate) fn first_date(resource: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        let value = resource.get(*field)?;
        value
            .as_str()
            .or_else(|| value.get("start").and_then(Value::as_str))
            .filter(|text| !text.is_empty())
            .map(format_date)
    })
}

/// Render an ISO 8601 date or date-time as `YYYY-MM-DD`.
///
/// Offsets are normalized to UTC before the date is taken. Unparseable
/// input is returned unchanged.
pub(crate) fn format_date(value: &str) -> String {
    parse_date(value)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| value.to_string())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }

    // FHIR partial dates: YYYY-MM and YYYY.
    match value.len() {
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok(),
        4 if value.bytes().all(|byte| byte.is_ascii_digit()) => value
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        _ => None,
    }
}

/// Render a JSON number the way a JavaScript template literal would.
pub(crate) fn format_number(value: &Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        return Some(text.to_string()).filter(|text| !text.is_empty());
    }
    if let Some(int) = value.as_i64() {
        return Some(int.to_string());
    }
    if let Some(uint) = value.as_u64() {
        return Some(uint.to_string());
    }

    let float = value.as_f64()?;
    if float.fract() == 0.0 && float.abs() < 1e15 {
        Some(format!("{float:.0}"))
    } else {
        Some(float.to_string())
    }
}

/// `"{value}{unit}"` with `unit`, else `code`, else `default_unit`.
pub(crate) fn format_quantity(quantity: &Value, default_unit: &str) -> Option<String> {
    let number = format_number(quantity.get("value")?)?;
    let unit = str_field(quantity, "unit")
        .or_else(|| str_field(quantity, "code"))
        .unwrap_or(default_unit);
    Some(format!("{number}{unit}"))
}
