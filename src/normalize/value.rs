//! Value Normalizer: coerces a resolved raw value into the canonical
//! representation for its field kind. Pure and deterministic; a malformed
//! value resolves to `Absent` (or a flagged raw value), never an error.

use crate::schema::{FieldKind, CPF_LEN};
use chrono::NaiveDate;
use serde_json::Value;

#[derive(Debug, PartialEq)]
pub enum Normalized {
    /// Ready to store under the canonical key.
    Ready(Value),
    /// No usable value (unparseable date, whitespace-only text).
    Absent,
    /// Digits field longer than the target length after stripping. Stored
    /// as-is but surfaced as needs-manual-review; never truncated.
    OverlongDigits(String),
}

/// String rendering of a scalar raw value. Arrays and objects are not usable
/// as scalar field sources.
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn normalize(kind: FieldKind, raw: &Value) -> Normalized {
    let Some(text) = scalar_text(raw) else {
        return Normalized::Absent;
    };
    match kind {
        FieldKind::Text | FieldKind::OpenEnum => {
            let t = text.trim();
            if t.is_empty() {
                Normalized::Absent
            } else {
                Normalized::Ready(Value::String(t.to_string()))
            }
        }
        FieldKind::Compact => {
            let t: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if t.is_empty() {
                Normalized::Absent
            } else {
                Normalized::Ready(Value::String(t))
            }
        }
        FieldKind::Digits11 => {
            let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                Normalized::Absent
            } else if digits.len() > CPF_LEN {
                Normalized::OverlongDigits(digits)
            } else {
                Normalized::Ready(Value::String(format!(
                    "{:0>width$}",
                    digits,
                    width = CPF_LEN
                )))
            }
        }
        FieldKind::Date => match parse_date(&text) {
            Some(d) => Normalized::Ready(Value::String(d.format("%Y-%m-%d").to_string())),
            None => Normalized::Absent,
        },
    }
}

/// Accepts the date shapes seen across the import history: ISO dates, the
/// Brazilian day-first forms, and ISO datetimes (the store serializes Date
/// values with a time component).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    let day_part = t.split('T').next().unwrap_or(t);
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(day_part, fmt) {
            return Some(d);
        }
    }
    None
}
