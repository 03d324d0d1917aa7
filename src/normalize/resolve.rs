//! Field Resolver: picks the value a canonical attribute should adopt, by
//! consulting the ordered legacy alias keys. Pure over one document.

use crate::schema::FieldSpec;
use serde_json::{Map, Value};

/// "Empty" means absent, JSON null, or a whitespace-only string. Numbers
/// (including zero) and booleans are data.
pub fn is_empty(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[derive(Debug, PartialEq)]
pub enum Resolution<'a> {
    /// The canonical field already holds data; it is authoritative and the
    /// aliases are ignored.
    AlreadyCanonical,
    /// First non-empty alias in precedence order.
    FromAlias {
        alias: &'static str,
        value: &'a Value,
    },
    /// Neither the canonical field nor any alias holds data.
    Unresolved,
}

pub fn resolve<'a>(doc: &'a Map<String, Value>, spec: &'static FieldSpec) -> Resolution<'a> {
    if !is_empty(doc.get(spec.canonical)) {
        return Resolution::AlreadyCanonical;
    }
    for alias in spec.aliases {
        if let Some(v) = doc.get(*alias) {
            if !is_empty(Some(v)) {
                return Resolution::FromAlias { alias, value: v };
            }
        }
    }
    Resolution::Unresolved
}
