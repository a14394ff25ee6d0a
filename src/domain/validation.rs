use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// A decoded request body: field name to raw JSON value.
pub type Payload = Map<String, Value>;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const NOT_STRING: &str = "Not a valid string.";
pub const NOT_BOOLEAN: &str = "Must be a valid boolean.";

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self { Self::default() }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, field: &str) -> Option<&[String]> { self.0.get(field).map(Vec::as_slice) }

    pub fn fields(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

    /// `Ok(value)` when nothing was recorded, otherwise the collected errors.
    pub fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Whether a write replaces the whole record or merges the supplied fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode { Full, Partial }

impl UpdateMode {
    pub fn is_partial(self) -> bool { matches!(self, UpdateMode::Partial) }
}

#[derive(Debug, Clone, Copy)]
pub struct TextRules {
    pub max_length: Option<usize>,
    pub allow_blank: bool,
}

impl TextRules {
    pub const fn required(max_length: Option<usize>) -> Self { Self { max_length, allow_blank: false } }
    pub const fn blankable(max_length: Option<usize>) -> Self { Self { max_length, allow_blank: true } }
}

/// Reads a text field. Numbers are coerced to their string form and
/// surrounding whitespace is trimmed before the blank and length checks.
pub fn text(payload: &Payload, field: &str, rules: TextRules, required: bool, errors: &mut FieldErrors) -> Option<String> {
    let raw = match payload.get(field) {
        None => {
            if required { errors.add(field, REQUIRED); }
            return None;
        }
        Some(Value::Null) => {
            errors.add(field, NOT_NULL);
            return None;
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            errors.add(field, NOT_STRING);
            return None;
        }
    };
    let value = raw.trim().to_string();
    if value.is_empty() && !rules.allow_blank {
        errors.add(field, NOT_BLANK);
        return None;
    }
    if let Some(max) = rules.max_length {
        if value.chars().count() > max {
            errors.add(field, format!("Ensure this field has no more than {max} characters."));
            return None;
        }
    }
    Some(value)
}

/// Reads a boolean field, accepting the usual textual and numeric spellings.
pub fn boolean(payload: &Payload, field: &str, errors: &mut FieldErrors) -> Option<bool> {
    let parsed = match payload.get(field)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() { Some(1) => Some(true), Some(0) => Some(false), _ => None },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Some(true),
            "false" | "0" | "no" | "n" | "off" => Some(false),
            _ => None,
        },
        Value::Null => {
            errors.add(field, NOT_NULL);
            return None;
        }
        _ => None,
    };
    if parsed.is_none() { errors.add(field, NOT_BOOLEAN); }
    parsed
}

/// Reads a list of integer primary keys. Numeric strings are accepted.
pub fn primary_keys(payload: &Payload, field: &str, errors: &mut FieldErrors) -> Option<Vec<i64>> {
    let items = match payload.get(field)? {
        Value::Array(items) => items,
        Value::Null => {
            errors.add(field, NOT_NULL);
            return None;
        }
        other => {
            errors.add(field, format!("Expected a list of items but got type \"{}\".", type_name(other)));
            return None;
        }
    };
    let mut ids = Vec::with_capacity(items.len());
    let before = errors.get(field).map_or(0, <[String]>::len);
    for item in items {
        let id = match item {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match id {
            Some(id) => ids.push(id),
            None => errors.add(field, format!("Incorrect type. Expected pk value, received {}.", type_name(item))),
        }
    }
    if errors.get(field).map_or(0, <[String]>::len) > before { return None; }
    ids.sort_unstable();
    ids.dedup();
    Some(ids)
}

/// Name of a JSON value's type as reported in validation messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value { Value::Object(map) => map, _ => unreachable!() }
    }

    #[test]
    fn text_trims_and_rejects_blank() {
        let p = payload(json!({ "title": "  hello ", "empty": "   " }));
        let mut errors = FieldErrors::new();
        assert_eq!(text(&p, "title", TextRules::required(Some(10)), true, &mut errors).as_deref(), Some("hello"));
        assert_eq!(text(&p, "empty", TextRules::required(None), true, &mut errors), None);
        assert_eq!(errors.get("empty"), Some(&[NOT_BLANK.to_string()][..]));
    }

    #[test]
    fn text_reports_missing_only_when_required() {
        let p = payload(json!({}));
        let mut errors = FieldErrors::new();
        assert_eq!(text(&p, "a", TextRules::required(None), false, &mut errors), None);
        assert!(errors.is_empty());
        text(&p, "a", TextRules::required(None), true, &mut errors);
        assert_eq!(errors.get("a"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn text_enforces_length_and_type() {
        let p = payload(json!({ "long": "abcdef", "list": [1], "num": 42 }));
        let mut errors = FieldErrors::new();
        assert_eq!(text(&p, "long", TextRules::required(Some(5)), true, &mut errors), None);
        assert_eq!(text(&p, "list", TextRules::required(None), true, &mut errors), None);
        assert_eq!(text(&p, "num", TextRules::required(None), true, &mut errors).as_deref(), Some("42"));
        assert_eq!(errors.get("long").unwrap()[0], "Ensure this field has no more than 5 characters.");
        assert_eq!(errors.get("list").unwrap()[0], NOT_STRING);
    }

    #[test]
    fn boolean_accepts_common_spellings() {
        let p = payload(json!({ "a": "TRUE", "b": 0, "c": "off", "d": "maybe" }));
        let mut errors = FieldErrors::new();
        assert_eq!(boolean(&p, "a", &mut errors), Some(true));
        assert_eq!(boolean(&p, "b", &mut errors), Some(false));
        assert_eq!(boolean(&p, "c", &mut errors), Some(false));
        assert_eq!(boolean(&p, "d", &mut errors), None);
        assert_eq!(boolean(&p, "missing", &mut errors), None);
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["d"]);
    }

    #[test]
    fn primary_keys_dedup_and_type_errors() {
        let p = payload(json!({ "ok": [3, "1", 3], "bad": [1, true], "scalar": 5 }));
        let mut errors = FieldErrors::new();
        assert_eq!(primary_keys(&p, "ok", &mut errors), Some(vec![1, 3]));
        assert_eq!(primary_keys(&p, "bad", &mut errors), None);
        assert_eq!(primary_keys(&p, "scalar", &mut errors), None);
        assert_eq!(errors.get("bad").unwrap()[0], "Incorrect type. Expected pk value, received bool.");
        assert_eq!(errors.get("scalar").unwrap()[0], "Expected a list of items but got type \"int\".");
    }
}
