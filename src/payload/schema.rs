use crate::error::FieldError;
use crate::payload::sanitize::clean_text;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String { max_len: usize },
    Integer { min: i64, max: i64 },
    Bool,
    StringList { max_items: usize, max_len: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
        }
    }
}

/// Closed set of accepted keys. Anything not listed is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadSchema {
    fields: Vec<FieldSpec>,
}

impl PayloadSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Profile-update record accepted by `POST /api/payload`.
    pub fn profile() -> Self {
        Self::new(vec![
            FieldSpec::required("name", "Name", FieldKind::String { max_len: 100 }),
            FieldSpec::optional("email", "Email", FieldKind::String { max_len: 254 }),
            FieldSpec::optional("age", "Age", FieldKind::Integer { min: 0, max: 150 }),
            FieldSpec::optional("newsletter", "Newsletter", FieldKind::Bool),
            FieldSpec::optional(
                "tags",
                "Tags",
                FieldKind::StringList {
                    max_items: 10,
                    max_len: 32,
                },
            ),
        ])
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check every key and value; collect all problems rather than stopping at
    /// the first. Returns the normalised document on success.
    pub fn validate(&self, value: Value) -> Result<Map<String, Value>, Vec<FieldError>> {
        let Value::Object(input) = value else {
            return Err(vec![FieldError::new("$", "payload must be a JSON object")]);
        };

        let mut errors = Vec::new();
        let mut out = Map::new();

        for (key, raw) in input {
            let Some(spec) = self.spec(&key) else {
                errors.push(FieldError::new(key, "unknown field"));
                continue;
            };
            if raw.is_null() && !spec.required {
                continue;
            }
            match check_kind(&spec.kind, raw) {
                Ok(v) => {
                    out.insert(key, v);
                }
                Err(msg) => errors.push(FieldError::new(key, msg)),
            }
        }

        for spec in self.fields.iter().filter(|f| f.required) {
            if !out.contains_key(spec.name) && !errors.iter().any(|e| e.field == spec.name) {
                errors.push(FieldError::new(spec.name, "is required"));
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(errors)
        }
    }
}

fn check_string(raw: &str, max_len: usize) -> Result<String, String> {
    let clean = clean_text(raw);
    if clean.chars().count() > max_len {
        return Err(format!("must be at most {max_len} characters"));
    }
    Ok(clean)
}

fn check_kind(kind: &FieldKind, raw: Value) -> Result<Value, String> {
    match (kind, raw) {
        (FieldKind::String { max_len }, Value::String(s)) => {
            check_string(&s, *max_len).map(Value::String)
        }
        (FieldKind::Integer { min, max }, Value::Number(n)) => {
            let Some(i) = n.as_i64() else {
                return Err("must be an integer".to_string());
            };
            if i < *min || i > *max {
                return Err(format!("must be between {min} and {max}"));
            }
            Ok(Value::from(i))
        }
        (FieldKind::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (
            FieldKind::StringList {
                max_items,
                max_len,
            },
            Value::Array(items),
        ) => {
            if items.len() > *max_items {
                return Err(format!("must have at most {max_items} items"));
            }
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => check_string(&s, *max_len).map(Value::String),
                    _ => Err("items must be strings".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        (FieldKind::String { .. }, _) => Err("must be a string".to_string()),
        (FieldKind::Integer { .. }, _) => Err("must be an integer".to_string()),
        (FieldKind::Bool, _) => Err("must be a boolean".to_string()),
        (FieldKind::StringList { .. }, _) => Err("must be a list of strings".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields_of(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn rejects_non_objects() {
        let errs = PayloadSchema::profile().validate(json!([1, 2])).unwrap_err();
        assert_eq!(fields_of(&errs), vec!["$"]);
    }

    #[test]
    fn reports_every_bad_field() {
        let errs = PayloadSchema::profile()
            .validate(json!({
                "age": 200,
                "newsletter": "yes",
                "role": "admin",
                "tags": ["ok", {"nested": true}],
            }))
            .unwrap_err();
        let mut fields = fields_of(&errs);
        fields.sort();
        assert_eq!(fields, vec!["age", "name", "newsletter", "role", "tags"]);
    }

    #[test]
    fn null_optional_fields_are_dropped() {
        let data = PayloadSchema::profile()
            .validate(json!({"name": "Bo", "email": null}))
            .unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn length_is_checked_after_trimming() {
        let long = format!("  {}  ", "a".repeat(100));
        assert!(PayloadSchema::profile().validate(json!({"name": long})).is_ok());
        let too_long = "a".repeat(101);
        assert!(
            PayloadSchema::profile()
                .validate(json!({"name": too_long}))
                .is_err()
        );
    }

    #[test]
    fn fractional_numbers_are_not_integers() {
        let errs = PayloadSchema::profile()
            .validate(json!({"name": "x", "age": 3.5}))
            .unwrap_err();
        assert_eq!(errs[0].message, "must be an integer");
    }
}
