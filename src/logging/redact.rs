use crate::logging::line::LogLine;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;

pub const REDACTED: &str = "[REDACTED]";

static BEARER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bearer|basic)\s+[A-Za-z0-9\-._~+/]+=*").expect("static regex")
});

// 13 to 19 digits, optionally grouped by spaces or dashes
static CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("static regex"));

/// Scrubs sensitive values from log messages and structured context.
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: Vec<String>,
    pair_re: Option<Regex>,
}

impl Redactor {
    pub fn new(keys: &[String]) -> Self {
        let keys: Vec<String> = keys
            .iter()
            .map(|k| k.trim().to_ascii_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let pair_re = (!keys.is_empty()).then(|| {
            let alternation = keys
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            // key=value, key: value, "key": "value"
            Regex::new(&format!(
                r#"(?i)(\b[\w-]*(?:{alternation})[\w-]*"?\s*[=:]\s*)("[^"]*"|'[^']*'|[^\s,;&]+)"#
            ))
            .expect("escaped alternation is a valid regex")
        });
        Self { keys, pair_re }
    }

    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.keys.iter().any(|k| key.contains(k.as_str()))
    }

    /// Replace values of sensitive keys, recursing through objects and arrays.
    /// String leaves under other keys still get text redaction.
    pub fn redact_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, v) in map.iter_mut() {
                    if self.is_sensitive_key(key) {
                        *v = Value::String(REDACTED.to_string());
                    } else {
                        self.redact_value(v);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.redact_value(v)),
            Value::String(s) => {
                if let Cow::Owned(clean) = self.redact_text(s) {
                    *s = clean;
                }
            }
            _ => {}
        }
    }

    pub fn redact_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        if BEARER_RE.is_match(&out) {
            out = Cow::Owned(BEARER_RE.replace_all(&out, format!("$1 {REDACTED}")).into_owned());
        }
        if let Some(re) = &self.pair_re
            && re.is_match(&out)
        {
            out = Cow::Owned(re.replace_all(&out, format!("${{1}}{REDACTED}")).into_owned());
        }
        if CARD_RE.is_match(&out) {
            out = Cow::Owned(CARD_RE.replace_all(&out, REDACTED).into_owned());
        }
        out
    }

    pub fn redact_line(&self, line: &mut LogLine) {
        if let Cow::Owned(clean) = self.redact_text(&line.message) {
            line.message = clean;
        }
        for (key, v) in line.context.iter_mut() {
            if self.is_sensitive_key(key) {
                *v = Value::String(REDACTED.to_string());
            } else {
                self.redact_value(v);
            }
        }
    }
}
