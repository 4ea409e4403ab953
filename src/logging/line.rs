use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tracing::Level;

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub context: Map<String, Value>,
}

impl LogLine {
    pub fn now(level: Level, message: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            context,
        }
    }

    fn timestamp_str(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// `[timestamp] LEVEL message {context}`; the context is omitted when empty.
    pub fn to_text(&self) -> String {
        let mut out = format!("[{}] {} {}", self.timestamp_str(), self.level, self.message);
        if !self.context.is_empty() {
            out.push(' ');
            out.push_str(&Value::Object(self.context.clone()).to_string());
        }
        out
    }

    pub fn to_json(&self) -> String {
        json!({
            "timestamp": self.timestamp_str(),
            "level": self.level.to_string(),
            "message": self.message,
            "context": self.context,
        })
        .to_string()
    }
}
