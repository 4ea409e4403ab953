use crate::logging::{FileLogger, LogLine};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// `tracing` layer that mirrors events into the redacting log file.
pub struct RedactingFileLayer {
    logger: Arc<FileLogger>,
}

impl RedactingFileLayer {
    pub fn new(logger: Arc<FileLogger>) -> Self {
        Self { logger }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(rendered));
        }
    }
}

impl<S> Layer<S> for RedactingFileLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let meta = event.metadata();
        let mut context = collector.fields;
        context.insert("target".to_string(), Value::String(meta.target().to_string()));

        let line = LogLine::now(
            *meta.level(),
            collector.message.unwrap_or_default(),
            context,
        );
        // a failing log file must never take a request down with it
        let _ = self.logger.write(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use crate::logging::{FileSink, Redactor};
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn events_are_written_with_fields_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let logger = Arc::new(FileLogger::new(
            FileSink::new(path.clone(), 0),
            Redactor::new(&LoggingConfig::default().redact_keys),
            false,
        ));
        let subscriber =
            tracing_subscriber::registry().with(RedactingFileLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(user = "alice", password = "hunter2", attempts = 3, "login failed");
        });

        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("WARN login failed"));
        assert!(contents.contains(r#""attempts":3"#));
        assert!(contents.contains(r#""password":"[REDACTED]""#));
        assert!(!contents.contains("hunter2"));
    }
}
