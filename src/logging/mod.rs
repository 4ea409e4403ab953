//! Redacting file logger.
//!
//! Every line is built from a timestamp, a level, a message and an optional
//! structured context, scrubbed by [`Redactor`] and appended to a single file
//! by [`FileSink`]. [`RedactingFileLayer`] feeds `tracing` events through the
//! same path so application code only ever calls the `tracing` macros.

pub mod layer;
pub mod line;
pub mod redact;
pub mod sink;

pub use layer::RedactingFileLayer;
pub use line::LogLine;
pub use redact::Redactor;
pub use sink::FileSink;

use crate::config::LoggingConfig;
use std::io;
use std::sync::Arc;

/// Formats, redacts and appends log lines.
pub struct FileLogger {
    sink: FileSink,
    redactor: Redactor,
    json: bool,
}

impl FileLogger {
    pub fn new(sink: FileSink, redactor: Redactor, json: bool) -> Self {
        Self {
            sink,
            redactor,
            json,
        }
    }

    /// Build from config; `None` when no log file is configured.
    pub fn from_config(cfg: &LoggingConfig) -> Option<Arc<Self>> {
        let path = cfg.file.clone()?;
        let sink = FileSink::new(path, cfg.max_file_bytes);
        let redactor = Redactor::new(&cfg.redact_keys);
        Some(Arc::new(Self::new(sink, redactor, cfg.json)))
    }

    pub fn write(&self, mut line: LogLine) -> io::Result<()> {
        self.redactor.redact_line(&mut line);
        let text = if self.json {
            line.to_json()
        } else {
            line.to_text()
        };
        self.sink.append(&text)
    }
}
