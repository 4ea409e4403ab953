//! Whitelist-driven ingestion of JSON documents.
//!
//! A body is decoded, checked key by key against a [`PayloadSchema`],
//! normalised, and rendered back as an escaped HTML fragment for display.

pub mod sanitize;
pub mod schema;

pub use sanitize::{escape_html, render_definition_list};
pub use schema::{FieldKind, FieldSpec, PayloadSchema};

use crate::error::TollgateError;
use serde_json::{Map, Value};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub data: Map<String, Value>,
    pub html: String,
}

/// Decode `body`, validate it against `schema` and render it.
pub fn process(schema: &PayloadSchema, body: &[u8]) -> Result<Processed, TollgateError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(TollgateError::MalformedPayload("empty body".to_string()));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| TollgateError::MalformedPayload(format!("invalid JSON: {e}")))?;
    let data = schema
        .validate(value)
        .map_err(TollgateError::ValidationFailed)?;
    let html = render_definition_list(schema, &data);
    Ok(Processed { data, html })
}
