use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body the backend attaches to non-2xx responses (and to some 2xx ones).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Extracts `message` from a raw body, if the body is JSON and has one.
    pub fn from_body(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<ApiMessage>(body)
            .ok()
            .and_then(|parsed| parsed.message)
            .filter(|message| !message.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("field is read-only: {0}")]
    ReadOnlyField(String),
}
