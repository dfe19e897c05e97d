use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{GATEWAY_TIMEOUT_STATUS, INTERNAL_ERROR_STATUS};

/// Outcome of forwarding one delivery, sent back through the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Must match the id of the delivery it answers
    pub id: String,

    /// HTTP status code reported to the relay server
    pub status: u16,

    /// Response headers, one value per name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Raw response payload
    #[serde(default)]
    pub body: String,
}

impl DeliveryResult {
    /// Create a new result without headers or body
    pub fn new(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    /// Result reported when the local service did not answer in time
    pub fn timed_out(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            body: message.into(),
            ..Self::new(id, GATEWAY_TIMEOUT_STATUS)
        }
    }

    /// Result reported when forwarding failed before a response was read
    pub fn internal_error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            body: message.into(),
            ..Self::new(id, INTERNAL_ERROR_STATUS)
        }
    }
}
