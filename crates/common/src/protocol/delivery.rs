use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::DEFAULT_FORWARD_METHOD;

/// A webhook call the relay server wants forwarded to the local service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Correlation token assigned by the server, echoed back in the result
    pub id: String,

    /// Request headers, one value per name
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Path (and optional query) appended to the local address
    /// Example: "/webhooks/stripe?attempt=2"
    pub path: String,

    /// Raw request payload
    #[serde(default)]
    pub body: String,

    /// HTTP method of the original call; older servers never send it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Delivery {
    /// Create a new delivery without headers or body
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            headers: HashMap::new(),
            path: path.into(),
            body: String::new(),
            method: None,
        }
    }

    /// The method to use when calling the local service
    pub fn method(&self) -> &str {
        self.method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_FORWARD_METHOD)
    }

    /// Check if the delivery has a body
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}
