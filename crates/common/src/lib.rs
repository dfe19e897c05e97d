//! Shared types for the hookrelay webhook relay client
//!
//! This crate holds the wire protocol exchanged with the relay server, the
//! error taxonomy, and the small utilities (auth header, header flattening,
//! input validation) used by the client application.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{RelayError, Result};
pub use protocol::{Delivery, DeliveryResult};
pub use utils::{
    basic_auth, decode_basic_auth, flatten_headers, format_bytes, format_duration,
    map_to_headers,
};
pub use validation::ValidationError;
