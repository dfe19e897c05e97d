mod encoding;
mod format;
mod headers;

pub use encoding::{basic_auth, decode_basic_auth};
pub use format::{format_bytes, format_duration};
pub use headers::{flatten_headers, map_to_headers};
