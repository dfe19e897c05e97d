use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Flatten HTTP headers to one value per name
/// When a name carries several values the first one wins
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());

    for (name, value) in headers.iter() {
        map.entry(name.as_str().to_string())
            .or_insert_with(|| value.to_str().unwrap_or("").to_string());
    }

    map
}

/// Convert single-valued headers to an HTTP HeaderMap
/// Names or values that are not valid HTTP are skipped
pub fn map_to_headers(map: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(map.len());

    for (name, value) in map.iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(header_name, header_value);
        }
    }

    headers
}
