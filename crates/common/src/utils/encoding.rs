use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Build the value of a Basic `Authorization` header
pub fn basic_auth(project_id: &str, cli_secret: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", project_id, cli_secret))
    )
}

/// Split a Basic `Authorization` header value back into its two parts
pub fn decode_basic_auth(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (project_id, cli_secret) = decoded.split_once(':')?;

    Some((project_id.to_string(), cli_secret.to_string()))
}
