//! Input validation for user-supplied configuration
//!
//! The local address and project ID are checked before a session is opened so
//! that typos surface as readable messages instead of connection failures.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

/// Regex for validating project IDs (pro- prefix + decimal number)
static PROJECT_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^pro-[0-9]+$").unwrap());

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid projectID, must be of format pro-<number>")]
    InvalidProjectId,

    #[error("Invalid localAddress: {0}")]
    InvalidUrl(String),

    #[error("Invalid localAddress: must have http or https scheme")]
    UnsupportedScheme,

    #[error("Invalid localAddress: must have empty path")]
    NonEmptyPath,

    #[error("Invalid localAddress: must have no query parameters")]
    HasQuery,

    #[error("Invalid localAddress: must have no fragment")]
    HasFragment,

    #[error("Invalid localAddress: must have no user authentication")]
    HasUserInfo,

    #[error("Invalid localAddress: {0} not reachable")]
    Unreachable(String),
}

/// Validate project ID format
///
/// # Examples
///
/// ```
/// use hookrelay_common::validation::validate_project_id;
///
/// assert!(validate_project_id("pro-1234").is_ok());
/// assert!(validate_project_id("pro-").is_err());
/// assert!(validate_project_id("project-1").is_err());
/// ```
pub fn validate_project_id(id: &str) -> Result<(), ValidationError> {
    if !PROJECT_ID_REGEX.is_match(id) || id[4..].parse::<u64>().is_err() {
        return Err(ValidationError::InvalidProjectId);
    }
    Ok(())
}

/// Validate the syntax of the local service address
///
/// The address must be a bare origin: http or https, no path, query,
/// fragment or credentials. Reachability is checked separately.
pub fn validate_local_address(address: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(address).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::UnsupportedScheme);
    }

    // Url normalizes an empty path to "/"
    if url.path() != "/" || address.ends_with('/') {
        return Err(ValidationError::NonEmptyPath);
    }

    if url.query().is_some_and(|q| !q.is_empty()) {
        return Err(ValidationError::HasQuery);
    }

    if url.fragment().is_some_and(|f| !f.is_empty()) {
        return Err(ValidationError::HasFragment);
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(ValidationError::HasUserInfo);
    }

    Ok(url)
}

/// Base address that delivery paths are appended to, without trailing slash
pub fn local_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

/// `host:port` pair used for the TCP reachability check
pub fn dial_target(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or("localhost"),
        url.port_or_known_default().unwrap_or(80)
    )
}
