//! Credential resolution
//!
//! A project ID and CLI secret can come from command-line flags, environment
//! variables or the credential file written by `login`. Sources are tried in
//! that order and the first complete pair wins.

use hookrelay_common::{
    RelayError, Result,
    constants::{CLI_SECRET_ENV, CREDENTIAL_FILE_NAME, PROJECT_ID_ENV},
};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Resolved credential pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub project_id: String,
    pub cli_secret: String,
}

impl Credentials {
    pub fn new(project_id: impl Into<String>, cli_secret: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            cli_secret: cli_secret.into(),
        }
    }
}

/// A place credentials can be read from
pub trait CredentialSource {
    fn name(&self) -> &'static str;

    fn get(&self) -> Result<Credentials>;
}

/// Try each source in order; the last error is returned when all fail
pub fn resolve_credentials(sources: &[&dyn CredentialSource]) -> Result<Credentials> {
    let mut last_error = RelayError::MissingProjectId;

    for source in sources {
        match source.get() {
            Ok(credentials) => {
                debug!("Using credentials from {}", source.name());
                return Ok(credentials);
            }
            Err(e) => {
                debug!("No credentials from {}: {}", source.name(), e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

fn require(project_id: Option<&str>, cli_secret: Option<&str>) -> Result<Credentials> {
    let project_id = project_id
        .filter(|id| !id.is_empty())
        .ok_or(RelayError::MissingProjectId)?;
    let cli_secret = cli_secret
        .filter(|secret| !secret.is_empty())
        .ok_or(RelayError::MissingCliSecret)?;

    Ok(Credentials::new(project_id, cli_secret))
}

/// Credentials given as command-line flags
#[derive(Debug, Clone, Default)]
pub struct FlagCredentials {
    project_id: Option<String>,
    cli_secret: Option<String>,
}

impl FlagCredentials {
    pub fn new(project_id: Option<String>, cli_secret: Option<String>) -> Self {
        Self {
            project_id,
            cli_secret,
        }
    }
}

impl CredentialSource for FlagCredentials {
    fn name(&self) -> &'static str {
        "flags"
    }

    fn get(&self) -> Result<Credentials> {
        require(self.project_id.as_deref(), self.cli_secret.as_deref())
    }
}

/// Credentials from environment variables
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    project_id_var: String,
    cli_secret_var: String,
}

impl EnvCredentials {
    pub fn new(project_id_var: impl Into<String>, cli_secret_var: impl Into<String>) -> Self {
        Self {
            project_id_var: project_id_var.into(),
            cli_secret_var: cli_secret_var.into(),
        }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(PROJECT_ID_ENV, CLI_SECRET_ENV)
    }
}

impl CredentialSource for EnvCredentials {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn get(&self) -> Result<Credentials> {
        let project_id = std::env::var(&self.project_id_var).ok();
        let cli_secret = std::env::var(&self.cli_secret_var).ok();
        require(project_id.as_deref(), cli_secret.as_deref())
    }
}

/// Credentials from the file written by `login`
///
/// The first line holds the project ID, the second the CLI secret.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileCredentials {
    fn name(&self) -> &'static str {
        "credential file"
    }

    fn get(&self) -> Result<Credentials> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RelayError::MissingProjectId);
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = content.lines().map(str::trim_end);
        require(lines.next(), lines.next())
    }
}

/// `$HOME/.hookrelay`, or the explicit override
pub fn credential_file_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    dirs::home_dir()
        .map(|home| home.join(CREDENTIAL_FILE_NAME))
        .ok_or_else(|| {
            RelayError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "cannot determine home directory",
            ))
        })
}

/// Store credentials, readable by the current user only
pub fn write_credential_file(path: &Path, credentials: &Credentials) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    writeln!(file, "{}", credentials.project_id)?;
    writeln!(file, "{}", credentials.cli_secret)?;
    Ok(())
}

/// Remove the credential file; returns false if there was none
pub fn remove_credential_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
