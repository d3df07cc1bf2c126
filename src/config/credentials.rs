//! Local credential resolution.
//!
//! Credentials come from the process environment when complete, otherwise
//! from the shared credentials file. The parsed file is cached inside the
//! [`CredentialCache`] for as long as the cache lives.

use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Resolved provider credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Region for regional services.
    pub region: String,
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Optional session token.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Lazily populated, read-through cache of the shared credentials file.
#[derive(Debug, Default)]
pub struct CredentialCache {
    /// Explicit credentials file path (overrides environment and home).
    path: Option<PathBuf>,
    /// Cleaned lines of the credentials file.
    lines: OnceLock<Vec<String>>,
}

impl CredentialCache {
    /// Creates a cache reading the default credentials file location.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            path: None,
            lines: OnceLock::new(),
        }
    }

    /// Creates a cache reading a specific credentials file.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            lines: OnceLock::new(),
        }
    }

    /// Resolves credentials for `profile`, preferring the process environment.
    ///
    /// `region` overrides any region found in the environment or file.
    ///
    /// # Errors
    ///
    /// Returns an error if no complete set of credentials can be found.
    pub fn resolve(&self, region: Option<&str>, profile: &str) -> Result<Credentials> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let region = region
            .map(String::from)
            .or_else(|| env("AWS_REGION"))
            .or_else(|| env("AWS_DEFAULT_REGION"));

        if let (Some(region), Some(access_key_id), Some(secret_access_key)) = (
            region.clone(),
            env("AWS_ACCESS_KEY_ID"),
            env("AWS_SECRET_ACCESS_KEY"),
        ) {
            debug!("Using credentials from environment");
            return Ok(Credentials {
                region,
                access_key_id,
                secret_access_key,
                session_token: env("AWS_SESSION_TOKEN"),
            });
        }

        self.resolve_from_file(region, profile)
    }

    /// Resolves credentials for `profile` from the credentials file only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the section is incomplete.
    pub fn resolve_from_file(&self, region: Option<String>, profile: &str) -> Result<Credentials> {
        let lines = self.lines()?;

        let section = format!("[{profile}]");
        let begin = lines
            .iter()
            .position(|l| *l == section)
            .or_else(|| lines.iter().position(|l| l == "[default]"))
            .ok_or_else(|| ConfigError::MissingCredentials {
                message: format!("Section {section} not found"),
            })?;
        debug!("Using credentials file section {}", lines[begin]);

        let entries: Vec<(&str, &str)> = lines[begin + 1..]
            .iter()
            .take_while(|l| !l.starts_with('['))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();
        let get = |key: &str| {
            entries
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        };

        let incomplete = || ConfigError::MissingCredentials {
            message: String::from("Incomplete credentials file"),
        };
        Ok(Credentials {
            region: region.or_else(|| get("region")).ok_or_else(incomplete)?,
            access_key_id: get("aws_access_key_id").ok_or_else(incomplete)?,
            secret_access_key: get("aws_secret_access_key").ok_or_else(incomplete)?,
            session_token: get("aws_session_token"),
        })
    }

    /// Returns the cleaned credentials file lines, reading them once.
    fn lines(&self) -> Result<&[String]> {
        if let Some(lines) = self.lines.get() {
            return Ok(lines);
        }
        let path = self.file_path()?;
        debug!("Reading credentials from: {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::MissingCredentials {
            message: format!("Cannot read {}: {e}", path.display()),
        })?;
        let lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect();
        Ok(self.lines.get_or_init(|| lines))
    }

    /// Location of the shared credentials file.
    fn file_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(".aws").join("credentials"))
            .ok_or_else(|| {
                ConfigError::MissingCredentials {
                    message: String::from("Cannot locate home directory"),
                }
                .into()
            })
    }
}
