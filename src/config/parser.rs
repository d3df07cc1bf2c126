//! Loader for the reflection document and the glue file.
//!
//! The reflection document is JSON produced by the reflection step; the glue
//! file is YAML (JSON is accepted too) written by hand. Glue `env` values of
//! the form `${VAR}` are expanded from the process environment.

use crate::error::{ConfigError, Result, SyncError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{GlueConfig, Reflection};

/// Default reflection document name inside a project directory.
pub const REFLECTION_FILE: &str = "reflection.json";

/// Default glue file names, in lookup order.
pub const DEFAULT_GLUE_FILES: &[&str] = &["glue.yaml", "glue.yml", "glue.json"];

/// Parser for a project's input documents.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Project directory for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the project directory.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Resolves `name` against the project directory.
    fn resolve(&self, name: impl AsRef<Path>) -> PathBuf {
        match &self.base_path {
            Some(base) => base.join(name),
            None => name.as_ref().to_path_buf(),
        }
    }

    /// Loads the reflection document of the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not a valid document.
    pub fn load_reflection(&self) -> Result<Reflection> {
        let path = self.resolve(REFLECTION_FILE);
        let content = read_existing(&path)?;
        self.parse_reflection(&content, Some(&path))
    }

    /// Parses a reflection document from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn parse_reflection(&self, content: &str, source: Option<&Path>) -> Result<Reflection> {
        let reflection: Reflection = serde_json::from_str(content).map_err(|e| {
            ConfigError::parse(
                format!("JSON parse error: {e}"),
                source.map(|p| p.display().to_string()),
            )
        })?;
        debug!(
            "Parsed reflection for {} ({} functions)",
            reflection.name,
            reflection.len()
        );
        Ok(reflection)
    }

    /// Loads the glue file, either `override_path` or the project default.
    ///
    /// # Errors
    ///
    /// Returns an error if no glue file exists, it cannot be parsed, or an
    /// `env` value references an unset variable.
    pub fn load_glue(&self, override_path: Option<&Path>) -> Result<GlueConfig> {
        let path = match override_path {
            Some(path) => self.resolve(path),
            None => self.find_glue_file()?,
        };
        info!("Loading glue from: {}", path.display());
        let content = read_existing(&path)?;
        self.parse_glue(&content, Some(&path))
    }

    /// Parses a glue file from a YAML (or JSON) string and expands `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a referenced variable is unset.
    pub fn parse_glue(&self, content: &str, source: Option<&Path>) -> Result<GlueConfig> {
        let mut glue: GlueConfig = serde_yaml::from_str(content).map_err(|e| {
            ConfigError::parse(
                format!("YAML parse error: {e}"),
                source.map(|p| p.display().to_string()),
            )
        })?;

        for value in glue.env.values_mut() {
            *value = expand_env(value)?;
        }

        debug!("Parsed glue for service: {}", glue.service);
        Ok(glue)
    }

    /// Finds the first default glue file in the project directory.
    fn find_glue_file(&self) -> Result<PathBuf> {
        DEFAULT_GLUE_FILES
            .iter()
            .map(|name| self.resolve(name))
            .find(|path| path.exists())
            .ok_or_else(|| {
                SyncError::Config(ConfigError::FileNotFound {
                    path: self.resolve(DEFAULT_GLUE_FILES[0]),
                })
            })
    }

    /// Loads the project's `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self.resolve(".env");

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConfigError::parse(
                    format!("Failed to load .env file: {e}"),
                    Some(env_path.display().to_string()),
                )
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Reads a file, mapping absence to [`ConfigError::FileNotFound`].
fn read_existing(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    std::fs::read_to_string(path).map_err(|e| {
        ConfigError::parse(
            format!("Failed to read file: {e}"),
            Some(path.display().to_string()),
        )
        .into()
    })
}

/// Expands every `${VAR}` occurrence in `value` from the process environment.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVar`] for an unset variable.
pub fn expand_env(value: &str) -> Result<String> {
    expand_with(value, |name| std::env::var(name).ok())
}

/// Expands every `${VAR}` occurrence in `value` through `lookup`.
fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + 2 + len];
        let resolved = lookup(name).ok_or_else(|| ConfigError::MissingEnvVar {
            name: name.to_string(),
        })?;
        out.push_str(&rest[..start]);
        out.push_str(&resolved);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Ok(out)
}
