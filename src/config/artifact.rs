//! Packaged function artifacts.
//!
//! Bundling itself happens elsewhere; the synchronizer only needs, per
//! function, the archive bytes, their digest and a printable size.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};

use super::hash::ContentHasher;
use super::spec::DeclaredFunction;

/// Name of the optional build warnings file inside the stage directory.
pub const WARNINGS_FILE: &str = "warnings.txt";

/// One packaged function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    /// Zip archive bytes.
    pub bytes: Vec<u8>,
    /// Base64 SHA-256 of `bytes`.
    pub sha256: String,
    /// Human-readable size.
    pub size: String,
}

impl PackagedArtifact {
    /// Wraps archive bytes, computing digest and size.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let hasher = ContentHasher::new();
        let sha256 = hasher.sha256_base64(&bytes);
        let size = ContentHasher::size_description(bytes.len() as u64);
        Self { bytes, sha256, size }
    }
}

/// Build collaborator: turns declared functions into deployable artifacts.
#[cfg_attr(test, mockall::automock)]
pub trait Packager: Send + Sync {
    /// Packages every declared function, keyed by function name.
    ///
    /// # Errors
    ///
    /// Returns an error if an artifact is missing or the build is suspect.
    fn package(&self, functions: &[DeclaredFunction]) -> Result<HashMap<String, PackagedArtifact>>;
}

/// Packager reading pre-built `<name>.zip` archives from a stage directory.
#[derive(Debug, Clone)]
pub struct DirectoryPackager {
    /// Stage directory.
    stage_dir: PathBuf,
}

impl DirectoryPackager {
    /// Creates a packager over `stage_dir`.
    #[must_use]
    pub fn new(stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            stage_dir: stage_dir.into(),
        }
    }

    /// Returns the stage directory.
    #[must_use]
    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    /// Reads build warnings, if the build left any.
    fn build_warnings(&self) -> Result<Vec<String>> {
        let path = self.stage_dir.join(WARNINGS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

impl Packager for DirectoryPackager {
    fn package(&self, functions: &[DeclaredFunction]) -> Result<HashMap<String, PackagedArtifact>> {
        let warnings = self.build_warnings()?;
        if !warnings.is_empty() {
            for w in &warnings {
                warn!("{w}");
            }
            return Err(ConfigError::SuspiciousBuild { warnings }.into());
        }

        let mut artifacts = HashMap::with_capacity(functions.len());
        for function in functions {
            let path = self.stage_dir.join(format!("{}.zip", function.name));
            if !path.exists() {
                return Err(ConfigError::MissingArtifact {
                    function: function.name.clone(),
                }
                .into());
            }
            let artifact = PackagedArtifact::from_bytes(std::fs::read(&path)?);
            debug!("Packaged {} ({})", function.name, artifact.size);
            artifacts.insert(function.name.clone(), artifact);
        }
        Ok(artifacts)
    }
}
