//! Configuration module for the synchronizer.
//!
//! This module handles all input-related functionality:
//! - Parsing the reflection document and the glue file
//! - Validation of declared functions and service settings
//! - Local credential resolution
//! - Packaged artifacts and content hashing

mod artifact;
mod credentials;
mod hash;
mod parser;
mod spec;
mod validator;

pub use artifact::{DirectoryPackager, PackagedArtifact, Packager, WARNINGS_FILE};
#[cfg(test)]
pub use artifact::MockPackager;
pub use credentials::{CredentialCache, Credentials};
pub use hash::ContentHasher;
pub use parser::{ConfigParser, DEFAULT_GLUE_FILES, REFLECTION_FILE, expand_env};
pub use spec::{
    Architecture, AwsSettings, DEFAULT_MEMORY_MB, DEFAULT_TIMEOUT_SECS, DeclaredFunction,
    EventFunction, FunctionConfig, GlueConfig, HIGH_MEMORY_MB, HTTP_MEMORY_MB, HttpFunction,
    HttpMethod, PolicyStatement, Reflection, Runtime, Scope, TimerFunction, Trigger,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult, is_valid_schedule};
