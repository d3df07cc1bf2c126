//! Validation of the declared input documents.
//!
//! Every check here runs before any provider call, so that a bad declaration
//! aborts the sync without touching remote state.

use crate::error::{ConfigError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{DeclaredFunction, GlueConfig, Reflection, Trigger};

/// Maximum provider function name length.
const MAX_FUNCTION_NAME_LEN: usize = 64;

/// Validator for a reflection document and its glue file.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The typed error.
    pub error: ConfigError,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates the declared functions for `environment`.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(
        &self,
        environment: &str,
        reflection: &Reflection,
        glue: &GlueConfig,
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_glue(environment, glue, &mut result);
        Self::validate_functions(environment, glue, &reflection.functions(), &mut result);

        if reflection.is_empty() {
            result
                .warnings
                .push(String::from("No functions declared in reflection document"));
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first = result.errors.swap_remove(0);
            Err(first.error.into())
        }
    }

    /// Validates service-level settings.
    fn validate_glue(environment: &str, glue: &GlueConfig, result: &mut ValidationResult) {
        if environment.is_empty() || !is_valid_name(environment) {
            result.push(
                "environment",
                ConfigError::validation(
                    format!("Environment name '{environment}' is invalid"),
                    "environment",
                ),
            );
        }
        if glue.service.is_empty() || !is_valid_name(&glue.service) {
            result.push(
                "service",
                ConfigError::validation(
                    format!("Service name '{}' is invalid", glue.service),
                    "service",
                ),
            );
        }

        let mut seen = HashSet::new();
        for (i, topic) in glue.publish_topics.iter().enumerate() {
            if !seen.insert(topic) {
                result.push(
                    format!("publishTopics[{i}]"),
                    ConfigError::DuplicateName {
                        resource_type: String::from("topic"),
                        name: topic.clone(),
                    },
                );
            }
        }

        if let Some(aws) = &glue.aws {
            for (i, statement) in aws.policy_statements.iter().enumerate() {
                if statement.effect != "Allow" && statement.effect != "Deny" {
                    let field = format!("aws.policyStatements[{i}].Effect");
                    result.push(
                        field.clone(),
                        ConfigError::validation(
                            format!("Effect must be Allow or Deny, got '{}'", statement.effect),
                            field,
                        ),
                    );
                }
                if statement.action.is_empty() {
                    let field = format!("aws.policyStatements[{i}].Action");
                    result.push(
                        field.clone(),
                        ConfigError::validation("Statement has no actions", field),
                    );
                }
            }
        }

        if glue.cors_sites.iter().any(|s| s == "*") && glue.cors_sites.len() > 1 {
            result
                .warnings
                .push(String::from("corsSites: '*' makes other origins redundant"));
        }
    }

    /// Validates every declared function.
    fn validate_functions(
        environment: &str,
        glue: &GlueConfig,
        functions: &[DeclaredFunction],
        result: &mut ValidationResult,
    ) {
        let mut seen_names = HashSet::new();
        let prefix_len = environment.len() + glue.service.len() + 2;

        for function in functions {
            let field = format!("functions.{}", function.name);

            if !seen_names.insert(function.name.as_str()) {
                result.push(
                    field.clone(),
                    ConfigError::DuplicateName {
                        resource_type: String::from("function"),
                        name: function.name.clone(),
                    },
                );
            }

            if !is_valid_function_name(&function.name) {
                result.push(
                    field.clone(),
                    ConfigError::validation(
                        format!("Function name '{}' is invalid", function.name),
                        field.clone(),
                    ),
                );
            } else if prefix_len + function.name.len() > MAX_FUNCTION_NAME_LEN {
                result.push(
                    field.clone(),
                    ConfigError::validation(
                        format!(
                            "Function name '{}' exceeds {MAX_FUNCTION_NAME_LEN} characters with its prefix",
                            function.name
                        ),
                        field.clone(),
                    ),
                );
            }

            if let Trigger::Timer { schedule } = &function.trigger
                && !is_valid_schedule(schedule)
            {
                result.push(
                    field.clone(),
                    ConfigError::InvalidSchedule {
                        function: function.name.clone(),
                        schedule: schedule.clone(),
                    },
                );
            }

            if let Trigger::Event { topic, event_type } = &function.trigger
                && (topic.is_empty() || event_type.is_empty())
            {
                result.push(
                    field.clone(),
                    ConfigError::validation("Event topic and type must be set", field.clone()),
                );
            }

            if let Err(e) = function.runtime() {
                result.push(field.clone(), e);
            }
            if let Err(e) = function.architecture() {
                result.push(field.clone(), e);
            }
            if function.config.timeout == Some(0) {
                result.push(
                    field.clone(),
                    ConfigError::validation("Timeout must be at least 1 second", field.clone()),
                );
            }
        }
    }
}

/// Environment and service names: lowercase alphanumeric, starting with a
/// letter. Hyphens separate the scope prefix, so two scopes never share one.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Function names as accepted by the provider.
fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A schedule must have exactly five whitespace-separated fields.
#[must_use]
pub fn is_valid_schedule(schedule: &str) -> bool {
    schedule.split_whitespace().count() == 5
}

impl ValidationResult {
    /// Records an error.
    fn push(&mut self, field: impl Into<String>, error: ConfigError) {
        self.errors.push(ValidationError {
            field: field.into(),
            error,
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}
