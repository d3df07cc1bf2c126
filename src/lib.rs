// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Funcsync
//!
//! A declarative, idempotent synchronizer for serverless functions.
//!
//! ## Overview
//!
//! Given the functions a service declares (HTTP endpoints, timers and topic
//! event handlers), funcsync brings one environment of a cloud account to
//! match them:
//!
//! - Compute functions with their code, runtime, memory and environment
//! - An HTTP gateway with one integration and one route per HTTP function
//! - Schedule rules for timers, topics and subscriptions for event handlers
//! - Exactly one invoke permission per function
//! - A shared execution role and its inline policy
//!
//! ## Architecture
//!
//! Every run re-reads the current state live from the provider; there is no
//! state file.
//!
//! 1. **Declared State**: the reflection document and the glue file
//! 2. **Current State**: listed from the provider for one scope
//! 3. **Reconciler**: diffs both per resource kind and applies the delta
//!
//! ## Modules
//!
//! - [`config`]: Input documents, validation, credentials, artifacts
//! - [`planner`]: Diff engine and mutation report
//! - [`provider`]: Signed provider client, capability trait, state reader
//! - [`reconciler`]: Per-kind reconcilers and the sync orchestrator
//! - [`deploy`]: Public deployment entry point
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! # glue.yaml
//! service: greeter
//! publishTopics:
//!   - status
//! corsSites:
//!   - https://example.com
//! env:
//!   API_KEY: ${GREETER_API_KEY}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod planner;
pub mod provider;
pub mod reconciler;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, GlueConfig, Reflection, Scope};
pub use deploy::{DeployOptions, deploy};
pub use error::{Result, SyncError};
pub use planner::{DiffEngine, SyncReport};
pub use provider::{AwsProvider, Provider, ProviderClient, StateReader};
pub use reconciler::{Reconciler, SyncOutcome};
