//! Input document types for the synchronizer.
//!
//! This module defines the structs that map to the reflection document
//! (the declared functions) and the glue file (service-level settings).
//! Together they fully describe the desired state of one scope.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;

/// Default function timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u32 = 15;

/// Memory for HTTP functions without an explicit memory or compute tier.
pub const HTTP_MEMORY_MB: u32 = 256;

/// Memory for the "high" memory or compute tier.
pub const HIGH_MEMORY_MB: u32 = 3008;

/// Memory for everything else.
pub const DEFAULT_MEMORY_MB: u32 = 128;

/// The reflection document: every function declared by a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reflection {
    /// Package name of the service.
    pub name: String,
    /// Deployment revision marker.
    #[serde(default)]
    pub revision: Option<String>,
    /// HTTP-triggered functions.
    #[serde(default)]
    pub http: Vec<HttpFunction>,
    /// Timer-triggered functions.
    #[serde(default)]
    pub timers: Vec<TimerFunction>,
    /// Event-triggered functions.
    #[serde(default)]
    pub events: Vec<EventFunction>,
}

/// Per-function resource requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u32>,
    /// Memory tier (`high` or unset).
    #[serde(default)]
    pub memory: Option<String>,
    /// Compute tier (`high` or unset).
    #[serde(default)]
    pub compute: Option<String>,
    /// Allowed CPU architectures (`arm64`, `arm`, `x64`, `x32`).
    #[serde(default)]
    pub cpus: Option<Vec<String>>,
    /// Engine requirement, e.g. `>=20`.
    #[serde(default)]
    pub node_version: Option<String>,
}

/// HTTP method of an HTTP-triggered function.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET.
    Get,
    /// PATCH.
    Patch,
    /// PUT.
    Put,
    /// POST.
    Post,
    /// DELETE.
    Delete,
}

/// An HTTP-triggered function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpFunction {
    /// Function name.
    pub name: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Path pattern; `*` marks a wildcard segment.
    pub path_pattern: String,
    /// Resource requirements.
    #[serde(default)]
    pub config: FunctionConfig,
}

/// A timer-triggered function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerFunction {
    /// Function name.
    pub name: String,
    /// 5-field cron expression.
    pub schedule: String,
    /// Resource requirements.
    #[serde(default)]
    pub config: FunctionConfig,
}

/// An event-triggered function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventFunction {
    /// Function name.
    pub name: String,
    /// Topic name.
    pub topic: String,
    /// Event type within the topic.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Resource requirements.
    #[serde(default)]
    pub config: FunctionConfig,
}

/// Trigger binding of a declared function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// HTTP route.
    Http {
        /// HTTP method.
        method: HttpMethod,
        /// Path pattern.
        path_pattern: String,
    },
    /// Recurring schedule.
    Timer {
        /// 5-field cron expression.
        schedule: String,
    },
    /// Topic subscription.
    Event {
        /// Topic name.
        topic: String,
        /// Event type.
        event_type: String,
    },
}

/// One unit of deployable logic with its trigger binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredFunction {
    /// Function name, unique within the scope.
    pub name: String,
    /// Trigger binding.
    pub trigger: Trigger,
    /// Resource requirements.
    pub config: FunctionConfig,
}

/// Provider runtime identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Runtime {
    /// Node.js 18.
    #[serde(rename = "nodejs18.x")]
    Node18,
    /// Node.js 20.
    #[serde(rename = "nodejs20.x")]
    Node20,
    /// Node.js 22.
    #[serde(rename = "nodejs22.x")]
    Node22,
}

/// CPU architecture of a compute unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Architecture {
    /// 64-bit ARM.
    #[serde(rename = "arm64")]
    Arm64,
    /// 64-bit x86.
    #[serde(rename = "x86_64")]
    X86_64,
}

/// Service-level settings that accompany the reflection document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlueConfig {
    /// Service name; together with the environment it forms the scope.
    pub service: String,
    /// Topics this service publishes to.
    #[serde(default)]
    pub publish_topics: Vec<String>,
    /// Allowed CORS origins for the HTTP gateway.
    #[serde(default)]
    pub cors_sites: Vec<String>,
    /// Environment variables for every function.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Provider-specific settings.
    #[serde(default)]
    pub aws: Option<AwsSettings>,
}

/// Provider-specific glue settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsSettings {
    /// Extra statements appended to the execution role's inline policy.
    #[serde(default)]
    pub policy_statements: Vec<PolicyStatement>,
}

/// A caller-supplied policy statement. `$REGION` and `$ACCOUNT` in the
/// resource are substituted at apply time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyStatement {
    /// `Allow` or `Deny`.
    #[serde(rename = "Effect")]
    pub effect: String,
    /// Resource ARN pattern.
    #[serde(rename = "Resource")]
    pub resource: String,
    /// Actions.
    #[serde(rename = "Action")]
    pub action: Vec<String>,
}

/// The (environment, service) pair that namespaces all resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    /// Environment name.
    pub environment: String,
    /// Service name.
    pub service: String,
}

impl Reflection {
    /// Returns all declared functions as tagged trigger variants.
    ///
    /// Order is HTTP, then event, then timer functions, each in document order.
    #[must_use]
    pub fn functions(&self) -> Vec<DeclaredFunction> {
        let http = self.http.iter().map(|f| DeclaredFunction {
            name: f.name.clone(),
            trigger: Trigger::Http {
                method: f.method,
                path_pattern: f.path_pattern.clone(),
            },
            config: f.config.clone(),
        });
        let events = self.events.iter().map(|f| DeclaredFunction {
            name: f.name.clone(),
            trigger: Trigger::Event {
                topic: f.topic.clone(),
                event_type: f.event_type.clone(),
            },
            config: f.config.clone(),
        });
        let timers = self.timers.iter().map(|f| DeclaredFunction {
            name: f.name.clone(),
            trigger: Trigger::Timer {
                schedule: f.schedule.clone(),
            },
            config: f.config.clone(),
        });
        http.chain(events).chain(timers).collect()
    }

    /// Returns the names of all declared functions.
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        self.http
            .iter()
            .map(|f| f.name.clone())
            .chain(self.timers.iter().map(|f| f.name.clone()))
            .chain(self.events.iter().map(|f| f.name.clone()))
            .collect()
    }

    /// Returns the total number of declared functions.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.http.len() + self.timers.len() + self.events.len()
    }

    /// Returns true if no function is declared.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeclaredFunction {
    /// Returns the HTTP method for HTTP-triggered functions.
    #[must_use]
    pub const fn method(&self) -> Option<HttpMethod> {
        match &self.trigger {
            Trigger::Http { method, .. } => Some(*method),
            _ => None,
        }
    }

    /// Returns the path pattern for HTTP-triggered functions.
    #[must_use]
    pub fn path_pattern(&self) -> Option<&str> {
        match &self.trigger {
            Trigger::Http { path_pattern, .. } => Some(path_pattern),
            _ => None,
        }
    }

    /// Returns true if the memory or compute tier is `high`.
    fn is_high_tier(&self) -> bool {
        self.config.compute.as_deref() == Some("high")
            || self.config.memory.as_deref() == Some("high")
    }

    /// Timeout in seconds.
    #[must_use]
    pub fn timeout(&self) -> u32 {
        self.config.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Memory size in MB derived from the declared tier and trigger.
    #[must_use]
    pub fn memory_size(&self) -> u32 {
        if self.config.compute.is_none() && self.config.memory.is_none() && self.method().is_some()
        {
            return HTTP_MEMORY_MB;
        }
        if self.is_high_tier() {
            return HIGH_MEMORY_MB;
        }
        DEFAULT_MEMORY_MB
    }

    /// Resolves the provider runtime from the engine requirement.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is missing or unsupported.
    pub fn runtime(&self) -> Result<Runtime, ConfigError> {
        let requested = self.config.node_version.as_deref().unwrap_or("");
        match requested.get(..4) {
            Some(">=22") => Ok(Runtime::Node22),
            Some(">=20") => Ok(Runtime::Node20),
            Some(">=18") => Ok(Runtime::Node18),
            _ => Err(ConfigError::UnsupportedRuntime {
                function: self.name.clone(),
                requested: if requested.is_empty() {
                    String::from("none")
                } else {
                    requested.to_string()
                },
            }),
        }
    }

    /// Resolves the CPU architecture from the declared allow-list and the
    /// default preference order.
    ///
    /// High-compute functions and GET handlers without a compute tier prefer
    /// x86; everything else prefers ARM.
    ///
    /// # Errors
    ///
    /// Returns an error if none of the allowed CPUs is supported.
    pub fn architecture(&self) -> Result<Architecture, ConfigError> {
        let prefers_x86 = self.config.compute.as_deref() == Some("high")
            || (self.config.compute.is_none() && self.method() == Some(HttpMethod::Get));
        let preference: [&str; 4] = if prefers_x86 {
            ["x64", "x32", "arm64", "arm"]
        } else {
            ["arm64", "arm", "x64", "x32"]
        };

        let resolved = preference.iter().find(|cpu| {
            self.config
                .cpus
                .as_ref()
                .is_none_or(|allowed| allowed.iter().any(|a| a == *cpu))
        });

        match resolved.copied() {
            Some("arm64" | "arm") => Ok(Architecture::Arm64),
            Some("x64" | "x32") => Ok(Architecture::X86_64),
            _ => Err(ConfigError::UnsupportedCpus {
                function: self.name.clone(),
                cpus: self.config.cpus.as_ref().map(|c| c.join(", ")).unwrap_or_default(),
            }),
        }
    }
}

impl Scope {
    /// Creates a new scope.
    #[must_use]
    pub fn new(environment: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            service: service.into(),
        }
    }

    /// The `<environment>-<service>` prefix shared by all scoped resources.
    #[must_use]
    pub fn prefix(&self) -> String {
        format!("{}-{}", self.environment, self.service)
    }

    /// Full provider name of a function.
    #[must_use]
    pub fn function_name(&self, name: &str) -> String {
        format!("{}-{name}", self.prefix())
    }

    /// Name of the shared execution role.
    #[must_use]
    pub fn role_name(&self) -> String {
        format!("{}-role", self.prefix())
    }

    /// Name of the execution role's inline policy.
    #[must_use]
    pub fn policy_name(&self) -> String {
        format!("{}-policy", self.prefix())
    }

    /// Name of the HTTP gateway.
    #[must_use]
    pub fn api_name(&self) -> String {
        self.prefix()
    }

    /// Name of the schedule rule for a timer function.
    #[must_use]
    pub fn rule_name(&self, name: &str) -> String {
        self.function_name(name)
    }

    /// Name of the topic for an event type. Topics are shared by every
    /// service in the environment, so only the environment prefixes them.
    #[must_use]
    pub fn topic_name(&self, topic: &str, event_type: &str) -> String {
        format!("{}-{topic}-{event_type}", self.environment)
    }

    /// Standard ownership tags applied to created resources.
    #[must_use]
    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (String::from("framework"), String::from("funcsync")),
            (String::from("environment"), self.environment.clone()),
            (String::from("service"), self.service.clone()),
        ])
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.environment, self.service)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

impl Runtime {
    /// Provider identifier of the runtime.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node18 => "nodejs18.x",
            Self::Node20 => "nodejs20.x",
            Self::Node22 => "nodejs22.x",
        }
    }
}

impl Architecture {
    /// Provider identifier of the architecture.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }
}
