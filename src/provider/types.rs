//! Provider resource types.
//!
//! These map to the JSON shapes of the compute, gateway, schedule and
//! identity APIs. Field names follow the wire format via serde renames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ownership tags as a plain map.
pub type Tags = BTreeMap<String, String>;

/// Execution role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    /// Role ARN.
    pub arn: String,
    /// Role name.
    #[serde(default)]
    pub role_name: String,
}

/// Inline policy document of the execution role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version.
    pub version: String,
    /// Statements.
    pub statement: Vec<PolicyDocumentStatement>,
}

/// One statement of the role policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocumentStatement {
    /// `Allow` or `Deny`.
    pub effect: String,
    /// Resource ARN pattern.
    pub resource: String,
    /// One action or a list of actions.
    pub action: OneOrMany,
}

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// A single value.
    One(String),
    /// Several values.
    Many(Vec<String>),
}

/// A compute unit as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionInfo {
    /// Function ARN.
    pub function_arn: String,
    /// Full function name.
    pub function_name: String,
    /// Runtime identifier.
    #[serde(default)]
    pub runtime: String,
    /// Memory in MB.
    pub memory_size: u32,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Base64 SHA-256 of the deployed package.
    pub code_sha256: String,
    /// Package size in bytes.
    pub code_size: u64,
    /// Environment, absent when empty.
    #[serde(default)]
    pub environment: Option<EnvironmentVariables>,
    /// CPU architectures.
    #[serde(default)]
    pub architectures: Vec<String>,
}

/// One page of the function listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionPage {
    /// Functions on this page.
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    /// Continuation marker, `null` on the last page.
    #[serde(default)]
    pub next_marker: Option<String>,
}

/// Function environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentVariables {
    /// Variables.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Tracing mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TracingConfig {
    /// `PassThrough` or `Active`.
    pub mode: String,
}

/// Mutable configuration of a compute unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionConfiguration {
    /// Execution role ARN.
    pub role: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Entry point.
    pub handler: String,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Memory in MB.
    pub memory_size: u32,
    /// Tracing mode.
    pub tracing_config: TracingConfig,
    /// Environment.
    pub environment: EnvironmentVariables,
}

/// Zip package reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionCode {
    /// Base64 zip archive.
    pub zip_file: String,
}

/// Body of a create-function call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFunctionRequest {
    /// Full function name.
    pub function_name: String,
    /// Package.
    pub code: FunctionCode,
    /// Always `Zip`.
    pub package_type: String,
    /// CPU architecture, a single entry.
    pub architectures: Vec<String>,
    /// Configuration.
    #[serde(flatten)]
    pub configuration: FunctionConfiguration,
    /// Ownership tags.
    pub tags: Tags,
}

/// Body of an update-code call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateCodeRequest {
    /// Base64 zip archive.
    pub zip_file: String,
    /// CPU architecture, a single entry.
    pub architectures: Vec<String>,
}

/// Response of a create-function call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFunctionResponse {
    /// New function ARN.
    pub function_arn: String,
}

/// Response of a get-policy call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionPolicy {
    /// JSON-encoded policy document.
    pub policy: String,
}

/// Attached policy statements, as decoded from [`FunctionPolicy`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourcePolicy {
    /// Raw statements.
    #[serde(default)]
    pub statement: Vec<serde_json::Value>,
}

/// An invoke permission attached to a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Statement ID.
    pub sid: String,
    /// Statement body without its ID.
    pub body: serde_json::Value,
}

/// Expected invoke permission, in the shape the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GrantSpec {
    /// Always `lambda:InvokeFunction`.
    pub action: String,
    /// Always `Allow`.
    pub effect: String,
    /// Invoking service.
    pub principal: Principal,
    /// Function ARN.
    pub resource: String,
    /// Source restriction.
    pub condition: GrantCondition,
}

/// Service principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    /// Service domain.
    pub service: String,
}

/// `ArnLike` condition on the source ARN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantCondition {
    /// Source ARN match.
    #[serde(rename = "ArnLike")]
    pub arn_like: SourceArn,
}

/// Source ARN holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArn {
    /// Source ARN pattern.
    #[serde(rename = "AWS:SourceArn")]
    pub source_arn: String,
}

/// Body of an add-permission call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddPermissionRequest {
    /// New statement ID.
    pub statement_id: String,
    /// Action.
    pub action: String,
    /// Principal service.
    pub principal: String,
    /// Source ARN.
    pub source_arn: String,
}

/// Gateway CORS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfiguration {
    /// Allowed origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    /// Whether credentials are allowed.
    #[serde(default)]
    pub allow_credentials: bool,
    /// Preflight cache duration in seconds.
    #[serde(default)]
    pub max_age: u32,
    /// Allowed methods.
    #[serde(default)]
    pub allow_methods: Vec<String>,
    /// Allowed headers.
    #[serde(default)]
    pub allow_headers: Vec<String>,
    /// Exposed headers.
    #[serde(default)]
    pub expose_headers: Vec<String>,
}

/// HTTP gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayApi {
    /// Gateway ID.
    pub api_id: String,
    /// Gateway name.
    pub name: String,
    /// Protocol (`HTTP`).
    #[serde(default)]
    pub protocol_type: String,
    /// CORS settings, absent when none are configured.
    #[serde(default)]
    pub cors_configuration: Option<CorsConfiguration>,
}

/// Body of a create- or update-gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    /// Gateway name.
    pub name: String,
    /// Always `HTTP`.
    pub protocol_type: String,
    /// CORS settings.
    pub cors_configuration: CorsConfiguration,
    /// Ownership tags.
    pub tags: Tags,
}

/// Gateway deployment stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Stage name.
    pub stage_name: String,
    /// Whether changes deploy automatically.
    #[serde(default)]
    pub auto_deploy: bool,
    /// Ownership tags.
    #[serde(default)]
    pub tags: Tags,
}

/// Gateway integration definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    /// Always `2.0`.
    pub payload_format_version: String,
    /// Always `AWS_PROXY`.
    pub integration_type: String,
    /// HTTP method.
    #[serde(default)]
    pub integration_method: Option<String>,
    /// Target function ARN.
    pub integration_uri: String,
    /// Always `INTERNET`.
    #[serde(default)]
    pub connection_type: Option<String>,
    /// Integration timeout.
    #[serde(default)]
    pub timeout_in_millis: Option<u32>,
}

/// Gateway integration as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    /// Integration ID.
    pub integration_id: String,
    /// Definition.
    #[serde(flatten)]
    pub spec: IntegrationSpec,
}

/// Response of a create-integration call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIntegration {
    /// New integration ID.
    pub integration_id: String,
}

/// Gateway route definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// `METHOD /path`.
    pub route_key: String,
    /// Always `NONE`.
    pub authorization_type: String,
    /// Always false.
    #[serde(default)]
    pub api_key_required: bool,
    /// `integrations/<id>`.
    #[serde(default)]
    pub target: Option<String>,
}

/// Gateway route as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Route ID.
    pub route_id: String,
    /// Definition.
    #[serde(flatten)]
    pub spec: RouteSpec,
}

/// Response of a create-route call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRoute {
    /// New route ID.
    pub route_id: String,
}

/// One page of a gateway listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Continuation token.
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Key/value tag in list form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Body of a put-rule call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRuleRequest {
    /// Rule name.
    pub name: String,
    /// `cron(...)` expression.
    pub schedule_expression: String,
    /// Ownership tags.
    pub tags: Vec<Tag>,
}

/// Response of a put-rule call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRuleResponse {
    /// Rule ARN.
    #[serde(default)]
    pub rule_arn: Option<String>,
}

/// Schedule target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleTarget {
    /// Target ID.
    pub id: String,
    /// Function ARN.
    pub arn: String,
}

/// Body of a put-targets call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutTargetsRequest {
    /// Rule name.
    pub rule: String,
    /// Targets.
    pub targets: Vec<RuleTarget>,
}

/// Response of a put-targets call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutTargetsResponse {
    /// Number of rejected targets.
    #[serde(default)]
    pub failed_entry_count: u32,
}

/// Converts a tag map to list form.
#[must_use]
pub fn tag_list(tags: &Tags) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

impl Grant {
    /// Splits a raw policy statement into its ID and body.
    #[must_use]
    pub fn from_statement(mut statement: serde_json::Value) -> Self {
        let sid = statement
            .as_object_mut()
            .and_then(|o| o.remove("Sid"))
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        Self {
            sid,
            body: statement,
        }
    }

    /// Returns true if this grant is exactly `spec`.
    #[must_use]
    pub fn matches(&self, spec: &GrantSpec) -> bool {
        serde_json::to_value(spec).is_ok_and(|expected| expected == self.body)
    }
}

impl GrantSpec {
    /// Source ARN of the grant.
    #[must_use]
    pub fn source_arn(&self) -> &str {
        &self.condition.arn_like.source_arn
    }

    /// The statement as the provider reports it once attached.
    #[must_use]
    pub fn to_statement(&self, sid: &str) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert(String::from("Sid"), serde_json::Value::from(sid));
        }
        value
    }
}
