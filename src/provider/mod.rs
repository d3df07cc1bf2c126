//! Resource provider integration module.
//!
//! This module provides the capability interface the reconcilers consume,
//! its production implementation over the provider's HTTP APIs, and the
//! reader that assembles a live snapshot of one scope.

mod aws;
mod client;
mod logs;
#[cfg(test)]
mod memory;
mod observer;
mod signer;
mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use aws::AwsProvider;
pub use client::{ApiRequest, ProviderClient, RawResponse, RetryPolicy, retry_conflict};
pub use logs::{log_query_link, public_host};
#[cfg(test)]
pub use memory::{ACCOUNT, Call, MemoryProvider, REGION, function_arn};
pub use observer::{CurrentState, GatewayState, RemoteFunction, RemoteIntegration, StateReader};
pub use signer::{RequestSigner, SignableRequest};
pub use types::{
    AddPermissionRequest, ApiSpec, CorsConfiguration, CreateFunctionRequest, EnvironmentVariables,
    FunctionCode, FunctionConfiguration, FunctionInfo, GatewayApi, Grant, GrantCondition, GrantSpec,
    Integration, IntegrationSpec, OneOrMany, PolicyDocument, PolicyDocumentStatement, Principal,
    PutRuleRequest, PutTargetsRequest, Role, Route, RouteSpec, RuleTarget, SourceArn, Stage, Tag,
    Tags, TracingConfig, UpdateCodeRequest, tag_list,
};

/// Name of the gateway stage every deployment uses.
pub const DEFAULT_STAGE: &str = "$default";

/// Capabilities of the resource provider.
///
/// Every method takes full (prefixed) resource names. Implementations
/// classify failures as in [`crate::error::ProviderError`], retry throttling
/// internally, and retry conflicts on the mutating gateway and configuration
/// calls until their deadline.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Region every regional resource lives in.
    fn region(&self) -> &str;

    /// Fetches the execution role, `None` if it does not exist.
    async fn get_role(&self, role_name: &str) -> Result<Option<Role>>;

    /// Creates the execution role with the compute trust policy.
    async fn create_role(&self, role_name: &str, tags: &Tags) -> Result<Role>;

    /// Overwrites the inline policy of the execution role.
    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &PolicyDocument,
    ) -> Result<()>;

    /// Lists every function whose name starts with `prefix` (case-insensitive).
    async fn list_functions(&self, prefix: &str) -> Result<Vec<FunctionInfo>>;

    /// Creates a function and returns its identifier.
    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<String>;

    /// Replaces the code of a function.
    async fn update_function_code(&self, function_name: &str, request: &UpdateCodeRequest)
    -> Result<()>;

    /// Replaces the configuration of a function.
    async fn update_function_configuration(
        &self,
        function_name: &str,
        configuration: &FunctionConfiguration,
    ) -> Result<()>;

    /// Deletes a function together with its permission grants.
    async fn delete_function(&self, function_name: &str) -> Result<()>;

    /// Lists the permission grants attached to a function.
    async fn list_grants(&self, function_name: &str) -> Result<Vec<Grant>>;

    /// Attaches a permission grant to a function.
    async fn add_grant(&self, function_name: &str, request: &AddPermissionRequest) -> Result<()>;

    /// Removes a permission grant from a function.
    async fn remove_grant(&self, function_name: &str, sid: &str) -> Result<()>;

    /// Lists all gateways of the account.
    async fn list_apis(&self) -> Result<Vec<GatewayApi>>;

    /// Creates a gateway.
    async fn create_api(&self, spec: &ApiSpec) -> Result<GatewayApi>;

    /// Replaces the settings of a gateway.
    async fn update_api(&self, api_id: &str, spec: &ApiSpec) -> Result<()>;

    /// Fetches a gateway stage, `None` if it does not exist.
    async fn get_stage(&self, api_id: &str, stage_name: &str) -> Result<Option<Stage>>;

    /// Creates a gateway stage.
    async fn create_stage(&self, api_id: &str, stage: &Stage) -> Result<()>;

    /// Lists the integrations of a gateway.
    async fn list_integrations(&self, api_id: &str) -> Result<Vec<Integration>>;

    /// Creates an integration and returns its ID.
    async fn create_integration(&self, api_id: &str, spec: &IntegrationSpec) -> Result<String>;

    /// Replaces an integration definition.
    async fn update_integration(
        &self,
        api_id: &str,
        integration_id: &str,
        spec: &IntegrationSpec,
    ) -> Result<()>;

    /// Deletes an integration.
    async fn delete_integration(&self, api_id: &str, integration_id: &str) -> Result<()>;

    /// Lists the routes of a gateway.
    async fn list_routes(&self, api_id: &str) -> Result<Vec<Route>>;

    /// Creates a route and returns its ID.
    async fn create_route(&self, api_id: &str, spec: &RouteSpec) -> Result<String>;

    /// Replaces a route definition.
    async fn update_route(&self, api_id: &str, route_id: &str, spec: &RouteSpec) -> Result<()>;

    /// Deletes a route.
    async fn delete_route(&self, api_id: &str, route_id: &str) -> Result<()>;

    /// Creates or overwrites a schedule rule and returns its ARN.
    async fn put_rule(&self, request: &PutRuleRequest) -> Result<String>;

    /// Creates or overwrites the targets of a schedule rule.
    async fn put_targets(&self, request: &PutTargetsRequest) -> Result<()>;

    /// Creates a topic; succeeds if it already exists.
    async fn create_topic(&self, topic_name: &str, tags: &Tags) -> Result<()>;

    /// Subscribes a function to a topic; succeeds if already subscribed.
    async fn subscribe(&self, topic_arn: &str, function_arn: &str, tags: &Tags) -> Result<()>;
}
