//! In-memory provider for driving reconcilers in tests.
//!
//! Behaves like the real provider where reconcilers depend on it: generated
//! identifiers and ARNs, 404 for missing parents, 409 when an integration
//! still has routes, and function deletion dropping the function's grants.
//! Every mutating call is recorded.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::ContentHasher;
use crate::error::{ProviderError, Result};

use super::Provider;
use super::types::{
    AddPermissionRequest, ApiSpec, CreateFunctionRequest, EnvironmentVariables,
    FunctionConfiguration, FunctionInfo, GatewayApi, Grant, GrantCondition, GrantSpec,
    Integration, IntegrationSpec, PolicyDocument, Principal, PutRuleRequest, PutTargetsRequest,
    Role, Route, RouteSpec, RuleTarget, SourceArn, Stage, Tags, UpdateCodeRequest,
};

/// Account of every generated ARN.
pub const ACCOUNT: &str = "123456789012";

/// Region of every generated ARN.
pub const REGION: &str = "eu-west-1";

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Role created.
    CreateRole(String),
    /// Role policy written.
    PutRolePolicy(String),
    /// Function created.
    CreateFunction(String),
    /// Function code replaced.
    UpdateFunctionCode(String),
    /// Function configuration replaced.
    UpdateFunctionConfiguration(String),
    /// Function deleted.
    DeleteFunction(String),
    /// Grant added: function, source ARN.
    AddGrant(String, String),
    /// Grant removed: function, statement ID.
    RemoveGrant(String, String),
    /// Gateway created.
    CreateApi(String),
    /// Gateway updated.
    UpdateApi(String),
    /// Stage created.
    CreateStage(String),
    /// Integration created for a target URI.
    CreateIntegration(String),
    /// Integration updated.
    UpdateIntegration(String),
    /// Integration deleted.
    DeleteIntegration(String),
    /// Route created with a route key.
    CreateRoute(String),
    /// Route updated.
    UpdateRoute(String),
    /// Route deleted.
    DeleteRoute(String),
    /// Schedule rule written.
    PutRule(String),
    /// Schedule targets written.
    PutTargets(String),
    /// Topic created.
    CreateTopic(String),
    /// Subscription created: topic ARN, function ARN.
    Subscribe(String, String),
}

impl Call {
    /// Returns false for unconditional idempotent puts.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::PutRolePolicy(_)
                | Self::PutRule(_)
                | Self::PutTargets(_)
                | Self::CreateTopic(_)
                | Self::Subscribe(..)
        )
    }
}

#[derive(Debug, Clone)]
struct StoredFunction {
    info: FunctionInfo,
    grants: Vec<Grant>,
}

#[derive(Debug, Clone)]
struct StoredApi {
    api: GatewayApi,
    stage: Option<Stage>,
    integrations: Vec<Integration>,
    routes: Vec<Route>,
}

#[derive(Debug, Default)]
struct Inner {
    role: Option<Role>,
    policy: Option<PolicyDocument>,
    functions: Vec<StoredFunction>,
    apis: Vec<StoredApi>,
    rules: BTreeMap<String, (String, Vec<RuleTarget>)>,
    topics: BTreeSet<String>,
    subscriptions: BTreeSet<(String, String)>,
    calls: Vec<Call>,
    next_id: u32,
}

/// Provider keeping all resources in memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

impl Inner {
    fn id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}{}", self.next_id)
    }

    fn function_mut(&mut self, name: &str) -> Result<&mut StoredFunction> {
        self.functions
            .iter_mut()
            .find(|f| f.info.function_name == name)
            .ok_or_else(|| not_found(&format!("function {name}")))
    }

    fn api_mut(&mut self, api_id: &str) -> Result<&mut StoredApi> {
        self.apis
            .iter_mut()
            .find(|a| a.api.api_id == api_id)
            .ok_or_else(|| not_found(&format!("api {api_id}")))
    }
}

fn not_found(what: &str) -> crate::error::SyncError {
    ProviderError::NotFound {
        operation: format!("{what} does not exist"),
    }
    .into()
}

/// Function ARN for a full function name.
#[must_use]
pub fn function_arn(function_name: &str) -> String {
    format!("arn:aws:lambda:{REGION}:{ACCOUNT}:function:{function_name}")
}

impl MemoryProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every recorded call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Recorded calls that create, update or delete something.
    #[must_use]
    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Inserts a function as-is, duplicates included.
    pub fn insert_function(&self, info: FunctionInfo) {
        self.lock().functions.push(StoredFunction {
            info,
            grants: Vec::new(),
        });
    }

    /// Attaches a raw grant to the first function named `function_name`.
    pub fn insert_grant(&self, function_name: &str, grant: Grant) {
        let mut inner = self.lock();
        if let Ok(function) = inner.function_mut(function_name) {
            function.grants.push(grant);
        }
    }

    /// Sets the execution role.
    pub fn insert_role(&self, role: Role) {
        self.lock().role = Some(role);
    }

    /// Listed functions, in order.
    #[must_use]
    pub fn functions(&self) -> Vec<FunctionInfo> {
        self.lock().functions.iter().map(|f| f.info.clone()).collect()
    }

    /// Grants of the first function named `function_name`.
    #[must_use]
    pub fn grants(&self, function_name: &str) -> Vec<Grant> {
        self.lock()
            .functions
            .iter()
            .find(|f| f.info.function_name == function_name)
            .map(|f| f.grants.clone())
            .unwrap_or_default()
    }

    /// The last written role policy.
    #[must_use]
    pub fn policy(&self) -> Option<PolicyDocument> {
        self.lock().policy.clone()
    }

    /// Every gateway with its integrations and routes.
    #[must_use]
    pub fn gateways(&self) -> Vec<(GatewayApi, Vec<Integration>, Vec<Route>)> {
        self.lock()
            .apis
            .iter()
            .map(|a| (a.api.clone(), a.integrations.clone(), a.routes.clone()))
            .collect()
    }

    /// Schedule rules with their expression and targets.
    #[must_use]
    pub fn rules(&self) -> BTreeMap<String, (String, Vec<RuleTarget>)> {
        self.lock().rules.clone()
    }

    /// Created topics.
    #[must_use]
    pub fn topics(&self) -> BTreeSet<String> {
        self.lock().topics.clone()
    }

    /// Subscriptions as (topic ARN, function ARN).
    #[must_use]
    pub fn subscriptions(&self) -> BTreeSet<(String, String)> {
        self.lock().subscriptions.clone()
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn region(&self) -> &str {
        REGION
    }

    async fn get_role(&self, _role_name: &str) -> Result<Option<Role>> {
        Ok(self.lock().role.clone())
    }

    async fn create_role(&self, role_name: &str, _tags: &Tags) -> Result<Role> {
        let mut inner = self.lock();
        let role = Role {
            arn: format!("arn:aws:iam::{ACCOUNT}:role/{role_name}"),
            role_name: role_name.to_string(),
        };
        inner.role = Some(role.clone());
        inner.calls.push(Call::CreateRole(role_name.to_string()));
        Ok(role)
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        _policy_name: &str,
        document: &PolicyDocument,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.role.is_none() {
            return Err(not_found(&format!("role {role_name}")));
        }
        inner.policy = Some(document.clone());
        inner.calls.push(Call::PutRolePolicy(role_name.to_string()));
        Ok(())
    }

    async fn list_functions(&self, prefix: &str) -> Result<Vec<FunctionInfo>> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .lock()
            .functions
            .iter()
            .filter(|f| f.info.function_name.starts_with(&prefix))
            .map(|f| f.info.clone())
            .collect())
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<String> {
        let bytes = STANDARD
            .decode(&request.code.zip_file)
            .map_err(|e| ProviderError::api_error(400, format!("invalid zip: {e}")))?;
        let config = &request.configuration;
        let arn = function_arn(&request.function_name);
        let info = FunctionInfo {
            function_arn: arn.clone(),
            function_name: request.function_name.clone(),
            runtime: config.runtime.clone(),
            memory_size: config.memory_size,
            timeout: config.timeout,
            code_sha256: ContentHasher::new().sha256_base64(&bytes),
            code_size: bytes.len() as u64,
            environment: (!config.environment.variables.is_empty())
                .then(|| config.environment.clone()),
            architectures: request.architectures.clone(),
        };
        let mut inner = self.lock();
        inner.functions.push(StoredFunction {
            info,
            grants: Vec::new(),
        });
        inner
            .calls
            .push(Call::CreateFunction(request.function_name.clone()));
        Ok(arn)
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        request: &UpdateCodeRequest,
    ) -> Result<()> {
        let bytes = STANDARD
            .decode(&request.zip_file)
            .map_err(|e| ProviderError::api_error(400, format!("invalid zip: {e}")))?;
        let mut inner = self.lock();
        let function = inner.function_mut(function_name)?;
        function.info.code_sha256 = ContentHasher::new().sha256_base64(&bytes);
        function.info.code_size = bytes.len() as u64;
        function.info.architectures.clone_from(&request.architectures);
        inner
            .calls
            .push(Call::UpdateFunctionCode(function_name.to_string()));
        Ok(())
    }

    async fn update_function_configuration(
        &self,
        function_name: &str,
        configuration: &FunctionConfiguration,
    ) -> Result<()> {
        let mut inner = self.lock();
        let function = inner.function_mut(function_name)?;
        function.info.runtime.clone_from(&configuration.runtime);
        function.info.memory_size = configuration.memory_size;
        function.info.timeout = configuration.timeout;
        function.info.environment = (!configuration.environment.variables.is_empty())
            .then(|| EnvironmentVariables {
                variables: configuration.environment.variables.clone(),
            });
        inner
            .calls
            .push(Call::UpdateFunctionConfiguration(function_name.to_string()));
        Ok(())
    }

    async fn delete_function(&self, function_name: &str) -> Result<()> {
        let mut inner = self.lock();
        // Duplicates are peeled from the back.
        let ix = inner
            .functions
            .iter()
            .rposition(|f| f.info.function_name == function_name)
            .ok_or_else(|| not_found(&format!("function {function_name}")))?;
        inner.functions.remove(ix);
        inner
            .calls
            .push(Call::DeleteFunction(function_name.to_string()));
        Ok(())
    }

    async fn list_grants(&self, function_name: &str) -> Result<Vec<Grant>> {
        Ok(self.grants(function_name))
    }

    async fn add_grant(&self, function_name: &str, request: &AddPermissionRequest) -> Result<()> {
        let mut inner = self.lock();
        let function = inner.function_mut(function_name)?;
        let spec = GrantSpec {
            action: request.action.clone(),
            effect: String::from("Allow"),
            principal: Principal {
                service: request.principal.clone(),
            },
            resource: function.info.function_arn.clone(),
            condition: GrantCondition {
                arn_like: SourceArn {
                    source_arn: request.source_arn.clone(),
                },
            },
        };
        function
            .grants
            .push(Grant::from_statement(spec.to_statement(&request.statement_id)));
        inner.calls.push(Call::AddGrant(
            function_name.to_string(),
            request.source_arn.clone(),
        ));
        Ok(())
    }

    async fn remove_grant(&self, function_name: &str, sid: &str) -> Result<()> {
        let mut inner = self.lock();
        let function = inner.function_mut(function_name)?;
        let before = function.grants.len();
        function.grants.retain(|g| g.sid != sid);
        if function.grants.len() == before {
            return Err(not_found(&format!("statement {sid}")));
        }
        inner
            .calls
            .push(Call::RemoveGrant(function_name.to_string(), sid.to_string()));
        Ok(())
    }

    async fn list_apis(&self) -> Result<Vec<GatewayApi>> {
        Ok(self.lock().apis.iter().map(|a| a.api.clone()).collect())
    }

    async fn create_api(&self, spec: &ApiSpec) -> Result<GatewayApi> {
        let mut inner = self.lock();
        let api = GatewayApi {
            api_id: inner.id("api"),
            name: spec.name.clone(),
            protocol_type: spec.protocol_type.clone(),
            cors_configuration: Some(spec.cors_configuration.clone()),
        };
        inner.apis.push(StoredApi {
            api: api.clone(),
            stage: None,
            integrations: Vec::new(),
            routes: Vec::new(),
        });
        inner.calls.push(Call::CreateApi(spec.name.clone()));
        Ok(api)
    }

    async fn update_api(&self, api_id: &str, spec: &ApiSpec) -> Result<()> {
        let mut inner = self.lock();
        let api = inner.api_mut(api_id)?;
        api.api.cors_configuration = Some(spec.cors_configuration.clone());
        inner.calls.push(Call::UpdateApi(api_id.to_string()));
        Ok(())
    }

    async fn get_stage(&self, api_id: &str, stage_name: &str) -> Result<Option<Stage>> {
        let mut inner = self.lock();
        Ok(inner
            .api_mut(api_id)?
            .stage
            .clone()
            .filter(|s| s.stage_name == stage_name))
    }

    async fn create_stage(&self, api_id: &str, stage: &Stage) -> Result<()> {
        let mut inner = self.lock();
        inner.api_mut(api_id)?.stage = Some(stage.clone());
        inner.calls.push(Call::CreateStage(api_id.to_string()));
        Ok(())
    }

    async fn list_integrations(&self, api_id: &str) -> Result<Vec<Integration>> {
        Ok(self.lock().api_mut(api_id)?.integrations.clone())
    }

    async fn create_integration(&self, api_id: &str, spec: &IntegrationSpec) -> Result<String> {
        let mut inner = self.lock();
        let integration_id = inner.id("int");
        inner.api_mut(api_id)?.integrations.push(Integration {
            integration_id: integration_id.clone(),
            spec: spec.clone(),
        });
        inner
            .calls
            .push(Call::CreateIntegration(spec.integration_uri.clone()));
        Ok(integration_id)
    }

    async fn update_integration(
        &self,
        api_id: &str,
        integration_id: &str,
        spec: &IntegrationSpec,
    ) -> Result<()> {
        let mut inner = self.lock();
        let integration = inner
            .api_mut(api_id)?
            .integrations
            .iter_mut()
            .find(|i| i.integration_id == integration_id)
            .ok_or_else(|| not_found(&format!("integration {integration_id}")))?;
        integration.spec = spec.clone();
        inner
            .calls
            .push(Call::UpdateIntegration(integration_id.to_string()));
        Ok(())
    }

    async fn delete_integration(&self, api_id: &str, integration_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let api = inner.api_mut(api_id)?;
        let target = format!("integrations/{integration_id}");
        if api
            .routes
            .iter()
            .any(|r| r.spec.target.as_deref() == Some(target.as_str()))
        {
            return Err(ProviderError::Conflict {
                operation: format!("integration {integration_id} is still routed"),
            }
            .into());
        }
        let before = api.integrations.len();
        api.integrations.retain(|i| i.integration_id != integration_id);
        if api.integrations.len() == before {
            return Err(not_found(&format!("integration {integration_id}")));
        }
        inner
            .calls
            .push(Call::DeleteIntegration(integration_id.to_string()));
        Ok(())
    }

    async fn list_routes(&self, api_id: &str) -> Result<Vec<Route>> {
        Ok(self.lock().api_mut(api_id)?.routes.clone())
    }

    async fn create_route(&self, api_id: &str, spec: &RouteSpec) -> Result<String> {
        let mut inner = self.lock();
        let route_id = inner.id("route");
        let api = inner.api_mut(api_id)?;
        let targets_known = spec.target.as_deref().is_none_or(|t| {
            api.integrations
                .iter()
                .any(|i| t == format!("integrations/{}", i.integration_id))
        });
        if !targets_known {
            return Err(ProviderError::api_error(400, "unknown route target").into());
        }
        api.routes.push(Route {
            route_id: route_id.clone(),
            spec: spec.clone(),
        });
        inner.calls.push(Call::CreateRoute(spec.route_key.clone()));
        Ok(route_id)
    }

    async fn update_route(&self, api_id: &str, route_id: &str, spec: &RouteSpec) -> Result<()> {
        let mut inner = self.lock();
        let route = inner
            .api_mut(api_id)?
            .routes
            .iter_mut()
            .find(|r| r.route_id == route_id)
            .ok_or_else(|| not_found(&format!("route {route_id}")))?;
        route.spec = spec.clone();
        inner.calls.push(Call::UpdateRoute(route_id.to_string()));
        Ok(())
    }

    async fn delete_route(&self, api_id: &str, route_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let api = inner.api_mut(api_id)?;
        let before = api.routes.len();
        api.routes.retain(|r| r.route_id != route_id);
        if api.routes.len() == before {
            return Err(not_found(&format!("route {route_id}")));
        }
        inner.calls.push(Call::DeleteRoute(route_id.to_string()));
        Ok(())
    }

    async fn put_rule(&self, request: &PutRuleRequest) -> Result<String> {
        let mut inner = self.lock();
        let targets = inner
            .rules
            .remove(&request.name)
            .map(|(_, targets)| targets)
            .unwrap_or_default();
        inner.rules.insert(
            request.name.clone(),
            (request.schedule_expression.clone(), targets),
        );
        inner.calls.push(Call::PutRule(request.name.clone()));
        Ok(format!("arn:aws:events:{REGION}:{ACCOUNT}:rule/{}", request.name))
    }

    async fn put_targets(&self, request: &PutTargetsRequest) -> Result<()> {
        let mut inner = self.lock();
        let rule = inner
            .rules
            .get_mut(&request.rule)
            .ok_or_else(|| not_found(&format!("rule {}", request.rule)))?;
        rule.1.clone_from(&request.targets);
        inner.calls.push(Call::PutTargets(request.rule.clone()));
        Ok(())
    }

    async fn create_topic(&self, topic_name: &str, _tags: &Tags) -> Result<()> {
        let mut inner = self.lock();
        inner.topics.insert(topic_name.to_string());
        inner.calls.push(Call::CreateTopic(topic_name.to_string()));
        Ok(())
    }

    async fn subscribe(&self, topic_arn: &str, function_arn: &str, _tags: &Tags) -> Result<()> {
        let mut inner = self.lock();
        let topic = topic_arn.rsplit(':').next().unwrap_or(topic_arn);
        if !inner.topics.contains(topic) {
            return Err(not_found(&format!("topic {topic}")));
        }
        inner
            .subscriptions
            .insert((topic_arn.to_string(), function_arn.to_string()));
        inner.calls.push(Call::Subscribe(
            topic_arn.to_string(),
            function_arn.to_string(),
        ));
        Ok(())
    }
}
