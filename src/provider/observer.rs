//! Current-state reader for one scope.
//!
//! Every sync starts from a fresh snapshot: the execution role, the scope's
//! functions and the scope's gateway are read concurrently, never cached.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{ContentHasher, Scope};
use crate::error::Result;
use crate::planner::Named;

use super::types::{FunctionInfo, GatewayApi, Integration, Role, Route, Stage};
use super::{DEFAULT_STAGE, Provider};

/// A function as observed remotely, named without the scope prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFunction {
    /// Provider identifier (ARN).
    pub id: String,
    /// Short name.
    pub name: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Memory in MB.
    pub memory: u32,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// CPU architectures.
    pub cpus: Vec<String>,
    /// Base64 SHA-256 of the deployed package.
    pub hash: String,
    /// Human-readable package size.
    pub size: String,
}

/// A gateway integration, named after the function it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIntegration {
    /// Short name of the target function.
    pub name: String,
    /// The integration.
    pub integration: Integration,
}

/// The scope's gateway and everything attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayState {
    /// The gateway, if one exists.
    pub api: Option<GatewayApi>,
    /// Integrations of the gateway.
    pub integrations: Vec<RemoteIntegration>,
    /// Routes of the gateway.
    pub routes: Vec<Route>,
    /// Default stage, if it exists.
    pub stage: Option<Stage>,
}

/// Snapshot of every remote resource kind of one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentState {
    /// Execution role.
    pub role: Option<Role>,
    /// Functions, in provider order.
    pub functions: Vec<RemoteFunction>,
    /// Gateway state.
    pub gateway: GatewayState,
}

/// Reads the current state of a scope.
#[derive(Debug)]
pub struct StateReader<'a, P: ?Sized> {
    /// Provider to read from.
    provider: &'a P,
}

impl<'a, P: Provider + ?Sized> StateReader<'a, P> {
    /// Creates a reader over `provider`.
    #[must_use]
    pub const fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Reads role, functions and gateway of `scope` concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first error of any read.
    pub async fn read(&self, scope: &Scope) -> Result<CurrentState> {
        info!("Reading current state of {scope}");
        let role_name = scope.role_name();
        let (role, functions, gateway) = tokio::try_join!(
            self.provider.get_role(&role_name),
            self.read_functions(scope),
            self.read_gateway(scope),
        )?;
        debug!(
            "Observed role: {}, functions: {}, gateway: {}",
            role.is_some(),
            functions.len(),
            gateway.api.as_ref().map_or("none", |a| a.api_id.as_str())
        );
        Ok(CurrentState {
            role,
            functions,
            gateway,
        })
    }

    /// Lists the scope's functions, stripping the scope prefix.
    async fn read_functions(&self, scope: &Scope) -> Result<Vec<RemoteFunction>> {
        let prefix = format!("{}-", scope.prefix()).to_lowercase();
        let functions = self.provider.list_functions(&prefix).await?;
        Ok(functions
            .into_iter()
            .map(|f| RemoteFunction::from_info(f, prefix.len()))
            .collect())
    }

    /// Finds the scope's gateway and reads its integrations, routes and stage.
    async fn read_gateway(&self, scope: &Scope) -> Result<GatewayState> {
        let api_name = scope.api_name();
        let Some(api) = self
            .provider
            .list_apis()
            .await?
            .into_iter()
            .find(|a| a.name == api_name)
        else {
            return Ok(GatewayState::default());
        };

        let (integrations, routes, stage) = tokio::try_join!(
            self.provider.list_integrations(&api.api_id),
            self.provider.list_routes(&api.api_id),
            self.provider.get_stage(&api.api_id, DEFAULT_STAGE),
        )?;
        let prefix = format!("{api_name}-");
        let integrations = integrations
            .into_iter()
            .map(|integration| RemoteIntegration {
                name: integration_target(&integration, &prefix),
                integration,
            })
            .collect();

        Ok(GatewayState {
            api: Some(api),
            integrations,
            routes,
            stage,
        })
    }
}

/// Short name of the function an integration targets: the last `:` segment
/// of its URI without the scope prefix.
fn integration_target(integration: &Integration, prefix: &str) -> String {
    let uri = &integration.spec.integration_uri;
    let full = uri.rsplit(':').next().unwrap_or(uri);
    full.strip_prefix(prefix).unwrap_or(full).to_string()
}

impl RemoteFunction {
    /// Converts a listed function, dropping `prefix_len` name characters.
    fn from_info(info: FunctionInfo, prefix_len: usize) -> Self {
        let name = info
            .function_name
            .get(prefix_len..)
            .unwrap_or_default()
            .to_string();
        Self {
            id: info.function_arn,
            name,
            runtime: info.runtime,
            memory: info.memory_size,
            timeout: info.timeout,
            env: info.environment.map(|e| e.variables).unwrap_or_default(),
            cpus: info.architectures,
            hash: info.code_sha256,
            size: ContentHasher::size_description(info.code_size),
        }
    }
}

impl Named for RemoteFunction {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for RemoteIntegration {
    fn name(&self) -> &str {
        &self.name
    }
}

impl CurrentState {
    /// Returns true if the scope's gateway exists.
    #[must_use]
    pub const fn has_gateway(&self) -> bool {
        self.gateway.api.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::IntegrationSpec;
    use crate::provider::{ApiSpec, CorsConfiguration, MemoryProvider};

    fn integration(uri: &str) -> Integration {
        Integration {
            integration_id: String::from("i1"),
            spec: IntegrationSpec {
                payload_format_version: String::from("2.0"),
                integration_type: String::from("AWS_PROXY"),
                integration_method: Some(String::from("GET")),
                integration_uri: String::from(uri),
                connection_type: Some(String::from("INTERNET")),
                timeout_in_millis: Some(20_000),
            },
        }
    }

    #[test]
    fn test_integration_target() {
        let i = integration("arn:aws:lambda:eu-west-1:123:function:dev-svc-hello");
        assert_eq!(integration_target(&i, "dev-svc-"), "hello");
        let foreign = integration("arn:aws:lambda:eu-west-1:123:function:other");
        assert_eq!(integration_target(&foreign, "dev-svc-"), "other");
    }

    #[test]
    fn test_remote_function_strips_prefix() {
        let info = FunctionInfo {
            function_arn: String::from("arn:aws:lambda:eu-west-1:123:function:dev-svc-hello"),
            function_name: String::from("dev-svc-hello"),
            runtime: String::from("nodejs20.x"),
            memory_size: 256,
            timeout: 15,
            code_sha256: String::from("abc="),
            code_size: 2048,
            environment: None,
            architectures: vec![String::from("x86_64")],
        };
        let remote = RemoteFunction::from_info(info, "dev-svc-".len());
        assert_eq!(remote.name, "hello");
        assert_eq!(remote.size, "2.0 KiB");
        assert!(remote.env.is_empty());
    }

    #[tokio::test]
    async fn test_empty_scope() {
        let provider = MemoryProvider::new();
        let state = StateReader::new(&provider)
            .read(&Scope::new("dev", "svc"))
            .await
            .expect("read");
        assert_eq!(state, CurrentState::default());
        assert!(!state.has_gateway());
    }

    #[tokio::test]
    async fn test_reads_only_own_gateway() {
        let provider = MemoryProvider::new();
        for name in ["prod-svc", "dev-svc"] {
            provider
                .create_api(&ApiSpec {
                    name: String::from(name),
                    protocol_type: String::from("HTTP"),
                    cors_configuration: CorsConfiguration::default(),
                    tags: crate::provider::Tags::new(),
                })
                .await
                .expect("api");
        }
        let state = StateReader::new(&provider)
            .read(&Scope::new("dev", "svc"))
            .await
            .expect("read");
        let api = state.gateway.api.expect("gateway");
        assert_eq!(api.name, "dev-svc");
        assert!(state.gateway.stage.is_none());
    }
}
