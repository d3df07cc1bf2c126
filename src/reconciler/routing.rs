//! HTTP gateway reconciler.
//!
//! Keeps the scope's gateway, its default stage, one integration per HTTP
//! function and one route per integration in line with the declared HTTP
//! functions. Routes are deleted before the integrations they point at.

use futures::future::try_join_all;
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::config::{DeclaredFunction, HttpMethod, Scope};
use crate::error::{ReconcileError, Result};
use crate::planner::{Change, DiffEngine, Named, ResourceKind};
use crate::provider::{
    ApiSpec, CorsConfiguration, DEFAULT_STAGE, GatewayApi, GatewayState, IntegrationSpec,
    Provider, RemoteIntegration, Route, RouteSpec, Stage,
};

use super::{Location, SyncContext, normalize_path};

/// Upper bound of the gateway's integration timeout.
const MAX_INTEGRATION_TIMEOUT_MS: u32 = 30_000;

/// Extra time the gateway waits beyond the function timeout.
const INTEGRATION_GRACE_SECS: u32 = 5;

/// A listed route, named after the function its integration targets.
struct NamedRoute<'r> {
    /// Function name, empty when the target is unknown.
    name: &'r str,
    /// The route.
    route: &'r Route,
}

impl Named for NamedRoute<'_> {
    fn name(&self) -> &str {
        self.name
    }
}

/// Gateway CORS settings for the allowed origins.
///
/// Credentials are allowed unless the only origin is the `*` wildcard.
#[must_use]
pub fn cors_settings(sites: &[String]) -> CorsConfiguration {
    let all = || vec![String::from("*")];
    CorsConfiguration {
        allow_origins: sites.to_vec(),
        allow_credentials: !(sites.len() == 1 && sites[0] == "*"),
        max_age: 600,
        allow_methods: all(),
        allow_headers: all(),
        expose_headers: all(),
    }
}

/// Integration forwarding an HTTP function's requests to its compute unit.
#[must_use]
pub fn integration_spec(
    location: &Location,
    scope: &Scope,
    function: &DeclaredFunction,
) -> IntegrationSpec {
    let timeout_ms = function
        .timeout()
        .saturating_add(INTEGRATION_GRACE_SECS)
        .saturating_mul(1000)
        .min(MAX_INTEGRATION_TIMEOUT_MS);
    IntegrationSpec {
        payload_format_version: String::from("2.0"),
        integration_type: String::from("AWS_PROXY"),
        integration_method: function.method().map(|m| m.to_string()),
        integration_uri: location.function_arn(&scope.function_name(&function.name)),
        connection_type: Some(String::from("INTERNET")),
        timeout_in_millis: Some(timeout_ms),
    }
}

/// Route for a method and path pattern, targeting an integration.
///
/// Wildcards become positional placeholders: `items/*/sub/*` is routed as
/// `items/{p1}/sub/{p2}`.
#[must_use]
pub fn route_spec(integration_id: &str, method: HttpMethod, path_pattern: &str) -> RouteSpec {
    RouteSpec {
        route_key: format!("{method} /{}", normalize_path(path_pattern)),
        authorization_type: String::from("NONE"),
        api_key_required: false,
        target: Some(format!("integrations/{integration_id}")),
    }
}

/// Reconciler for the HTTP gateway.
#[derive(Debug)]
pub struct RoutingReconciler<'a, P: ?Sized> {
    /// Shared handles.
    ctx: SyncContext<'a, P>,
    /// Region and account of integration targets.
    location: &'a Location,
    /// Allowed CORS origins.
    cors_sites: &'a [String],
}

impl<'a, P: Provider + ?Sized> RoutingReconciler<'a, P> {
    /// Creates a routing reconciler.
    #[must_use]
    pub const fn new(
        ctx: SyncContext<'a, P>,
        location: &'a Location,
        cors_sites: &'a [String],
    ) -> Self {
        Self {
            ctx,
            location,
            cors_sites,
        }
    }

    /// Brings the gateway in line with the HTTP functions and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns the first provider failure.
    pub async fn sync(&self, http: &[DeclaredFunction], current: &GatewayState) -> Result<String> {
        match &current.api {
            Some(api) => self.sync_existing(api, http, current).await,
            None => self.create_gateway(http).await,
        }
    }

    fn api_spec(&self) -> ApiSpec {
        ApiSpec {
            name: self.ctx.scope.api_name(),
            protocol_type: String::from("HTTP"),
            cors_configuration: cors_settings(self.cors_sites),
            tags: self.ctx.scope.tags(),
        }
    }

    async fn create_gateway(&self, http: &[DeclaredFunction]) -> Result<String> {
        trace!("creating gateway");
        let api = self.ctx.provider.create_api(&self.api_spec()).await?;
        debug!("Created gateway {}", api.api_id);
        self.ctx.report.record(ResourceKind::Gateway, Change::Created);
        self.create_stage(&api.api_id).await?;

        let ids: HashMap<&str, String> =
            try_join_all(http.iter().map(|f| self.create_integration(&api.api_id, f)))
                .await?
                .into_iter()
                .collect();
        try_join_all(http.iter().map(|f| self.create_route(&api.api_id, f, &ids))).await?;
        Ok(api.api_id)
    }

    async fn sync_existing(
        &self,
        api: &GatewayApi,
        http: &[DeclaredFunction],
        current: &GatewayState,
    ) -> Result<String> {
        let api_id = api.api_id.as_str();
        self.sync_api(api).await?;
        if current.stage.is_none() {
            self.create_stage(api_id).await?;
        }

        let integrations = DiffEngine::new().compare(http, &current.integrations);
        let (created, kept) = tokio::try_join!(
            try_join_all(
                integrations
                    .missing
                    .iter()
                    .map(|f| self.create_integration(api_id, f))
            ),
            try_join_all(
                integrations
                    .existing
                    .iter()
                    .map(|(f, i)| self.update_integration(api_id, f, i))
            ),
        )?;
        let ids: HashMap<&str, String> = created.into_iter().chain(kept).collect();
        let name_by_target: HashMap<String, &str> = ids
            .iter()
            .map(|(name, id)| (format!("integrations/{id}"), *name))
            .collect();

        let named: Vec<NamedRoute<'_>> = current
            .routes
            .iter()
            .map(|route| NamedRoute {
                name: route
                    .spec
                    .target
                    .as_ref()
                    .and_then(|t| name_by_target.get(t).copied())
                    .unwrap_or_default(),
                route,
            })
            .collect();
        let routes = DiffEngine::new().compare(http, &named);

        try_join_all(routes.surplus.iter().map(|r| self.delete_route(api_id, r.route))).await?;
        tokio::try_join!(
            try_join_all(
                routes
                    .missing
                    .iter()
                    .map(|f| self.create_route(api_id, f, &ids))
            ),
            try_join_all(
                routes
                    .existing
                    .iter()
                    .map(|(f, r)| self.update_route(api_id, f, r.route, &ids))
            ),
        )?;
        try_join_all(
            integrations
                .surplus
                .iter()
                .map(|i| self.delete_integration(api_id, &i.integration.integration_id)),
        )
        .await?;

        Ok(api.api_id.clone())
    }

    /// Rewrites the gateway if its CORS settings drifted.
    async fn sync_api(&self, api: &GatewayApi) -> Result<()> {
        let spec = self.api_spec();
        if api.cors_configuration.as_ref() == Some(&spec.cors_configuration) {
            self.ctx.report.record(ResourceKind::Gateway, Change::Unchanged);
            return Ok(());
        }
        trace!("updating gateway");
        self.ctx.provider.update_api(&api.api_id, &spec).await?;
        debug!("Updated gateway {}", api.api_id);
        self.ctx.report.record(ResourceKind::Gateway, Change::Updated);
        Ok(())
    }

    async fn create_stage(&self, api_id: &str) -> Result<()> {
        let stage = Stage {
            stage_name: String::from(DEFAULT_STAGE),
            auto_deploy: true,
            tags: self.ctx.scope.tags(),
        };
        trace!("creating stage {DEFAULT_STAGE} of {api_id}");
        self.ctx.provider.create_stage(api_id, &stage).await?;
        self.ctx.report.record(ResourceKind::Stage, Change::Created);
        Ok(())
    }

    async fn create_integration<'f>(
        &self,
        api_id: &str,
        function: &'f DeclaredFunction,
    ) -> Result<(&'f str, String)> {
        let spec = integration_spec(self.location, self.ctx.scope, function);
        trace!("creating API integration");
        let id = self.ctx.provider.create_integration(api_id, &spec).await?;
        trace!("  from {api_id} to {} as {id}", spec.integration_uri);
        self.ctx
            .report
            .record(ResourceKind::Integration, Change::Created);
        Ok((function.name.as_str(), id))
    }

    async fn update_integration<'f>(
        &self,
        api_id: &str,
        function: &'f DeclaredFunction,
        current: &RemoteIntegration,
    ) -> Result<(&'f str, String)> {
        let spec = integration_spec(self.location, self.ctx.scope, function);
        let id = current.integration.integration_id.clone();
        if current.integration.spec == spec {
            self.ctx
                .report
                .record(ResourceKind::Integration, Change::Unchanged);
            return Ok((function.name.as_str(), id));
        }
        trace!("updating API integration {id}");
        trace!("  from {api_id} to {}", spec.integration_uri);
        self.ctx
            .provider
            .update_integration(api_id, &id, &spec)
            .await?;
        self.ctx
            .report
            .record(ResourceKind::Integration, Change::Updated);
        Ok((function.name.as_str(), id))
    }

    async fn delete_integration(&self, api_id: &str, integration_id: &str) -> Result<()> {
        trace!("deleting API integration {integration_id}");
        self.ctx
            .provider
            .delete_integration(api_id, integration_id)
            .await?;
        self.ctx
            .report
            .record(ResourceKind::Integration, Change::Deleted);
        Ok(())
    }

    /// Desired route of an HTTP function, given the integration IDs by name.
    fn desired_route(
        function: &DeclaredFunction,
        ids: &HashMap<&str, String>,
    ) -> Result<RouteSpec> {
        let missing = || ReconcileError::MissingIntegration {
            function: function.name.clone(),
        };
        let id = ids.get(function.name.as_str()).ok_or_else(missing)?;
        let method = function.method().ok_or_else(missing)?;
        let path = function.path_pattern().unwrap_or_default();
        Ok(route_spec(id, method, path))
    }

    async fn create_route(
        &self,
        api_id: &str,
        function: &DeclaredFunction,
        ids: &HashMap<&str, String>,
    ) -> Result<()> {
        let spec = Self::desired_route(function, ids)?;
        trace!(
            "creating route {} to {}",
            spec.route_key,
            spec.target.as_deref().unwrap_or_default()
        );
        let route_id = self.ctx.provider.create_route(api_id, &spec).await?;
        debug!("Created route {route_id}");
        self.ctx.report.record(ResourceKind::Route, Change::Created);
        Ok(())
    }

    async fn update_route(
        &self,
        api_id: &str,
        function: &DeclaredFunction,
        current: &Route,
        ids: &HashMap<&str, String>,
    ) -> Result<()> {
        let spec = Self::desired_route(function, ids)?;
        if current.spec == spec {
            self.ctx.report.record(ResourceKind::Route, Change::Unchanged);
            return Ok(());
        }
        trace!(
            "updating API route {} to {}",
            current.route_id,
            spec.target.as_deref().unwrap_or_default()
        );
        self.ctx
            .provider
            .update_route(api_id, &current.route_id, &spec)
            .await?;
        self.ctx.report.record(ResourceKind::Route, Change::Updated);
        Ok(())
    }

    async fn delete_route(&self, api_id: &str, route: &Route) -> Result<()> {
        trace!(
            "deleting API route {} from {}",
            route.route_id,
            route.spec.target.as_deref().unwrap_or_default()
        );
        self.ctx
            .provider
            .delete_route(api_id, &route.route_id)
            .await?;
        self.ctx.report.record(ResourceKind::Route, Change::Deleted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FunctionConfig, Trigger};
    use crate::planner::SyncReport;
    use crate::provider::{ACCOUNT, Call, MemoryProvider, REGION, StateReader};

    fn location() -> Location {
        Location {
            region: String::from(REGION),
            account: String::from(ACCOUNT),
        }
    }

    fn http(name: &str, method: HttpMethod, path: &str) -> DeclaredFunction {
        DeclaredFunction {
            name: name.to_string(),
            trigger: Trigger::Http {
                method,
                path_pattern: path.to_string(),
            },
            config: FunctionConfig::default(),
        }
    }

    async fn gateway(provider: &MemoryProvider, scope: &Scope) -> GatewayState {
        StateReader::new(provider)
            .read(scope)
            .await
            .expect("read")
            .gateway
    }

    #[test]
    fn test_cors_settings() {
        let open = cors_settings(&[String::from("*")]);
        assert!(!open.allow_credentials);
        assert_eq!(open.max_age, 600);
        assert_eq!(open.allow_methods, vec![String::from("*")]);

        let sites = cors_settings(&[String::from("https://example.com")]);
        assert!(sites.allow_credentials);
        assert!(cors_settings(&[]).allow_credentials);
    }

    #[test]
    fn test_integration_timeout_is_capped() {
        let scope = Scope::new("dev", "svc");
        let mut function = http("a", HttpMethod::Get, "");
        let spec = integration_spec(&location(), &scope, &function);
        assert_eq!(spec.timeout_in_millis, Some(20_000));
        assert_eq!(spec.integration_method.as_deref(), Some("GET"));
        assert_eq!(
            spec.integration_uri,
            format!("arn:aws:lambda:{REGION}:{ACCOUNT}:function:dev-svc-a")
        );

        function.config.timeout = Some(60);
        let spec = integration_spec(&location(), &scope, &function);
        assert_eq!(spec.timeout_in_millis, Some(30_000));
    }

    #[test]
    fn test_route_keys() {
        assert_eq!(route_spec("i1", HttpMethod::Get, "").route_key, "GET /");
        assert_eq!(
            route_spec("i1", HttpMethod::Post, "items/*/sub/*").route_key,
            "POST /items/{p1}/sub/{p2}"
        );
        let route = route_spec("i1", HttpMethod::Delete, "items/*/");
        assert_eq!(route.route_key, "DELETE /items/{p1}");
        assert_eq!(route.target.as_deref(), Some("integrations/i1"));
    }

    #[tokio::test]
    async fn test_create_gateway_from_empty() {
        let provider = MemoryProvider::new();
        let scope = Scope::new("dev", "svc");
        let report = SyncReport::new();
        let location = location();
        let sites = vec![String::from("*")];
        let reconciler =
            RoutingReconciler::new(SyncContext::new(&provider, &scope, &report), &location, &sites);

        let functions = vec![http("a", HttpMethod::Get, "a/*"), http("b", HttpMethod::Post, "b")];
        let api_id = reconciler
            .sync(&functions, &GatewayState::default())
            .await
            .expect("sync");

        let (api, integrations, routes) = provider.gateways().remove(0);
        assert_eq!(api.api_id, api_id);
        assert_eq!(api.name, "dev-svc");
        assert_eq!(integrations.len(), 2);
        let mut keys: Vec<_> = routes.iter().map(|r| r.spec.route_key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["GET /a/{p1}", "POST /b"]);
        assert_eq!(report.get(ResourceKind::Stage).created, 1);
        assert!(gateway(&provider, &scope).await.stage.is_some());
    }

    #[tokio::test]
    async fn test_existing_gateway_is_stable() {
        let provider = MemoryProvider::new();
        let scope = Scope::new("dev", "svc");
        let location = location();
        let sites = vec![String::from("https://example.com")];
        let functions = vec![http("a", HttpMethod::Get, "a")];
        let first = SyncReport::new();
        RoutingReconciler::new(SyncContext::new(&provider, &scope, &first), &location, &sites)
            .sync(&functions, &GatewayState::default())
            .await
            .expect("create");

        provider.clear_calls();
        let second = SyncReport::new();
        let current = gateway(&provider, &scope).await;
        RoutingReconciler::new(SyncContext::new(&provider, &scope, &second), &location, &sites)
            .sync(&functions, &current)
            .await
            .expect("resync");
        assert!(provider.mutations().is_empty());
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_removed_function_drops_route_before_integration() {
        let provider = MemoryProvider::new();
        let scope = Scope::new("dev", "svc");
        let location = location();
        let sites = vec![String::from("*")];
        let report = SyncReport::new();
        let ctx = SyncContext::new(&provider, &scope, &report);
        RoutingReconciler::new(ctx, &location, &sites)
            .sync(
                &[http("a", HttpMethod::Get, "a"), http("b", HttpMethod::Get, "b")],
                &GatewayState::default(),
            )
            .await
            .expect("create");

        provider.clear_calls();
        let current = gateway(&provider, &scope).await;
        let doomed = current
            .integrations
            .iter()
            .find(|i| i.name == "b")
            .expect("integration b")
            .integration
            .integration_id
            .clone();
        RoutingReconciler::new(ctx, &location, &sites)
            .sync(&[http("a", HttpMethod::Get, "a")], &current)
            .await
            .expect("shrink");

        let calls = provider.mutations();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::DeleteRoute(_)));
        assert_eq!(calls[1], Call::DeleteIntegration(doomed));
    }

    #[tokio::test]
    async fn test_cors_and_path_changes_update_in_place() {
        let provider = MemoryProvider::new();
        let scope = Scope::new("dev", "svc");
        let location = location();
        let report = SyncReport::new();
        let ctx = SyncContext::new(&provider, &scope, &report);
        let open = vec![String::from("*")];
        RoutingReconciler::new(ctx, &location, &open)
            .sync(&[http("a", HttpMethod::Get, "a")], &GatewayState::default())
            .await
            .expect("create");

        provider.clear_calls();
        let current = gateway(&provider, &scope).await;
        let closed = vec![String::from("https://example.com")];
        RoutingReconciler::new(ctx, &location, &closed)
            .sync(&[http("a", HttpMethod::Get, "a/*")], &current)
            .await
            .expect("update");

        let calls = provider.mutations();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::UpdateApi(_)));
        assert!(matches!(&calls[1], Call::UpdateRoute(_)));
        let (_, _, routes) = provider.gateways().remove(0);
        assert_eq!(routes[0].spec.route_key, "GET /a/{p1}");
    }

    #[tokio::test]
    async fn test_missing_stage_is_recreated() {
        let provider = MemoryProvider::new();
        let scope = Scope::new("dev", "svc");
        let location = location();
        let sites = vec![String::from("*")];
        let report = SyncReport::new();
        let api = provider
            .create_api(&ApiSpec {
                name: scope.api_name(),
                protocol_type: String::from("HTTP"),
                cors_configuration: cors_settings(&sites),
                tags: scope.tags(),
            })
            .await
            .expect("api");
        provider.clear_calls();

        let current = gateway(&provider, &scope).await;
        let api_id = RoutingReconciler::new(SyncContext::new(&provider, &scope, &report), &location, &sites)
            .sync(&[], &current)
            .await
            .expect("sync");
        assert_eq!(api_id, api.api_id);
        assert_eq!(provider.calls(), vec![Call::CreateStage(api.api_id)]);
    }
}
