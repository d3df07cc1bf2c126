//! End-to-end sync scenarios against the in-memory provider.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::{
    EventFunction, FunctionConfig, GlueConfig, HttpFunction, HttpMethod, PackagedArtifact,
    Reflection, Scope, TimerFunction,
};
use crate::planner::ResourceKind;
use crate::provider::{
    ACCOUNT, Call, FunctionInfo, MemoryProvider, Provider, REGION, StateReader, function_arn,
};

use super::{Reconciler, SyncOutcome};

fn config() -> FunctionConfig {
    FunctionConfig {
        node_version: Some(String::from(">=20")),
        ..FunctionConfig::default()
    }
}

fn http(name: &str, method: HttpMethod, path: &str) -> HttpFunction {
    HttpFunction {
        name: name.to_string(),
        method,
        path_pattern: path.to_string(),
        config: config(),
    }
}

fn timer(name: &str, schedule: &str) -> TimerFunction {
    TimerFunction {
        name: name.to_string(),
        schedule: schedule.to_string(),
        config: config(),
    }
}

fn event(name: &str, topic: &str, event_type: &str) -> EventFunction {
    EventFunction {
        name: name.to_string(),
        topic: topic.to_string(),
        event_type: event_type.to_string(),
        config: config(),
    }
}

fn reflection(
    http: Vec<HttpFunction>,
    timers: Vec<TimerFunction>,
    events: Vec<EventFunction>,
) -> Reflection {
    Reflection {
        name: String::from("svc"),
        revision: Some(String::from("rev1")),
        http,
        timers,
        events,
    }
}

fn glue() -> GlueConfig {
    GlueConfig {
        service: String::from("svc"),
        publish_topics: vec![String::from("status")],
        cors_sites: vec![String::from("*")],
        env: BTreeMap::from([(String::from("STAGE"), String::from("dev"))]),
        aws: None,
    }
}

fn artifacts(reflection: &Reflection) -> HashMap<String, PackagedArtifact> {
    reflection
        .function_names()
        .into_iter()
        .map(|name| {
            let code = PackagedArtifact::from_bytes(format!("code of {name}").into_bytes());
            (name, code)
        })
        .collect()
}

async fn sync(provider: &MemoryProvider, reflection: &Reflection) -> SyncOutcome {
    let scope = Scope::new("dev", "svc");
    let glue = glue();
    let artifacts = artifacts(reflection);
    Reconciler::new(provider, &scope, reflection, &glue, &artifacts)
        .with_settle_delay(Duration::ZERO)
        .run()
        .await
        .expect("sync")
}

fn position(calls: &[Call], predicate: impl Fn(&Call) -> bool) -> usize {
    calls
        .iter()
        .position(predicate)
        .expect("call was recorded")
}

#[tokio::test]
async fn test_create_from_empty() {
    let provider = MemoryProvider::new();
    let declared = reflection(vec![http("hello", HttpMethod::Get, "hello/*")], vec![], vec![]);

    let outcome = sync(&provider, &declared).await;

    assert_eq!(provider.functions().len(), 1);
    let gateways = provider.gateways();
    assert_eq!(gateways.len(), 1);
    let (api, integrations, routes) = &gateways[0];
    assert_eq!(integrations.len(), 1);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].spec.route_key, "GET /hello/{p1}");
    let grants = provider.grants("dev-svc-hello");
    assert_eq!(grants.len(), 1);
    assert_eq!(
        grants[0].body["Condition"]["ArnLike"]["AWS:SourceArn"],
        format!(
            "arn:aws:execute-api:{REGION}:{ACCOUNT}:{}/*/*/hello/{{p1}}",
            api.api_id
        )
    );
    assert!(
        provider
            .calls()
            .iter()
            .all(|c| !matches!(c, Call::DeleteFunction(_) | Call::DeleteRoute(_)))
    );

    assert_eq!(
        outcome.host.as_deref(),
        Some(format!("https://{}.execute-api.{REGION}.amazonaws.com/", api.api_id).as_str())
    );
    assert!(outcome.log_link.contains("dev-svc-hello"));
    assert_eq!(outcome.report.get(ResourceKind::Function).created, 1);
    assert_eq!(outcome.report.get(ResourceKind::Role).created, 1);
}

#[tokio::test]
async fn test_new_gateway_is_created_before_grants() {
    let provider = MemoryProvider::new();
    let declared = reflection(vec![http("hello", HttpMethod::Get, "")], vec![], vec![]);
    sync(&provider, &declared).await;

    let calls = provider.calls();
    let created = position(&calls, |c| matches!(c, Call::CreateApi(_)));
    let granted = position(&calls, |c| matches!(c, Call::AddGrant(..)));
    assert!(created < granted);
}

#[tokio::test]
async fn test_existing_gateway_grants_before_routing() {
    let provider = MemoryProvider::new();
    sync(
        &provider,
        &reflection(vec![http("a", HttpMethod::Get, "a")], vec![], vec![]),
    )
    .await;
    provider.clear_calls();

    sync(
        &provider,
        &reflection(
            vec![http("a", HttpMethod::Get, "a"), http("b", HttpMethod::Post, "b")],
            vec![],
            vec![],
        ),
    )
    .await;

    let calls = provider.calls();
    let granted = position(&calls, |c| {
        matches!(c, Call::AddGrant(name, _) if name == "dev-svc-b")
    });
    let integrated = position(&calls, |c| {
        matches!(c, Call::CreateIntegration(uri) if uri.ends_with("dev-svc-b"))
    });
    let routed = position(&calls, |c| matches!(c, Call::CreateRoute(key) if key == "POST /b"));
    assert!(granted < integrated);
    assert!(integrated < routed);
    assert!(calls.iter().all(|c| !matches!(c, Call::CreateApi(_))));
}

#[tokio::test]
async fn test_rename_replaces_every_resource() {
    let provider = MemoryProvider::new();
    sync(
        &provider,
        &reflection(vec![http("a", HttpMethod::Get, "a")], vec![], vec![]),
    )
    .await;
    provider.clear_calls();

    sync(
        &provider,
        &reflection(vec![http("b", HttpMethod::Get, "b")], vec![], vec![]),
    )
    .await;

    let names: Vec<_> = provider
        .functions()
        .into_iter()
        .map(|f| f.function_name)
        .collect();
    assert_eq!(names, vec![String::from("dev-svc-b")]);
    assert_eq!(provider.grants("dev-svc-b").len(), 1);

    let (_, integrations, routes) = provider.gateways().remove(0);
    assert_eq!(integrations.len(), 1);
    assert!(integrations[0].spec.integration_uri.ends_with(":dev-svc-b"));
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].spec.route_key, "GET /b");

    let calls = provider.calls();
    assert!(calls.contains(&Call::DeleteFunction(String::from("dev-svc-a"))));
    let unrouted = position(&calls, |c| matches!(c, Call::DeleteRoute(_)));
    let unintegrated = position(&calls, |c| matches!(c, Call::DeleteIntegration(_)));
    assert!(unrouted < unintegrated);
}

#[tokio::test]
async fn test_second_sync_is_a_noop() {
    let provider = MemoryProvider::new();
    let declared = reflection(
        vec![http("web", HttpMethod::Get, "items/*")],
        vec![timer("tick", "0 12 * * 1")],
        vec![event("track", "status", "greeting")],
    );
    sync(&provider, &declared).await;
    provider.clear_calls();

    let outcome = sync(&provider, &declared).await;

    assert!(provider.mutations().is_empty(), "{:?}", provider.mutations());
    assert!(outcome.report.is_noop());
    assert_eq!(outcome.report.get(ResourceKind::Function).unchanged, 3);
    assert_eq!(outcome.report.get(ResourceKind::Grant).unchanged, 3);
    assert_eq!(
        provider.rules()["dev-svc-tick"].0,
        "cron(0 12 * * 1 *)"
    );
}

#[tokio::test]
async fn test_converges_to_one_resource_per_function() {
    let provider = MemoryProvider::new();
    let declared = reflection(
        vec![http("web", HttpMethod::Get, ""), http("save", HttpMethod::Put, "items/*/")],
        vec![timer("tick", "*/5 * * * *")],
        vec![event("track", "status", "greeting")],
    );
    sync(&provider, &declared).await;

    let state = StateReader::new(&provider)
        .read(&Scope::new("dev", "svc"))
        .await
        .expect("read");
    assert_eq!(state.functions.len(), 4);
    for name in declared.function_names() {
        assert_eq!(
            state.functions.iter().filter(|f| f.name == name).count(),
            1,
            "{name}"
        );
        assert_eq!(provider.grants(&format!("dev-svc-{name}")).len(), 1, "{name}");
    }
    assert_eq!(state.gateway.integrations.len(), 2);
    assert_eq!(state.gateway.routes.len(), 2);
    assert!(state.gateway.stage.is_some());
    assert!(
        state
            .gateway
            .routes
            .iter()
            .any(|r| r.spec.route_key == "PUT /items/{p1}")
    );
    assert_eq!(provider.rules()["dev-svc-tick"].0, "cron(*/5 * * * ? *)");
    assert!(provider.subscriptions().contains(&(
        format!("arn:aws:sns:{REGION}:{ACCOUNT}:dev-status-greeting"),
        function_arn("dev-svc-track"),
    )));
    let policy = provider.policy().expect("policy");
    assert!(
        policy
            .statement
            .iter()
            .any(|s| s.resource == format!("arn:aws:sns:{REGION}:{ACCOUNT}:dev-status-*"))
    );
}

#[tokio::test]
async fn test_duplicate_remote_functions_keep_the_first() {
    let provider = MemoryProvider::new();
    for hash in ["first", "second"] {
        provider.insert_function(FunctionInfo {
            function_arn: function_arn("dev-svc-tick"),
            function_name: String::from("dev-svc-tick"),
            runtime: String::from("nodejs20.x"),
            memory_size: 128,
            timeout: 15,
            code_sha256: String::from(hash),
            code_size: 10,
            environment: None,
            architectures: vec![String::from("arm64")],
        });
    }
    let declared = reflection(vec![], vec![timer("tick", "0 * * * *")], vec![]);

    sync(&provider, &declared).await;

    let functions = provider.functions();
    assert_eq!(functions.len(), 1);
    let calls = provider.calls();
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, Call::DeleteFunction(_)))
            .count(),
        1
    );
    assert!(calls.contains(&Call::UpdateFunctionCode(String::from("dev-svc-tick"))));
    assert!(calls.iter().all(|c| !matches!(c, Call::CreateFunction(_))));

    provider.clear_calls();
    sync(&provider, &declared).await;
    assert!(provider.mutations().is_empty());
}

#[tokio::test]
async fn test_neighbouring_scope_functions_survive() {
    let provider = MemoryProvider::new();
    provider.insert_function(FunctionInfo {
        function_arn: function_arn("dev-svcextra-worker"),
        function_name: String::from("dev-svcextra-worker"),
        runtime: String::from("nodejs20.x"),
        memory_size: 128,
        timeout: 15,
        code_sha256: String::from("worker"),
        code_size: 10,
        environment: None,
        architectures: vec![String::from("arm64")],
    });

    sync(&provider, &reflection(vec![], vec![timer("a", "0 * * * *")], vec![])).await;

    let mut names: Vec<String> = provider
        .functions()
        .into_iter()
        .map(|f| f.function_name)
        .collect();
    names.sort();
    assert_eq!(names, ["dev-svc-a", "dev-svcextra-worker"]);
    assert!(
        provider
            .calls()
            .iter()
            .all(|c| !matches!(c, Call::DeleteFunction(_)))
    );
}

/// Schedules and subscriptions are never removed, so dropping a timer or
/// event function does not converge: its rule and subscription survive.
#[tokio::test]
async fn test_removed_timer_and_event_functions_are_not_converged() {
    let provider = MemoryProvider::new();
    sync(
        &provider,
        &reflection(
            vec![http("web", HttpMethod::Get, "")],
            vec![timer("tick", "0 * * * *")],
            vec![event("track", "status", "greeting")],
        ),
    )
    .await;

    sync(
        &provider,
        &reflection(vec![http("web", HttpMethod::Get, "")], vec![], vec![]),
    )
    .await;

    let names: Vec<_> = provider
        .functions()
        .into_iter()
        .map(|f| f.function_name)
        .collect();
    assert_eq!(names, vec![String::from("dev-svc-web")]);
    assert!(provider.rules().contains_key("dev-svc-tick"));
    assert!(provider.topics().contains("dev-status-greeting"));
    assert_eq!(provider.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_dropping_all_http_functions_keeps_gateway() {
    let provider = MemoryProvider::new();
    sync(
        &provider,
        &reflection(
            vec![http("web", HttpMethod::Get, "")],
            vec![timer("tick", "0 * * * *")],
            vec![],
        ),
    )
    .await;

    let outcome = sync(
        &provider,
        &reflection(vec![], vec![timer("tick", "0 * * * *")], vec![]),
    )
    .await;

    assert!(outcome.host.is_none());
    let (_, integrations, routes) = provider.gateways().remove(0);
    assert_eq!(integrations.len(), 1);
    assert_eq!(routes.len(), 1);
    assert_eq!(provider.functions().len(), 1);
}

#[tokio::test]
async fn test_existing_role_is_reused() {
    let provider = MemoryProvider::new();
    let role = provider
        .create_role("dev-svc-role", &crate::provider::Tags::new())
        .await
        .expect("role");
    provider.clear_calls();

    let declared = reflection(vec![], vec![timer("tick", "0 * * * *")], vec![]);
    let outcome = sync(&provider, &declared).await;

    assert!(provider.calls().iter().all(|c| !matches!(c, Call::CreateRole(_))));
    assert_eq!(outcome.report.get(ResourceKind::Role).unchanged, 1);
    assert!(role.arn.ends_with("dev-svc-role"));
}
