//! Production provider over the AWS HTTP APIs.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ReconcileError, Result, SyncError};

use super::Provider;
use super::client::{ApiRequest, ProviderClient, RetryPolicy, retry_conflict};
use super::types::{
    AddPermissionRequest, ApiSpec, CreateFunctionRequest, CreateFunctionResponse,
    CreatedIntegration, CreatedRoute, FunctionConfiguration, FunctionInfo, FunctionPage,
    FunctionPolicy, GatewayApi, Grant, Integration, IntegrationSpec, PolicyDocument,
    PutRuleRequest, PutRuleResponse, PutTargetsRequest, PutTargetsResponse, ResourcePolicy, Role,
    Route, RouteSpec, Stage, Tags, UpdateCodeRequest,
};

/// Identity API version.
const IAM_VERSION: &str = "2010-05-08";

/// Pub/sub API version.
const SNS_VERSION: &str = "2010-03-31";

/// Function API base path.
const FUNCTIONS: &str = "/2015-03-31/functions";

/// Retries of a function creation rejected while the role propagates.
const CREATE_FUNCTION_RETRIES: u32 = 25;

/// Trust policy allowing the compute runtime to assume the role.
const ASSUME_ROLE_POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":"lambda.amazonaws.com"},"Action":"sts:AssumeRole"}]}"#;

/// Provider talking to AWS.
#[derive(Debug, Clone)]
pub struct AwsProvider {
    /// Signed HTTP client.
    client: ProviderClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRoleEnvelope {
    get_role_response: GetRoleResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRoleResponse {
    get_role_result: RoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateRoleEnvelope {
    create_role_response: CreateRoleResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateRoleResponse {
    create_role_result: RoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleResult {
    role: Role,
}

impl AwsProvider {
    /// Creates a provider over `client`.
    #[must_use]
    pub const fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    /// Returns the retry policy of the underlying client.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        self.client.retry_policy()
    }

    fn function_path(function_name: &str) -> String {
        format!("{FUNCTIONS}/{function_name}")
    }
}

/// Tags in the `Tags.member.N.Key` form of query APIs.
fn member_tags(tags: &Tags) -> Vec<(String, String)> {
    tags.iter()
        .enumerate()
        .flat_map(|(i, (key, value))| {
            let n = i + 1;
            [
                (format!("Tags.member.{n}.Key"), key.clone()),
                (format!("Tags.member.{n}.Value"), value.clone()),
            ]
        })
        .collect()
}

/// Adds `params` to an identity query request.
fn iam_request(action: &str, params: Vec<(String, String)>) -> ApiRequest {
    params.into_iter().fold(
        ApiRequest::get("iam", "/")
            .query("Action", action)
            .query("Version", IAM_VERSION),
        |request, (k, v)| request.query(k, v),
    )
}

#[async_trait]
impl Provider for AwsProvider {
    fn region(&self) -> &str {
        self.client.region()
    }

    async fn get_role(&self, role_name: &str) -> Result<Option<Role>> {
        let request = iam_request("GetRole", vec![(String::from("RoleName"), role_name.to_string())]);
        let envelope: Option<GetRoleEnvelope> =
            self.client.call_optional(&request, "Error getting role").await?;
        Ok(envelope.map(|e| e.get_role_response.get_role_result.role))
    }

    async fn create_role(&self, role_name: &str, tags: &Tags) -> Result<Role> {
        let mut params = vec![
            (String::from("RoleName"), role_name.to_string()),
            (
                String::from("AssumeRolePolicyDocument"),
                String::from(ASSUME_ROLE_POLICY),
            ),
        ];
        params.extend(member_tags(tags));
        let envelope: CreateRoleEnvelope = self
            .client
            .call(&iam_request("CreateRole", params), "Error creating role")
            .await?;
        Ok(envelope.create_role_response.create_role_result.role)
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &PolicyDocument,
    ) -> Result<()> {
        let document = serde_json::to_string(document)
            .map_err(|e| SyncError::internal(format!("Invalid policy document: {e}")))?;
        let request = iam_request(
            "PutRolePolicy",
            vec![
                (String::from("RoleName"), role_name.to_string()),
                (String::from("PolicyName"), policy_name.to_string()),
                (String::from("PolicyDocument"), document),
            ],
        );
        self.client.call_ok(&request, "Error assigning policy").await
    }

    async fn list_functions(&self, prefix: &str) -> Result<Vec<FunctionInfo>> {
        let prefix = prefix.to_lowercase();
        let mut functions = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut request = ApiRequest::get("lambda", format!("{FUNCTIONS}/"));
            if let Some(marker) = marker.take() {
                request = request.query("Marker", marker);
            }
            let page: FunctionPage = self.client.call(&request, "Error listing functions").await?;
            functions.extend(
                page.functions
                    .into_iter()
                    .filter(|f| f.function_name.starts_with(&prefix)),
            );
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        debug!("Listed {} functions under {prefix}", functions.len());
        Ok(functions)
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<String> {
        let api_request = ApiRequest::post("lambda", FUNCTIONS)
            .json(request)?
            .retry_on_status(400, CREATE_FUNCTION_RETRIES);
        let created: CreateFunctionResponse = self
            .client
            .call(
                &api_request,
                &format!("Error creating lambda {}", request.function_name),
            )
            .await?;
        Ok(created.function_arn)
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        request: &UpdateCodeRequest,
    ) -> Result<()> {
        let api_request = ApiRequest::put(
            "lambda",
            format!("{}/code", Self::function_path(function_name)),
        )
        .json(request)?;
        self.client
            .call_ok(
                &api_request,
                &format!("Error updating code for lambda {function_name}"),
            )
            .await
    }

    async fn update_function_configuration(
        &self,
        function_name: &str,
        configuration: &FunctionConfiguration,
    ) -> Result<()> {
        let api_request = ApiRequest::put(
            "lambda",
            format!("{}/configuration", Self::function_path(function_name)),
        )
        .json(configuration)?;
        let operation = format!("Error updating config for lambda {function_name}");
        retry_conflict(self.retry_policy(), || {
            self.client.call_ok(&api_request, &operation)
        })
        .await
    }

    async fn delete_function(&self, function_name: &str) -> Result<()> {
        let request = ApiRequest::delete("lambda", Self::function_path(function_name));
        self.client
            .call_ok(&request, &format!("Error deleting lambda {function_name}"))
            .await
    }

    async fn list_grants(&self, function_name: &str) -> Result<Vec<Grant>> {
        let request = ApiRequest::get(
            "lambda",
            format!("{}/policy/", Self::function_path(function_name)),
        );
        let Some(policy) = self
            .client
            .call_optional::<FunctionPolicy>(&request, "Error getting triggers.")
            .await?
        else {
            return Ok(Vec::new());
        };
        let document: ResourcePolicy = serde_json::from_str(&policy.policy).map_err(|e| {
            ReconcileError::UnexpectedResponse {
                resource: String::from("policy"),
                message: e.to_string(),
            }
        })?;
        Ok(document
            .statement
            .into_iter()
            .map(Grant::from_statement)
            .collect())
    }

    async fn add_grant(&self, function_name: &str, request: &AddPermissionRequest) -> Result<()> {
        let api_request = ApiRequest::post(
            "lambda",
            format!("{}/policy/", Self::function_path(function_name)),
        )
        .json(request)?;
        self.client.call_ok(&api_request, "Error adding triggers.").await
    }

    async fn remove_grant(&self, function_name: &str, sid: &str) -> Result<()> {
        let request = ApiRequest::delete(
            "lambda",
            format!("{}/policy/{sid}", Self::function_path(function_name)),
        );
        self.client.call_ok(&request, "Error deleting triggers.").await
    }

    async fn list_apis(&self) -> Result<Vec<GatewayApi>> {
        self.client
            .pages("apigateway", "/v2/apis/", "Error getting APIs.")
            .await
    }

    async fn create_api(&self, spec: &ApiSpec) -> Result<GatewayApi> {
        let request = ApiRequest::post("apigateway", "/v2/apis/").json(spec)?;
        self.client.call(&request, "Error creating gateway.").await
    }

    async fn update_api(&self, api_id: &str, spec: &ApiSpec) -> Result<()> {
        let request = ApiRequest::patch("apigateway", format!("/v2/apis/{api_id}")).json(spec)?;
        self.client.call_ok(&request, "Error updating gateway.").await
    }

    async fn get_stage(&self, api_id: &str, stage_name: &str) -> Result<Option<Stage>> {
        let request = ApiRequest::get(
            "apigateway",
            format!("/v2/apis/{api_id}/stages/{stage_name}"),
        );
        self.client
            .call_optional(&request, "Error getting API stage.")
            .await
    }

    async fn create_stage(&self, api_id: &str, stage: &Stage) -> Result<()> {
        let request =
            ApiRequest::post("apigateway", format!("/v2/apis/{api_id}/stages")).json(stage)?;
        self.client.call_ok(&request, "Error creating stage.").await
    }

    async fn list_integrations(&self, api_id: &str) -> Result<Vec<Integration>> {
        self.client
            .pages(
                "apigateway",
                &format!("/v2/apis/{api_id}/integrations"),
                "Error getting API integrations.",
            )
            .await
    }

    async fn create_integration(&self, api_id: &str, spec: &IntegrationSpec) -> Result<String> {
        let request =
            ApiRequest::post("apigateway", format!("/v2/apis/{api_id}/integrations")).json(spec)?;
        let created: CreatedIntegration = retry_conflict(self.retry_policy(), || {
            self.client.call(&request, "Error creating API integration.")
        })
        .await?;
        Ok(created.integration_id)
    }

    async fn update_integration(
        &self,
        api_id: &str,
        integration_id: &str,
        spec: &IntegrationSpec,
    ) -> Result<()> {
        let request = ApiRequest::patch(
            "apigateway",
            format!("/v2/apis/{api_id}/integrations/{integration_id}"),
        )
        .json(spec)?;
        self.client
            .call_ok(&request, "Error updating API integration.")
            .await
    }

    async fn delete_integration(&self, api_id: &str, integration_id: &str) -> Result<()> {
        let request = ApiRequest::delete(
            "apigateway",
            format!("/v2/apis/{api_id}/integrations/{integration_id}"),
        );
        self.client
            .call_ok(&request, "Error deleting API integration.")
            .await
    }

    async fn list_routes(&self, api_id: &str) -> Result<Vec<Route>> {
        self.client
            .pages(
                "apigateway",
                &format!("/v2/apis/{api_id}/routes"),
                "Error getting API routes.",
            )
            .await
    }

    async fn create_route(&self, api_id: &str, spec: &RouteSpec) -> Result<String> {
        let request =
            ApiRequest::post("apigateway", format!("/v2/apis/{api_id}/routes")).json(spec)?;
        let created: CreatedRoute = retry_conflict(self.retry_policy(), || {
            self.client.call(&request, "Error creating API route.")
        })
        .await?;
        Ok(created.route_id)
    }

    async fn update_route(&self, api_id: &str, route_id: &str, spec: &RouteSpec) -> Result<()> {
        let request = ApiRequest::patch(
            "apigateway",
            format!("/v2/apis/{api_id}/routes/{route_id}"),
        )
        .json(spec)?;
        self.client.call_ok(&request, "Error updating API route.").await
    }

    async fn delete_route(&self, api_id: &str, route_id: &str) -> Result<()> {
        let request = ApiRequest::delete(
            "apigateway",
            format!("/v2/apis/{api_id}/routes/{route_id}"),
        );
        self.client.call_ok(&request, "Error deleting API route.").await
    }

    async fn put_rule(&self, request: &PutRuleRequest) -> Result<String> {
        let api_request = ApiRequest::post("events", "")
            .target("AWSEvents.PutRule")
            .json(request)?;
        let response: PutRuleResponse = self
            .client
            .call(&api_request, "Error creating event bridge schedule.")
            .await?;
        response
            .rule_arn
            .filter(|arn| !arn.is_empty())
            .ok_or_else(|| {
                ReconcileError::UnexpectedResponse {
                    resource: String::from("schedule rule"),
                    message: format!("no rule ARN for {}", request.name),
                }
                .into()
            })
    }

    async fn put_targets(&self, request: &PutTargetsRequest) -> Result<()> {
        let api_request = ApiRequest::post("events", "")
            .target("AWSEvents.PutTargets")
            .json(request)?;
        let response: PutTargetsResponse = self
            .client
            .call(&api_request, "Error creating event bridge schedule.")
            .await?;
        if response.failed_entry_count != 0 {
            return Err(ReconcileError::UnexpectedResponse {
                resource: String::from("schedule target"),
                message: format!(
                    "{} failed entries for {}",
                    response.failed_entry_count, request.rule
                ),
            }
            .into());
        }
        Ok(())
    }

    async fn create_topic(&self, topic_name: &str, tags: &Tags) -> Result<()> {
        let tags = member_tags(tags);
        let mut params = vec![
            ("Action", "CreateTopic"),
            ("Version", SNS_VERSION),
            ("Name", topic_name),
        ];
        params.extend(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let request = ApiRequest::post("sns", "").form(&params);
        self.client.call_ok(&request, "Error creating topic.").await
    }

    async fn subscribe(&self, topic_arn: &str, function_arn: &str, tags: &Tags) -> Result<()> {
        let tags = member_tags(tags);
        let mut params = vec![
            ("Action", "Subscribe"),
            ("Version", SNS_VERSION),
            ("TopicArn", topic_arn),
            ("Protocol", "lambda"),
            ("Endpoint", function_arn),
        ];
        params.extend(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let request = ApiRequest::post("sns", "").form(&params);
        self.client.call_ok(&request, "Error subscribing to topic.").await
    }
}
