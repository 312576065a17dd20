//! GitHub REST/GraphQL client acting with a user's token

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Instant;

use super::graphql::{
    ADD_PROJECT_ITEM_MUTATION, AddItemData, FieldUpdate, GET_PROJECT_WITH_FIELDS_QUERY,
    GraphQLResponse, ProjectQueryData, ProjectV2Node, VERIFY_ACCESS_QUERY, VerifyAccessData,
    update_item_fields_mutation, update_item_fields_variables,
};
use super::{CreatedIssue, GitHubApi, GitHubError, GitHubUser, NewIssue, error_from_response};
use crate::config::GitHubConfig;
use crate::metrics::observe_github_request;

const GITHUB_API_VERSION: &str = "2022-11-28";

/// Client for api.github.com (or a compatible host)
///
/// Stateless apart from the shared connection pool; the user's token
/// is passed per call.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    graphql_url: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, config: &GitHubConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            graphql_url: config.graphql_url(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    /// Send a GraphQL document and decode the envelope
    async fn graphql<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        token: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphQLResponse<T>, GitHubError> {
        let started = Instant::now();
        let result = async {
            let response = self
                .request(reqwest::Method::POST, &self.graphql_url, token)
                .json(&json!({ "query": query, "variables": variables }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            response
                .json::<GraphQLResponse<T>>()
                .await
                .map_err(|e| GitHubError::Decode(e.to_string()))
        }
        .await;

        observe_github_request(operation, status_label(&result), started);
        result
    }
}

fn status_label<T>(result: &Result<T, GitHubError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(GitHubError::Unauthorized) => "unauthorized",
        Err(GitHubError::NotFound) => "not_found",
        Err(_) => "error",
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn get_user(&self, token: &str) -> Result<GitHubUser, GitHubError> {
        let started = Instant::now();
        let result = async {
            let response = self
                .request(reqwest::Method::GET, &format!("{}/user", self.api_url), token)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            response
                .json::<GitHubUser>()
                .await
                .map_err(|e| GitHubError::Decode(e.to_string()))
        }
        .await;

        observe_github_request("get_user", status_label(&result), started);
        result
    }

    async fn verify_access(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        project_number: u64,
    ) -> Result<VerifyAccessData, GitHubError> {
        tracing::debug!(owner, repo, project_number, "Verifying access");

        self.graphql::<VerifyAccessData>(
            "verify_access",
            token,
            VERIFY_ACCESS_QUERY,
            json!({ "owner": owner, "repo": repo, "projectNumber": project_number }),
        )
        .await?
        .into_partial_data()
    }

    async fn fetch_project(
        &self,
        token: &str,
        owner: &str,
        project_number: u64,
    ) -> Result<ProjectV2Node, GitHubError> {
        tracing::debug!(owner, project_number, "Fetching project fields");

        self.graphql::<ProjectQueryData>(
            "fetch_project",
            token,
            GET_PROJECT_WITH_FIELDS_QUERY,
            json!({ "owner": owner, "number": project_number }),
        )
        .await?
        .into_data()?
        .user_or_organization
        .and_then(|owner| owner.project_v2)
        .ok_or(GitHubError::NotFound)
    }

    async fn create_issue(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<CreatedIssue, GitHubError> {
        let started = Instant::now();
        let url = format!(
            "{}/repos/{}/{}/issues",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        );

        let result = async {
            let response = self
                .request(reqwest::Method::POST, &url, token)
                .json(issue)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            response
                .json::<CreatedIssue>()
                .await
                .map_err(|e| GitHubError::Decode(e.to_string()))
        }
        .await;

        observe_github_request("create_issue", status_label(&result), started);
        let issue = result?;
        tracing::info!(owner, repo, number = issue.number, url = %issue.html_url, "Issue created");
        Ok(issue)
    }

    async fn add_project_item(
        &self,
        token: &str,
        project_id: &str,
        content_id: &str,
    ) -> Result<String, GitHubError> {
        self.graphql::<AddItemData>(
            "add_project_item",
            token,
            ADD_PROJECT_ITEM_MUTATION,
            json!({ "projectId": project_id, "contentId": content_id }),
        )
        .await?
        .into_data()?
        .add_project_v2_item_by_id
        .and_then(|payload| payload.item)
        .map(|item| item.id)
        .ok_or_else(|| GitHubError::Decode("addProjectV2ItemById returned no item".to_string()))
    }

    async fn update_item_fields(
        &self,
        token: &str,
        project_id: &str,
        item_id: &str,
        updates: &[FieldUpdate],
    ) -> Result<(), GitHubError> {
        if updates.is_empty() {
            return Ok(());
        }

        self.graphql::<serde_json::Value>(
            "update_item_fields",
            token,
            &update_item_fields_mutation(updates.len()),
            update_item_fields_variables(project_id, item_id, updates),
        )
        .await?
        .into_data()
        .map(|_| ())
    }
}
