//! GitHub integration
//!
//! Handles:
//! - OAuth web flow and token management (`oauth`)
//! - REST and GraphQL calls on behalf of a signed-in user (`client`)
//! - GraphQL documents and wire types (`graphql`)

mod client;
pub mod graphql;
pub mod oauth;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::GitHubClient;
pub use graphql::{FieldUpdate, ProjectV2FieldValue, ProjectV2Node, VerifyAccessData};
pub use oauth::{Authentication, AuthorizationUrl, AuthorizationUrlOptions, OAuthClient, OAuthResult};

/// GitHub API failure
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Token missing, expired or revoked (HTTP 401)
    #[error("Bad credentials")]
    Unauthorized,

    /// Resource does not exist or is hidden from the token (HTTP 404)
    #[error("Not found")]
    NotFound,

    /// Any other non-success status
    #[error("GitHub responded with {status}: {message}")]
    Status { status: u16, message: String },

    /// GraphQL request answered with errors and no usable data
    #[error("{}", .0.join("; "))]
    GraphQL(Vec<String>),

    /// OAuth endpoint answered 200 with an error payload
    #[error("{description} ({error}, {uri})")]
    OAuth {
        error: String,
        description: String,
        uri: String,
    },

    /// Network or protocol failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Authenticated GitHub user (subset of `GET /user`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Issue to open
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
}

/// Issue returned by `POST /repos/{owner}/{repo}/issues`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    pub html_url: String,
    pub node_id: String,
}

/// GitHub operations performed on behalf of a signed-in user
///
/// `GitHubClient` talks to the real API; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /user`
    async fn get_user(&self, token: &str) -> Result<GitHubUser, GitHubError>;

    /// Check repository visibility and project permissions in one query
    ///
    /// GraphQL errors that come with partial data resolve to that data,
    /// since a hidden repository or project is reported as an error.
    async fn verify_access(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        project_number: u64,
    ) -> Result<VerifyAccessData, GitHubError>;

    /// Load a project with its field definitions
    async fn fetch_project(
        &self,
        token: &str,
        owner: &str,
        project_number: u64,
    ) -> Result<ProjectV2Node, GitHubError>;

    /// `POST /repos/{owner}/{repo}/issues`
    async fn create_issue(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<CreatedIssue, GitHubError>;

    /// Add an issue or pull request to a project, returning the item ID
    async fn add_project_item(
        &self,
        token: &str,
        project_id: &str,
        content_id: &str,
    ) -> Result<String, GitHubError>;

    /// Set field values on a project item
    async fn update_item_fields(
        &self,
        token: &str,
        project_id: &str,
        item_id: &str,
        updates: &[FieldUpdate],
    ) -> Result<(), GitHubError>;
}

/// Classify a non-success response
///
/// GitHub error bodies are JSON objects with a `message` field.
pub(crate) async fn error_from_response(response: reqwest::Response) -> GitHubError {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return GitHubError::Unauthorized;
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return GitHubError::NotFound;
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or(body);

    GitHubError::Status {
        status: status.as_u16(),
        message,
    }
}
