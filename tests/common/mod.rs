//! Common test utilities for E2E tests
//!
//! `TestServer` runs the real router on a random port with every GitHub
//! endpoint (REST, GraphQL, OAuth) pointed at a `wiremock` server.

#![allow(dead_code)]

use projectforms::auth::session::{Session, create_session_token};
use projectforms::github::GitHubUser;
use projectforms::{AppState, config};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "Iv1.test-client-id";
pub const CLIENT_SECRET: &str = "test-client-secret";
pub const USER_TOKEN: &str = "ghu_test_user_token";
pub const FORM_PATH: &str = "/project-forms/demo/projects/1/issues/new";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: MockServer,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Server with GitHub App credentials configured
    pub async fn new() -> Self {
        Self::start(CLIENT_ID, CLIENT_SECRET).await
    }

    /// Server without GitHub credentials
    pub async fn without_credentials() -> Self {
        Self::start("", "").await
    }

    async fn start(client_id: &str, client_secret: &str) -> Self {
        projectforms::metrics::init_metrics();

        let github = MockServer::start().await;

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            github: config::GitHubConfig {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                client_type: config::GitHubClientType::GithubApp,
                api_url: github.uri(),
                web_url: github.uri(),
                scopes: vec![],
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-that-is-32-bytes-long".to_string(),
                session_max_age: 604800,
            },
            cache: config::CacheConfig {
                project_ttl: 300,
                max_projects: 100,
            },
            forms: config::FormsConfig {
                demo_path: FORM_PATH.to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::new(config).unwrap();

        // Redirects are asserted, not followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = projectforms::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            github,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Session cookie value for the test user
    pub fn session_token(&self) -> String {
        let session = Session::new(test_user(), USER_TOKEN.to_string(), 3600);
        create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test token")
    }

    /// `Cookie` header carrying a valid session
    pub fn session_cookie(&self) -> String {
        format!("session={}", self.session_token())
    }

    /// `GET /user` answers with the test user
    pub async fn mock_user(&self) {
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", format!("Bearer {USER_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "octocat",
                "id": 583231,
                "avatar_url": "https://avatars.githubusercontent.com/u/583231",
                "name": "The Octocat"
            })))
            .mount(&self.github)
            .await;
    }

    /// Access check answers with the given permissions
    pub async fn mock_verify_access(&self, repo: bool, can_update: Option<bool>) {
        let project = can_update.map(|can_update| {
            json!({
                "title": "Demo project",
                "url": "https://github.com/orgs/project-forms/projects/1",
                "viewerCanUpdate": can_update
            })
        });
        let repository = repo.then(|| json!({ "id": "R_demo" }));

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("query verifyAccess"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "repository": repository,
                    "owner": { "project": project }
                }
            })))
            .mount(&self.github)
            .await;
    }

    /// Project query answers with `project_fields()`
    pub async fn mock_project(&self) {
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_string_contains("query getProjectWithItems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "userOrOrganization": {
                        "projectV2": project_fields()
                    }
                }
            })))
            .mount(&self.github)
            .await;
    }

    /// Access check and project query for a user with write access
    pub async fn mock_loadable_project(&self) {
        self.mock_verify_access(true, Some(true)).await;
        self.mock_project().await;
    }

    /// GraphQL request bodies received so far
    pub async fn graphql_requests(&self) -> Vec<Value> {
        self.github
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == "/graphql")
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }
}

pub fn test_user() -> GitHubUser {
    GitHubUser {
        login: "octocat".to_string(),
        id: 583231,
        avatar_url: "https://avatars.githubusercontent.com/u/583231".to_string(),
        name: Some("The Octocat".to_string()),
    }
}

pub fn project_fields() -> Value {
    json!({
        "id": "PVT_demo",
        "title": "Demo project",
        "url": "https://github.com/orgs/project-forms/projects/1",
        "fields": {
            "nodes": [
                { "id": "PVTF_title", "dataType": "TITLE", "name": "Title" },
                { "id": "PVTF_points", "dataType": "NUMBER", "name": "Points" },
                { "id": "PVTF_due", "dataType": "DATE", "name": "Due date" },
                {
                    "id": "PVTSSF_status", "dataType": "SINGLE_SELECT", "name": "Status",
                    "options": [
                        { "id": "f75ad846", "name": "Todo" },
                        { "id": "47fc9ee4", "name": "In Progress" }
                    ]
                },
                {
                    "id": "PVTIF_sprint", "dataType": "ITERATION", "name": "Sprint",
                    "configuration": {
                        "iterations": [
                            { "id": "c5a9c7f1", "title": "Sprint 3", "duration": 14, "startDate": "2024-02-05" }
                        ],
                        "completedIterations": [],
                        "duration": 14,
                        "startDay": 1
                    }
                }
            ]
        }
    })
}
