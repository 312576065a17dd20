//! GitHub OAuth methods
//!
//! Authorization URL construction, code exchange and the token
//! management endpoints of a GitHub App or OAuth App.
//! Every operation yields the raw GitHub response alongside a
//! normalized `Authentication`; the client secret never appears in either.

use base64::Engine as _;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;

use super::{GitHubError, error_from_response};
use crate::config::{GitHubClientType, GitHubConfig};
use crate::metrics::observe_github_request;

/// Normalized token information
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    pub client_type: &'static str,
    pub client_id: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<String>,
}

/// Result of a token operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OAuthResult {
    pub authentication: Authentication,
    pub data: Value,
}

/// Options for `web_flow_authorization_url`
#[derive(Debug, Clone, Default)]
pub struct AuthorizationUrlOptions {
    pub redirect_url: Option<String>,
    pub state: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub login: Option<String>,
    pub allow_signup: Option<bool>,
}

/// Authorization URL plus the parameters encoded in it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationUrl {
    pub url: String,
    pub state: String,
    pub client_type: &'static str,
    pub client_id: String,
    pub redirect_url: Option<String>,
    pub scopes: Vec<String>,
}

/// Parameters for `scope_token`, as sent by clients
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeTokenRequest {
    pub target: Option<String>,
    pub target_id: Option<u64>,
    pub repositories: Option<Vec<String>>,
    pub repository_ids: Option<Vec<u64>>,
    pub permissions: Option<serde_json::Map<String, Value>>,
}

/// Token response of `/login/oauth/access_token`
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh_token_expires_in: Option<i64>,
}

/// OAuth client for one GitHub application
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    client_type: GitHubClientType,
    api_url: String,
    web_url: String,
    default_scopes: Vec<String>,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, config: &GitHubConfig) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            client_type: config.client_type,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            default_scopes: config.scopes.clone(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// URL that starts the web flow on GitHub
    ///
    /// A random `state` is generated when none is supplied. Scopes are
    /// only sent for OAuth Apps; GitHub Apps use their installation
    /// permissions.
    pub fn web_flow_authorization_url(&self, options: AuthorizationUrlOptions) -> AuthorizationUrl {
        let state = options
            .state
            .filter(|state| !state.is_empty())
            .unwrap_or_else(generate_state);
        let scopes = match self.client_type {
            GitHubClientType::OauthApp => options
                .scopes
                .unwrap_or_else(|| self.default_scopes.clone()),
            GitHubClientType::GithubApp => Vec::new(),
        };

        let base = format!("{}/login/oauth/authorize", self.web_url);
        let mut url = match url::Url::parse(&base) {
            Ok(url) => url,
            Err(error) => {
                // web_url is validated at startup
                tracing::error!(%error, url = %base, "Invalid GitHub web URL");
                return AuthorizationUrl {
                    url: base,
                    state,
                    client_type: self.client_type.as_str(),
                    client_id: self.client_id.clone(),
                    redirect_url: options.redirect_url,
                    scopes,
                };
            }
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            if let Some(redirect_url) = options.redirect_url.as_deref() {
                query.append_pair("redirect_uri", redirect_url);
            }
            if let Some(login) = options.login.as_deref() {
                query.append_pair("login", login);
            }
            if !scopes.is_empty() {
                query.append_pair("scope", &scopes.join(" "));
            }
            query.append_pair("state", &state);
            if let Some(allow_signup) = options.allow_signup {
                query.append_pair("allow_signup", if allow_signup { "true" } else { "false" });
            }
        }

        AuthorizationUrl {
            url: url.to_string(),
            state,
            client_type: self.client_type.as_str(),
            client_id: self.client_id.clone(),
            redirect_url: options.redirect_url,
            scopes,
        }
    }

    /// Exchange a web flow `code` for a user access token
    pub async fn exchange_web_flow_code(
        &self,
        code: &str,
        redirect_url: Option<&str>,
    ) -> Result<OAuthResult, GitHubError> {
        let mut body = json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "code": code,
        });
        if let Some(redirect_url) = redirect_url {
            body["redirect_uri"] = Value::String(redirect_url.to_string());
        }

        self.access_token_request("exchange_web_flow_code", body)
            .await
    }

    /// Trade a refresh token for a new token pair (expiring GitHub App tokens)
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthResult, GitHubError> {
        self.access_token_request(
            "refresh_token",
            json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }),
        )
        .await
    }

    /// Check a token: `POST /applications/{client_id}/token`
    pub async fn check_token(&self, token: &str) -> Result<OAuthResult, GitHubError> {
        let data = self
            .application_request(
                "check_token",
                reqwest::Method::POST,
                "token",
                json!({ "access_token": token }),
            )
            .await?;

        Ok(OAuthResult {
            authentication: self.authentication_from_app_response(token.to_string(), &data),
            data,
        })
    }

    /// Invalidate a token and issue a new one: `PATCH /applications/{client_id}/token`
    pub async fn reset_token(&self, token: &str) -> Result<OAuthResult, GitHubError> {
        let data = self
            .application_request(
                "reset_token",
                reqwest::Method::PATCH,
                "token",
                json!({ "access_token": token }),
            )
            .await?;

        let new_token = token_from_app_response(&data)?;
        Ok(OAuthResult {
            authentication: self.authentication_from_app_response(new_token, &data),
            data,
        })
    }

    /// Create a token restricted to a target and repositories:
    /// `POST /applications/{client_id}/token/scoped`
    pub async fn scope_token(
        &self,
        token: &str,
        request: &ScopeTokenRequest,
    ) -> Result<OAuthResult, GitHubError> {
        let mut body = serde_json::Map::new();
        body.insert("access_token".to_string(), token.into());
        if let Some(target) = &request.target {
            body.insert("target".to_string(), target.clone().into());
        }
        if let Some(target_id) = request.target_id {
            body.insert("target_id".to_string(), target_id.into());
        }
        if let Some(repositories) = &request.repositories {
            body.insert("repositories".to_string(), json!(repositories));
        }
        if let Some(repository_ids) = &request.repository_ids {
            body.insert("repository_ids".to_string(), json!(repository_ids));
        }
        if let Some(permissions) = &request.permissions {
            body.insert("permissions".to_string(), Value::Object(permissions.clone()));
        }

        let data = self
            .application_request(
                "scope_token",
                reqwest::Method::POST,
                "token/scoped",
                Value::Object(body),
            )
            .await?;

        let scoped_token = token_from_app_response(&data)?;
        Ok(OAuthResult {
            authentication: self.authentication_from_app_response(scoped_token, &data),
            data,
        })
    }

    /// Revoke a single token: `DELETE /applications/{client_id}/token`
    pub async fn delete_token(&self, token: &str) -> Result<(), GitHubError> {
        self.application_request(
            "delete_token",
            reqwest::Method::DELETE,
            "token",
            json!({ "access_token": token }),
        )
        .await
        .map(|_| ())
    }

    /// Revoke the whole grant, including every token of the user:
    /// `DELETE /applications/{client_id}/grant`
    pub async fn delete_authorization(&self, token: &str) -> Result<(), GitHubError> {
        self.application_request(
            "delete_authorization",
            reqwest::Method::DELETE,
            "grant",
            json!({ "access_token": token }),
        )
        .await
        .map(|_| ())
    }

    async fn access_token_request(
        &self,
        operation: &'static str,
        body: Value,
    ) -> Result<OAuthResult, GitHubError> {
        let started = Instant::now();
        let result = async {
            let response = self
                .http
                .post(format!("{}/login/oauth/access_token", self.web_url))
                .header(reqwest::header::ACCEPT, "application/json")
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            let data: Value = response
                .json()
                .await
                .map_err(|e| GitHubError::Decode(e.to_string()))?;

            // GitHub reports exchange failures with a 200 and an `error` field
            if let Some(error) = data.get("error").and_then(Value::as_str) {
                return Err(GitHubError::OAuth {
                    error: error.to_string(),
                    description: string_field(&data, "error_description"),
                    uri: string_field(&data, "error_uri"),
                });
            }

            let token: AccessTokenResponse = serde_json::from_value(data.clone())
                .map_err(|e| GitHubError::Decode(e.to_string()))?;
            Ok(OAuthResult {
                authentication: self.authentication_from_token_response(token, Utc::now()),
                data,
            })
        }
        .await;

        observe_github_request(operation, if result.is_ok() { "ok" } else { "error" }, started);
        result
    }

    async fn application_request(
        &self,
        operation: &'static str,
        method: reqwest::Method,
        path: &str,
        body: Value,
    ) -> Result<Value, GitHubError> {
        let started = Instant::now();
        let url = format!(
            "{}/applications/{}/{}",
            self.api_url,
            urlencoding::encode(&self.client_id),
            path
        );

        let result = async {
            let response = self
                .http
                .request(method, url)
                .basic_auth(&self.client_id, Some(&self.client_secret))
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            if response.status() == reqwest::StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| GitHubError::Decode(e.to_string()))
        }
        .await;

        observe_github_request(operation, if result.is_ok() { "ok" } else { "error" }, started);
        result
    }

    fn authentication_from_token_response(
        &self,
        response: AccessTokenResponse,
        now: DateTime<Utc>,
    ) -> Authentication {
        let mut authentication = Authentication {
            client_type: self.client_type.as_str(),
            client_id: self.client_id.clone(),
            token: response.access_token,
            scopes: None,
            expires_at: None,
            refresh_token: None,
            refresh_token_expires_at: None,
        };

        match self.client_type {
            GitHubClientType::OauthApp => {
                authentication.scopes = Some(split_scopes(response.scope.as_deref()));
            }
            GitHubClientType::GithubApp => {
                authentication.expires_at = response
                    .expires_in
                    .map(|seconds| to_timestamp(now + Duration::seconds(seconds)));
                authentication.refresh_token = response.refresh_token;
                authentication.refresh_token_expires_at = response
                    .refresh_token_expires_in
                    .map(|seconds| to_timestamp(now + Duration::seconds(seconds)));
            }
        }

        authentication
    }

    fn authentication_from_app_response(&self, token: String, data: &Value) -> Authentication {
        let mut authentication = Authentication {
            client_type: self.client_type.as_str(),
            client_id: self.client_id.clone(),
            token,
            scopes: None,
            expires_at: None,
            refresh_token: None,
            refresh_token_expires_at: None,
        };

        match self.client_type {
            GitHubClientType::OauthApp => {
                authentication.scopes = Some(
                    data.get("scopes")
                        .and_then(Value::as_array)
                        .map(|scopes| {
                            scopes
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_owned)
                                .collect()
                        })
                        .unwrap_or_default(),
                );
            }
            GitHubClientType::GithubApp => {
                authentication.expires_at = data
                    .get("expires_at")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
            }
        }

        authentication
    }
}

fn token_from_app_response(data: &Value) -> Result<String, GitHubError> {
    data.get("token")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| GitHubError::Decode("response has no token".to_string()))
}

fn string_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(str::to_owned)
        .collect()
}

fn to_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Generate a random OAuth `state` value
pub fn generate_state() -> String {
    let mut bytes = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
