//! GitHub OAuth token endpoints
//!
//! Browser clients call these instead of GitHub directly so the client
//! secret stays on the server. Responses are readable from any origin.
//!
//! Routes (under `/api/github/oauth`):
//! - GET    /login          - redirect to GitHub authorization
//! - GET    /callback       - exchange code, show token
//! - POST   /token          - exchange code
//! - GET    /token          - check token
//! - PATCH  /token          - reset token
//! - PATCH  /refresh-token  - refresh token
//! - POST   /token/scoped   - create scoped token
//! - DELETE /token          - revoke token
//! - DELETE /grant          - revoke authorization

use axum::{
    Router, async_trait,
    body::Bytes,
    extract::{FromRequest, Query, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::AppState;
use crate::auth::{LoginCallback, MISSING_CREDENTIALS};
use crate::error::OAuthError;
use crate::github::AuthorizationUrlOptions;
use crate::github::oauth::ScopeTokenRequest;
use crate::metrics::OAUTH_OPERATIONS_TOTAL;

/// Create OAuth proxy router
pub fn oauth_proxy_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/login", get(get_login).fallback(not_found))
        .route("/callback", get(get_callback).fallback(not_found))
        .route(
            "/token",
            post(create_token)
                .get(check_token)
                .patch(reset_token)
                .delete(delete_token)
                .fallback(not_found),
        )
        .route("/refresh-token", patch(refresh_token).fallback(not_found))
        .route("/token/scoped", post(scope_token).fallback(not_found))
        .route("/grant", delete(delete_grant).fallback(not_found))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state, oauth_guard))
}

// =============================================================================
// Middleware
// =============================================================================

/// Reject every request while credentials are missing; answer preflights
async fn oauth_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.github.has_credentials() {
        return (StatusCode::INTERNAL_SERVER_ERROR, MISSING_CREDENTIALS).into_response();
    }

    if request.method() == Method::OPTIONS {
        return (
            StatusCode::OK,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (header::ACCESS_CONTROL_ALLOW_METHODS, "*"),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "Content-Type, User-Agent, Authorization",
                ),
            ],
        )
            .into_response();
    }

    next.run(request).await
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

// =============================================================================
// Helpers
// =============================================================================

/// Request body of a known route: empty or JSON
///
/// Routes without parameters in the body still reject malformed JSON.
struct JsonBody<T>(T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = OAuthError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(|_| OAuthError::MalformedBody)?;
        parse_body(&bytes).map(JsonBody)
    }
}

/// Decode a request body; empty is `{}`
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, OAuthError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|_| OAuthError::MalformedBody)
}

/// Token from `Authorization: token <t>` (or `Bearer <t>`)
fn authorization_token(headers: &HeaderMap) -> Result<String, OAuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(OAuthError::MissingAuthorization)?;

    let token = value
        .split_once(' ')
        .filter(|(scheme, _)| {
            scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer")
        })
        .map_or(value, |(_, token)| token)
        .trim();

    if token.is_empty() {
        return Err(OAuthError::MissingAuthorization);
    }
    Ok(token.to_string())
}

fn json_response(status: StatusCode, body: &impl serde::Serialize) -> Response {
    let mut response = (status, axum::Json(body)).into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

fn no_content() -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
    )
        .into_response()
}

fn record<T>(operation: &'static str, result: Result<T, OAuthError>) -> Result<T, OAuthError> {
    let status = if result.is_ok() { "ok" } else { "error" };
    OAUTH_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    if let Err(error) = &result {
        tracing::info!(operation, %error, "OAuth operation failed");
    }
    result
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginQuery {
    redirect_url: Option<String>,
    state: Option<String>,
    /// Comma-separated
    scopes: Option<String>,
    login: Option<String>,
    allow_signup: Option<bool>,
}

/// GET /login
async fn get_login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    JsonBody(_): JsonBody<Value>,
) -> Result<Response, OAuthError> {
    let authorization = state
        .oauth
        .web_flow_authorization_url(AuthorizationUrlOptions {
            redirect_url: query.redirect_url,
            state: query.state,
            scopes: query.scopes.map(|scopes| {
                scopes
                    .split(',')
                    .map(str::trim)
                    .filter(|scope| !scope.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            login: query.login,
            allow_signup: query.allow_signup,
        });

    OAUTH_OPERATIONS_TOTAL
        .with_label_values(&["login", "ok"])
        .inc();

    Ok((StatusCode::FOUND, [(header::LOCATION, authorization.url)]).into_response())
}

/// GET /callback
async fn get_callback(
    State(state): State<AppState>,
    Query(query): Query<LoginCallback>,
    JsonBody(_): JsonBody<Value>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        if let Some(error) = query.error {
            return Err(OAuthError::Denied {
                error,
                description: query.error_description.unwrap_or_default(),
            });
        }
        let code = query.code.ok_or(OAuthError::MissingParameter("code"))?;
        Ok(state.oauth.exchange_web_flow_code(&code, None).await?)
    }
    .await;
    let result = record("callback", result)?;

    let token = html_escape::encode_text(&result.authentication.token);
    Ok(Html(format!(
        "<h1>Token created successfully</h1>\n\n<p>Your token is: <strong>{token}</strong>. Copy it now as it cannot be shown again.</p>"
    ))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenBody {
    code: Option<String>,
    redirect_url: Option<String>,
}

/// POST /token
async fn create_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateTokenBody>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        let code = body
            .code
            .filter(|code| !code.is_empty())
            .ok_or(OAuthError::MissingParameter("code"))?;

        Ok(state
            .oauth
            .exchange_web_flow_code(&code, body.redirect_url.as_deref())
            .await?)
    }
    .await;

    let result = record("create_token", result)?;
    Ok(json_response(StatusCode::CREATED, &result))
}

/// GET /token
async fn check_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(_): JsonBody<Value>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        let token = authorization_token(&headers)?;
        Ok(state.oauth.check_token(&token).await?)
    }
    .await;

    let result = record("check_token", result)?;
    Ok(json_response(StatusCode::OK, &result))
}

/// PATCH /token
async fn reset_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(_): JsonBody<Value>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        let token = authorization_token(&headers)?;
        Ok(state.oauth.reset_token(&token).await?)
    }
    .await;

    let result = record("reset_token", result)?;
    Ok(json_response(StatusCode::OK, &result))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenBody {
    refresh_token: Option<String>,
}

/// PATCH /refresh-token
async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<RefreshTokenBody>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        authorization_token(&headers)?;
        let refresh_token = body
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| OAuthError::Other("refreshToken must be sent in request body".to_string()))?;

        Ok(state.oauth.refresh_token(&refresh_token).await?)
    }
    .await;

    let result = record("refresh_token", result)?;
    Ok(json_response(StatusCode::OK, &result))
}

/// POST /token/scoped
async fn scope_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<ScopeTokenRequest>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        let token = authorization_token(&headers)?;
        Ok(state.oauth.scope_token(&token, &request).await?)
    }
    .await;

    let result = record("scope_token", result)?;
    Ok(json_response(StatusCode::OK, &result))
}

/// DELETE /token
async fn delete_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(_): JsonBody<Value>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        let token = authorization_token(&headers)?;
        Ok(state.oauth.delete_token(&token).await?)
    }
    .await;

    record("delete_token", result)?;
    Ok(no_content())
}

/// DELETE /grant
async fn delete_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(_): JsonBody<Value>,
) -> Result<Response, OAuthError> {
    let result: Result<_, OAuthError> = async {
        let token = authorization_token(&headers)?;
        Ok(state.oauth.delete_authorization(&token).await?)
    }
    .await;

    record("delete_authorization", result)?;
    Ok(no_content())
}
