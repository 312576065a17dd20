//! Browser sign-in with GitHub
//!
//! GitHub sends the user back to the form page itself with `?code=&state=`;
//! the form handler hands those to [`complete_login`].

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;

use super::middleware::MaybeUser;
use super::session::{Session, create_session_token};
use super::{OAUTH_STATE_COOKIE, SESSION_COOKIE};
use crate::AppState;
use crate::error::AppError;
use crate::github::AuthorizationUrlOptions;
use crate::github::oauth::generate_state;

pub(crate) const MISSING_CREDENTIALS: &str = "GITHUB_CLIENT_ID / GITHUB_CLIENT_SECRET not configured";

/// Create authentication router
///
/// Routes:
/// - GET /auth/github - Redirect to GitHub
/// - POST /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/github", get(github_redirect))
        .route("/logout", post(logout))
}

#[derive(Debug, Default, Deserialize)]
struct ReturnTo {
    return_to: Option<String>,
}

/// Local absolute path, or `None` for anything that could leave the site
///
/// Browsers drop tabs and newlines while parsing a `Location`, so
/// `/\t/host` would become `//host`.
fn local_path(path: Option<&str>) -> Option<&str> {
    path.filter(|path| {
        path.starts_with('/')
            && !path.starts_with("//")
            && !path
                .chars()
                .any(|c| c == '\\' || c.is_ascii_control() || c.is_whitespace())
    })
}

fn build_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie
}

// =============================================================================
// GitHub OAuth
// =============================================================================

/// GET /auth/github
///
/// Redirects the user to GitHub's authorization page. GitHub returns to
/// `return_to` on this site, which defaults to the demo form.
async fn github_redirect(
    State(state): State<AppState>,
    Query(query): Query<ReturnTo>,
    jar: CookieJar,
) -> Response {
    if !state.config.github.has_credentials() {
        return (StatusCode::INTERNAL_SERVER_ERROR, MISSING_CREDENTIALS).into_response();
    }

    let return_to = local_path(query.return_to.as_deref())
        .unwrap_or(&state.config.forms.demo_path)
        .to_string();
    let csrf_state = generate_state();

    let authorization = state.oauth.web_flow_authorization_url(AuthorizationUrlOptions {
        redirect_url: Some(format!("{}{}", state.config.server.base_url(), return_to)),
        state: Some(csrf_state.clone()),
        ..Default::default()
    });

    tracing::debug!(%return_to, "Redirecting to GitHub authorization");

    let secure = state.config.should_use_secure_cookies();
    let jar = jar.add(build_cookie(OAUTH_STATE_COOKIE, csrf_state, secure));
    (jar, Redirect::to(&authorization.url)).into_response()
}

/// Query GitHub appends when returning to a form page
#[derive(Debug, Default, Deserialize)]
pub struct LoginCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl LoginCallback {
    pub fn is_present(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }

    /// GitHub's reason for not signing the user in, e.g. a denied consent
    pub fn failure(&self) -> Option<String> {
        let error = self.error.as_deref()?;
        Some(match self.error_description.as_deref() {
            Some(description) if !description.is_empty() => format!("{error} {description}"),
            _ => error.to_string(),
        })
    }
}

/// Finish sign-in on the page GitHub returned to
///
/// # Steps
/// 1. Verify CSRF state against the cookie
/// 2. Exchange code for access token
/// 3. Fetch the GitHub user
/// 4. Create session and set cookie
/// 5. Redirect to the same page without the OAuth parameters
pub async fn complete_login(
    state: &AppState,
    jar: CookieJar,
    path: &str,
    raw_query: Option<&str>,
    callback: LoginCallback,
) -> Result<(CookieJar, Redirect), AppError> {
    let code = callback
        .code
        .ok_or_else(|| AppError::Validation("\"code\" parameter is required".to_string()))?;

    let expected = jar.get(OAUTH_STATE_COOKIE).map(|cookie| cookie.value());
    if expected.is_none() || expected != callback.state.as_deref() {
        tracing::warn!(path, "OAuth state mismatch");
        return Err(AppError::Unauthorized);
    }

    let redirect_url = format!("{}{}", state.config.server.base_url(), path);
    let result = state
        .oauth
        .exchange_web_flow_code(&code, Some(&redirect_url))
        .await?;
    let token = result.authentication.token;

    let user = state.github.get_user(&token).await?;
    tracing::info!(login = %user.login, "User signed in");

    let session = Session::new(user, token, state.config.auth.session_max_age);
    let session_token = create_session_token(&session, &state.config.auth.session_secret)?;

    let secure = state.config.should_use_secure_cookies();
    let jar = jar
        .add(build_cookie(SESSION_COOKIE, session_token, secure))
        .remove(removal_cookie(OAUTH_STATE_COOKIE));

    Ok((jar, Redirect::to(&without_oauth_params(path, raw_query))))
}

/// Path with `code`, `state` and error parameters removed from its query
fn without_oauth_params(path: &str, raw_query: Option<&str>) -> String {
    let kept: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.unwrap_or_default().as_bytes())
        .filter(|(key, _)| !matches!(key.as_ref(), "code" | "state" | "error" | "error_description" | "error_uri"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        return path.to_string();
    }

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(kept)
        .finish();
    format!("{path}?{query}")
}

// =============================================================================
// Logout
// =============================================================================

/// POST /logout
///
/// Clears session cookies and the user's cached projects.
async fn logout(
    State(state): State<AppState>,
    MaybeUser(session): MaybeUser,
    Query(query): Query<ReturnTo>,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(session) = session {
        state.forms.forget_user(session.github_id).await;
        tracing::info!(login = %session.github_login, "User signed out");
    }

    let jar = jar
        .remove(removal_cookie(SESSION_COOKIE))
        .remove(removal_cookie(OAUTH_STATE_COOKIE));
    let location = local_path(query.return_to.as_deref()).unwrap_or("/");

    (jar, Redirect::to(location))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_paths_are_accepted() {
        assert_eq!(local_path(Some("/a/b")), Some("/a/b"));
        assert_eq!(local_path(Some("//evil.example")), None);
        assert_eq!(local_path(Some("https://evil.example")), None);
        assert_eq!(local_path(Some("/\\evil.example")), None);
        assert_eq!(local_path(Some("/\t/evil.example")), None);
        assert_eq!(local_path(Some("/\n/evil.example")), None);
        assert_eq!(local_path(Some("/\r\n/evil.example")), None);
        assert_eq!(local_path(Some("/ /evil.example")), None);
        assert_eq!(local_path(Some("/a%09b")), Some("/a%09b"));
        assert_eq!(local_path(None), None);
    }

    #[test]
    fn strips_oauth_parameters() {
        assert_eq!(
            without_oauth_params("/o/r/projects/1/issues/new", Some("code=abc&state=xyz")),
            "/o/r/projects/1/issues/new"
        );
        assert_eq!(
            without_oauth_params("/o/r/projects/1/issues/new", Some("code=abc&title=Bug+report")),
            "/o/r/projects/1/issues/new?title=Bug+report"
        );
        assert_eq!(without_oauth_params("/", None), "/");
    }

    #[test]
    fn callback_presence() {
        assert!(!LoginCallback::default().is_present());
        assert!(
            LoginCallback {
                code: Some("abc".into()),
                ..Default::default()
            }
            .is_present()
        );
    }

    #[test]
    fn callback_failure_joins_description() {
        let denied = LoginCallback {
            error: Some("access_denied".into()),
            error_description: Some("The user has denied your application access.".into()),
            ..Default::default()
        };
        assert_eq!(
            denied.failure().as_deref(),
            Some("access_denied The user has denied your application access.")
        );

        let bare = LoginCallback {
            error: Some("access_denied".into()),
            ..Default::default()
        };
        assert_eq!(bare.failure().as_deref(), Some("access_denied"));
        assert_eq!(LoginCallback::default().failure(), None);
    }
}
