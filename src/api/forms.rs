//! Issue form pages
//!
//! Routes:
//! - GET  / - redirect to the demo form
//! - GET  /:owner/:repo/projects/:number/issues/new - form page
//! - POST /:owner/:repo/projects/:number/issues/new - submit
//! - GET  /api/forms/:owner/:repo/projects/:number - page stage as JSON
//! - fallback - "Invalid URL" page

use axum::{
    Form, Json, Router,
    extract::{OriginalUri, Path, Query, RawQuery, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use std::collections::HashMap;

use super::views::{self, PageContext};
use crate::AppState;
use crate::auth::{CurrentUser, LoginCallback, MaybeUser, Session, complete_login, require_auth};
use crate::error::AppError;
use crate::github::GitHubError;
use crate::project::{FormSchema, PageState, Parameters, SubmitError};

/// Create form pages router
pub fn forms_router(state: AppState) -> Router<AppState> {
    let api = Router::new()
        .route(
            "/api/forms/:owner/:repo/projects/:number",
            get(form_state),
        )
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/", get(index))
        .route(
            "/:owner/:repo/projects/:number/issues/new",
            get(form_page).post(submit_form),
        )
        .merge(api)
}

/// HTTP status a page stage is served with
pub fn status_for(state: &PageState) -> StatusCode {
    match state {
        PageState::InvalidPath => StatusCode::NOT_FOUND,
        PageState::Unauthenticated { .. } | PageState::Loading { .. } => StatusCode::OK,
        PageState::AccessError { .. } => StatusCode::FORBIDDEN,
        PageState::RequestError { .. } => StatusCode::BAD_GATEWAY,
        PageState::ProjectDataLoaded { .. } => StatusCode::OK,
    }
}

fn context<'a>(state: &'a AppState, session: Option<&'a Session>, path: &'a str) -> PageContext<'a> {
    PageContext {
        session,
        path,
        web_url: &state.config.github.web_url,
        demo_path: &state.config.forms.demo_path,
    }
}

fn page(status: StatusCode, html: String) -> Response {
    (status, Html(html)).into_response()
}

/// GET /
async fn index(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.config.forms.demo_path)
}

/// GET /:owner/:repo/projects/:number/issues/new
///
/// Also the landing page of GitHub sign-in: `?code=&state=` completes
/// the login before the page is shown.
async fn form_page(
    State(state): State<AppState>,
    Path((owner, repo, number)): Path<(String, String, String)>,
    OriginalUri(uri): OriginalUri,
    RawQuery(raw_query): RawQuery,
    Query(callback): Query<LoginCallback>,
    MaybeUser(session): MaybeUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let path = uri.path();

    if let Some(message) = callback.failure() {
        tracing::info!(path, %message, "GitHub returned without signing in");
        let context = context(&state, session.as_ref(), path);
        return Ok(match Parameters::new(&owner, &repo, &number) {
            Some(parameters) => page(
                StatusCode::BAD_REQUEST,
                views::sign_in_failed(&context, &parameters, &message),
            ),
            None => page(
                StatusCode::NOT_FOUND,
                views::render_state(&context, &PageState::InvalidPath, None, None),
            ),
        });
    }

    if callback.is_present() {
        let (jar, redirect) =
            complete_login(&state, jar, path, raw_query.as_deref(), callback).await?;
        return Ok((jar, redirect).into_response());
    }

    let parameters = Parameters::new(&owner, &repo, &number);
    let page_state = state.forms.resolve(session.as_ref(), parameters).await;

    let html = views::render_state(
        &context(&state, session.as_ref(), path),
        &page_state,
        None,
        None,
    );
    Ok(page(status_for(&page_state), html))
}

/// POST /:owner/:repo/projects/:number/issues/new
async fn submit_form(
    State(state): State<AppState>,
    Path((owner, repo, number)): Path<(String, String, String)>,
    OriginalUri(uri): OriginalUri,
    MaybeUser(session): MaybeUser,
    Form(values): Form<HashMap<String, String>>,
) -> Response {
    let path = uri.path();
    let context = context(&state, session.as_ref(), path);

    let Some(parameters) = Parameters::new(&owner, &repo, &number) else {
        return page(
            StatusCode::NOT_FOUND,
            views::render_state(&context, &PageState::InvalidPath, None, None),
        );
    };
    let Some(session) = session.as_ref() else {
        let page_state = PageState::initial(Some(parameters));
        return page(
            StatusCode::UNAUTHORIZED,
            views::render_state(&context, &page_state, None, None),
        );
    };

    match state.forms.submit(session, &parameters, &values).await {
        Ok(issue) => page(StatusCode::CREATED, views::submitted(&context, &issue)),
        Err(SubmitError::NotLoaded(page_state)) => {
            let status = match page_state {
                PageState::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
                ref other => status_for(other),
            };
            page(status, views::render_state(&context, &page_state, None, None))
        }
        Err(SubmitError::Invalid { project, errors }) => {
            let page_state = PageState::ProjectDataLoaded {
                parameters,
                project: project.as_ref().clone(),
            };
            page(
                StatusCode::UNPROCESSABLE_ENTITY,
                views::render_state(&context, &page_state, Some(&values), Some(&errors)),
            )
        }
        Err(SubmitError::GitHub(GitHubError::Unauthorized)) => page(
            StatusCode::UNAUTHORIZED,
            views::render_state(&context, &PageState::initial(Some(parameters)), None, None),
        ),
        Err(SubmitError::GitHub(error)) => {
            let page_state = PageState::RequestError {
                parameters,
                message: error.to_string(),
            };
            page(
                StatusCode::BAD_GATEWAY,
                views::render_state(&context, &page_state, Some(&values), None),
            )
        }
        Err(SubmitError::Incomplete { issue, source }) => page(
            StatusCode::BAD_GATEWAY,
            views::incomplete(&context, &issue, &source.to_string()),
        ),
    }
}

#[derive(Debug, Serialize)]
struct FormStateResponse {
    state: PageState,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<FormSchema>,
}

/// GET /api/forms/:owner/:repo/projects/:number
async fn form_state(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((owner, repo, number)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    let parameters = Parameters::new(&owner, &repo, &number).ok_or(AppError::NotFound)?;
    let page_state = state.forms.resolve(Some(&session), Some(parameters)).await;

    let schema = match &page_state {
        PageState::ProjectDataLoaded { project, .. } => Some(FormSchema::from_project(project)),
        _ => None,
    };

    Ok((
        status_for(&page_state),
        Json(FormStateResponse {
            state: page_state,
            schema,
        }),
    )
        .into_response())
}

/// Any other path
///
/// Form paths with differently cased keywords redirect to the canonical path.
pub async fn invalid_url(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    MaybeUser(session): MaybeUser,
) -> Response {
    if let Some(parameters) = Parameters::from_path(uri.path()) {
        let location = match uri.query() {
            Some(query) => format!("{}?{}", parameters.form_path(), query),
            None => parameters.form_path(),
        };
        return Redirect::to(&location).into_response();
    }

    page(
        StatusCode::NOT_FOUND,
        views::render_state(
            &context(&state, session.as_ref(), uri.path()),
            &PageState::InvalidPath,
            None,
            None,
        ),
    )
}
