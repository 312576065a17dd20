//! Project form service
//!
//! Resolves a form page to its stage and turns submissions into an
//! issue plus a populated project item.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::model::{Access, Parameters, ProjectData, ProjectSummary};
use super::schema::{FormErrors, FormSubmission, project_from_response};
use super::state::{PageAction, PageState};
use super::store::ProjectStore;
use crate::auth::Session;
use crate::github::{GitHubApi, GitHubError};
use crate::metrics::{ISSUES_SUBMITTED_TOTAL, PAGE_STATES_TOTAL};

/// Issue created from a form
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedIssue {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The page did not reach `ProjectDataLoaded`
    #[error("project is not available ({})", .0.name())]
    NotLoaded(PageState),

    #[error("invalid form: {errors}")]
    Invalid {
        project: Arc<ProjectData>,
        errors: FormErrors,
    },

    /// Nothing was created
    #[error("issue could not be created: {0}")]
    GitHub(#[source] GitHubError),

    /// Issue exists but is missing from the project or its field values
    #[error("issue {} was created but could not be added to the project: {source}", .issue.url)]
    Incomplete {
        issue: SubmittedIssue,
        #[source]
        source: GitHubError,
    },
}

/// Apply an action, collapsing to `InvalidPath` when the stage has no parameters
fn advance(state: PageState, action: PageAction) -> PageState {
    state.transition(action).unwrap_or_else(|error| {
        tracing::warn!(%error, "Ignored page action");
        PageState::InvalidPath
    })
}

pub struct ProjectFormService {
    github: Arc<dyn GitHubApi>,
    store: ProjectStore,
}

impl ProjectFormService {
    pub fn new(github: Arc<dyn GitHubApi>, store: ProjectStore) -> Self {
        Self { github, store }
    }

    /// Stage of a form page for an optional path match and user
    pub async fn resolve(
        &self,
        session: Option<&Session>,
        parameters: Option<Parameters>,
    ) -> PageState {
        let state = match (session, parameters) {
            (Some(session), Some(parameters)) => self.load(session, &parameters).await,
            (None, parameters) => PageState::initial(parameters),
            (Some(_), None) => PageState::InvalidPath,
        };

        PAGE_STATES_TOTAL.with_label_values(&[state.name()]).inc();
        state
    }

    /// Load the project for a signed-in user
    ///
    /// Cached data is served without re-verifying access.
    pub async fn load(&self, session: &Session, parameters: &Parameters) -> PageState {
        let state = advance(PageState::initial(Some(parameters.clone())), PageAction::Loading);

        match self.project(session, parameters).await {
            Ok(project) => advance(
                state,
                PageAction::ProjectDataLoaded {
                    project: project.as_ref().clone(),
                },
            ),
            Err(action) => advance(state, action),
        }
    }

    /// Drop everything cached for a user
    pub async fn forget_user(&self, user_id: u64) {
        self.store.clear_user(user_id).await;
    }

    async fn project(
        &self,
        session: &Session,
        parameters: &Parameters,
    ) -> Result<Arc<ProjectData>, PageAction> {
        if let Some(project) = self.store.get(session.github_id, parameters).await {
            return Ok(project);
        }

        let token = session.access_token.as_str();
        let verification = match self
            .github
            .verify_access(
                token,
                &parameters.owner,
                &parameters.repo,
                parameters.project_number,
            )
            .await
        {
            Ok(verification) => verification,
            Err(error) => return Err(self.failure(session, error).await),
        };

        let access = Access::from_verification(&verification);
        if !access.is_sufficient() {
            tracing::info!(
                user = %session.github_login,
                owner = %parameters.owner,
                repo = %parameters.repo,
                project_number = parameters.project_number,
                ?access,
                "Insufficient access"
            );
            return Err(PageAction::AccessError {
                access,
                project: verification.project().map(|project| ProjectSummary {
                    title: project.title.clone(),
                    url: project.url.clone(),
                }),
            });
        }

        let node = match self
            .github
            .fetch_project(token, &parameters.owner, parameters.project_number)
            .await
        {
            Ok(node) => node,
            Err(error) => return Err(self.failure(session, error).await),
        };

        let project = project_from_response(node);
        tracing::debug!(
            project = %project.title,
            fields = project.fields.len(),
            "Project loaded"
        );

        Ok(self.store.set(session.github_id, parameters, project).await)
    }

    async fn failure(&self, session: &Session, error: GitHubError) -> PageAction {
        match error {
            GitHubError::Unauthorized => {
                tracing::info!(user = %session.github_login, "GitHub token rejected");
                self.store.clear_user(session.github_id).await;
                PageAction::Unauthenticated
            }
            error => {
                tracing::warn!(user = %session.github_login, %error, "Project request failed");
                PageAction::RequestError {
                    message: error.to_string(),
                }
            }
        }
    }

    /// Create an issue from a submitted form and add it to the project
    pub async fn submit(
        &self,
        session: &Session,
        parameters: &Parameters,
        values: &HashMap<String, String>,
    ) -> Result<SubmittedIssue, SubmitError> {
        let project = match self.project(session, parameters).await {
            Ok(project) => project,
            Err(action) => {
                let state = advance(PageState::initial(Some(parameters.clone())), action);
                return Err(SubmitError::NotLoaded(state));
            }
        };

        let submission = match FormSubmission::parse(&project, values) {
            Ok(submission) => submission,
            Err(errors) => {
                ISSUES_SUBMITTED_TOTAL.with_label_values(&["invalid"]).inc();
                return Err(SubmitError::Invalid { project, errors });
            }
        };

        let token = session.access_token.as_str();
        let created = match self
            .github
            .create_issue(token, &parameters.owner, &parameters.repo, &submission.issue)
            .await
        {
            Ok(created) => created,
            Err(error) => {
                ISSUES_SUBMITTED_TOTAL.with_label_values(&["failed"]).inc();
                if matches!(error, GitHubError::Unauthorized) {
                    self.store.clear_user(session.github_id).await;
                }
                return Err(SubmitError::GitHub(error));
            }
        };

        let issue = SubmittedIssue {
            number: created.number,
            url: created.html_url,
        };

        let added: Result<(), GitHubError> = async {
            let item_id = self
                .github
                .add_project_item(token, &project.id, &created.node_id)
                .await?;
            self.github
                .update_item_fields(token, &project.id, &item_id, &submission.updates)
                .await
        }
        .await;

        if let Err(source) = added {
            tracing::warn!(url = %issue.url, error = %source, "Issue created without project item");
            ISSUES_SUBMITTED_TOTAL.with_label_values(&["incomplete"]).inc();
            self.store.remove(session.github_id, parameters).await;
            return Err(SubmitError::Incomplete { issue, source });
        }

        ISSUES_SUBMITTED_TOTAL.with_label_values(&["created"]).inc();
        tracing::info!(
            user = %session.github_login,
            url = %issue.url,
            fields = submission.updates.len(),
            "Form submitted"
        );
        Ok(issue)
    }
}
