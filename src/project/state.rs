//! Form page stages
//!
//! A form page is always in exactly one stage. The service drives a
//! page from its initial stage through `PageAction`s; handlers render
//! whatever stage it ends in.

use serde::Serialize;
use thiserror::Error;

use super::model::{Access, Parameters, ProjectData, ProjectSummary};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum PageState {
    /// The path names no repository and project
    InvalidPath,
    /// No signed-in user
    Unauthenticated { parameters: Parameters },
    /// Waiting on GitHub
    Loading { parameters: Parameters },
    /// Signed in, but missing repository or project write access
    AccessError {
        parameters: Parameters,
        access: Access,
        #[serde(skip_serializing_if = "Option::is_none")]
        project: Option<ProjectSummary>,
    },
    /// GitHub failed in a way the user cannot fix
    RequestError {
        parameters: Parameters,
        message: String,
    },
    /// Form can be rendered
    ProjectDataLoaded {
        parameters: Parameters,
        project: ProjectData,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    Loading,
    Unauthenticated,
    AccessError {
        access: Access,
        project: Option<ProjectSummary>,
    },
    RequestError {
        message: String,
    },
    ProjectDataLoaded {
        project: ProjectData,
    },
}

impl PageAction {
    pub fn name(&self) -> &'static str {
        match self {
            PageAction::Loading => "loading",
            PageAction::Unauthenticated => "unauthenticated",
            PageAction::AccessError { .. } => "accessError",
            PageAction::RequestError { .. } => "requestError",
            PageAction::ProjectDataLoaded { .. } => "projectDataLoaded",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("cannot apply {action} to a page without valid parameters")]
pub struct InvalidTransition {
    pub action: &'static str,
}

impl PageState {
    /// Stage before anything is known about the user
    pub fn initial(parameters: Option<Parameters>) -> Self {
        match parameters {
            Some(parameters) => PageState::Unauthenticated { parameters },
            None => PageState::InvalidPath,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PageState::InvalidPath => "invalidPath",
            PageState::Unauthenticated { .. } => "unauthenticated",
            PageState::Loading { .. } => "loading",
            PageState::AccessError { .. } => "accessError",
            PageState::RequestError { .. } => "requestError",
            PageState::ProjectDataLoaded { .. } => "projectDataLoaded",
        }
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        match self {
            PageState::InvalidPath => None,
            PageState::Unauthenticated { parameters }
            | PageState::Loading { parameters }
            | PageState::AccessError { parameters, .. }
            | PageState::RequestError { parameters, .. }
            | PageState::ProjectDataLoaded { parameters, .. } => Some(parameters),
        }
    }

    /// Apply an action; every stage with parameters accepts every action
    pub fn transition(self, action: PageAction) -> Result<Self, InvalidTransition> {
        let from = self.name();
        let Some(parameters) = self.parameters().cloned() else {
            return Err(InvalidTransition {
                action: action.name(),
            });
        };

        let next = match action {
            PageAction::Loading => PageState::Loading { parameters },
            PageAction::Unauthenticated => PageState::Unauthenticated { parameters },
            PageAction::AccessError { access, project } => PageState::AccessError {
                parameters,
                access,
                project,
            },
            PageAction::RequestError { message } => PageState::RequestError {
                parameters,
                message,
            },
            PageAction::ProjectDataLoaded { project } => PageState::ProjectDataLoaded {
                parameters,
                project,
            },
        };

        tracing::debug!(from, to = next.name(), "Page transition");
        Ok(next)
    }
}
