//! Project form domain types

use serde::{Deserialize, Serialize};

use crate::github::VerifyAccessData;

/// Target of a form: repository for the issue, project for the item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    pub owner: String,
    pub repo: String,
    pub project_number: u64,
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl Parameters {
    /// Validate raw path segments
    ///
    /// Owner and repository accept ASCII letters, digits and `-`;
    /// the project number must be decimal digits only.
    pub fn new(owner: &str, repo: &str, project_number: &str) -> Option<Self> {
        if !is_valid_segment(owner) || !is_valid_segment(repo) {
            return None;
        }
        if project_number.is_empty() || !project_number.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            project_number: project_number.parse().ok()?,
        })
    }

    /// Parse `/{owner}/{repo}/projects/{number}/issues/new`
    pub fn from_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [owner, repo, projects, number, issues, new]
                if projects.eq_ignore_ascii_case("projects")
                    && issues.eq_ignore_ascii_case("issues")
                    && new.eq_ignore_ascii_case("new") =>
            {
                Self::new(owner, repo, number)
            }
            _ => None,
        }
    }

    /// Path of the form page for these parameters
    pub fn form_path(&self) -> String {
        format!(
            "/{}/{}/projects/{}/issues/new",
            self.owner, self.repo, self.project_number
        )
    }

    pub fn owner_url(&self, web_url: &str) -> String {
        format!("{}/{}", web_url.trim_end_matches('/'), self.owner)
    }

    pub fn repository_url(&self, web_url: &str) -> String {
        format!(
            "{}/{}/{}",
            web_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

/// Field data types a form can collect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text,
    Number,
    Date,
    SingleSelect,
    Iteration,
}

impl FieldType {
    /// Map a GitHub `ProjectV2FieldType`; `None` for unsupported types
    /// (title, assignees, labels, milestone, ...)
    pub fn from_data_type(data_type: &str) -> Option<Self> {
        match data_type.to_ascii_uppercase().as_str() {
            "TEXT" => Some(FieldType::Text),
            "NUMBER" => Some(FieldType::Number),
            "DATE" => Some(FieldType::Date),
            "SINGLE_SELECT" => Some(FieldType::SingleSelect),
            "ITERATION" => Some(FieldType::Iteration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Number => "NUMBER",
            FieldType::Date => "DATE",
            FieldType::SingleSelect => "SINGLE_SELECT",
            FieldType::Iteration => "ITERATION",
        }
    }

    /// HTML input type for fields without options
    pub fn input_type(&self) -> &'static str {
        match self {
            FieldType::Number => "number",
            FieldType::Date => "date",
            _ => "text",
        }
    }
}

/// Selectable value of a single-select or iteration field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOption {
    pub id: String,
    /// Submitted value
    pub name: String,
    /// Label shown instead of `name` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_name: Option<String>,
}

impl FieldOption {
    pub fn label(&self) -> &str {
        self.human_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
}

/// Project with the fields a form can fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub id: String,
    pub title: String,
    pub url: String,
    pub fields: Vec<ProjectField>,
}

/// Title and URL of a project the user can at least see
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub title: String,
    pub url: String,
}

/// Outcome of access verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    pub has_repo_access: bool,
    pub has_project_read_access: bool,
    pub has_project_write_access: bool,
}

impl Access {
    pub fn from_verification(data: &VerifyAccessData) -> Self {
        let project = data.project();
        Self {
            has_repo_access: data.repository.is_some(),
            has_project_read_access: project.is_some(),
            has_project_write_access: project.is_some_and(|p| p.viewer_can_update),
        }
    }

    /// Issues need the repository; items need project write access
    pub fn is_sufficient(&self) -> bool {
        self.has_repo_access && self.has_project_write_access
    }
}
