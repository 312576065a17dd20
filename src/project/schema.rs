//! Project fields to form controls, and submitted forms back to field values

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::model::{FieldOption, FieldType, ProjectData, ProjectField};
use crate::github::graphql::{FieldNode, IterationNode};
use crate::github::{FieldUpdate, NewIssue, ProjectV2FieldValue, ProjectV2Node};

pub const TITLE_FIELD: &str = "title";
pub const BODY_FIELD: &str = "body";

// =============================================================================
// GraphQL response -> ProjectData
// =============================================================================

/// Keep the fields a form can fill, in project order
pub fn project_from_response(node: ProjectV2Node) -> ProjectData {
    let fields = node
        .fields
        .nodes
        .into_iter()
        .filter_map(field_from_node)
        .collect();

    ProjectData {
        id: node.id,
        title: node.title,
        url: node.url,
        fields,
    }
}

fn field_from_node(node: FieldNode) -> Option<ProjectField> {
    let field_type = FieldType::from_data_type(node.data_type.as_deref()?)?;
    let id = node.id?;
    let name = node.name?;

    let options = match (node.options, node.configuration) {
        (Some(options), _) => Some(
            options
                .into_iter()
                .map(|option| FieldOption {
                    id: option.id,
                    name: option.name,
                    human_name: None,
                })
                .collect(),
        ),
        (None, Some(configuration)) => Some(
            configuration
                .iterations
                .iter()
                .chain(configuration.completed_iterations.iter())
                .map(iteration_option)
                .collect(),
        ),
        (None, None) => None,
    };

    Some(ProjectField {
        id,
        name,
        field_type,
        options,
    })
}

/// Iterations are submitted by ID and shown with their date range
fn iteration_option(iteration: &IterationNode) -> FieldOption {
    FieldOption {
        id: iteration.id.clone(),
        name: iteration.id.clone(),
        human_name: Some(format!(
            "{} ({} days from {})",
            iteration.title, iteration.duration, iteration.start_date
        )),
    }
}

// =============================================================================
// ProjectData -> FormSchema
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "control", rename_all = "camelCase")]
pub enum ControlKind {
    Input {
        #[serde(rename = "inputType")]
        input_type: &'static str,
    },
    Textarea,
    Select {
        options: Vec<SelectOption>,
    },
}

/// One form control
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormControl {
    /// Form field name, also the submitted key
    pub name: String,
    pub label: String,
    pub required: bool,
    #[serde(flatten)]
    pub kind: ControlKind,
}

/// Controls for a project: issue title, one per field, issue body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSchema {
    pub title: String,
    pub url: String,
    pub controls: Vec<FormControl>,
}

impl FormSchema {
    pub fn from_project(project: &ProjectData) -> Self {
        let mut controls = Vec::with_capacity(project.fields.len() + 2);

        controls.push(FormControl {
            name: TITLE_FIELD.to_string(),
            label: "Issue title".to_string(),
            required: true,
            kind: ControlKind::Input { input_type: "text" },
        });

        controls.extend(project.fields.iter().map(control_for_field));

        controls.push(FormControl {
            name: BODY_FIELD.to_string(),
            label: "Issue description".to_string(),
            required: false,
            kind: ControlKind::Textarea,
        });

        Self {
            title: project.title.clone(),
            url: project.url.clone(),
            controls,
        }
    }
}

fn control_for_field(field: &ProjectField) -> FormControl {
    let kind = match &field.options {
        Some(options) => ControlKind::Select {
            options: options
                .iter()
                .map(|option| SelectOption {
                    value: option.name.clone(),
                    label: option.label().to_string(),
                })
                .collect(),
        },
        None => ControlKind::Input {
            input_type: field.field_type.input_type(),
        },
    };

    FormControl {
        name: field.name.clone(),
        label: field.name.clone(),
        required: false,
        kind,
    }
}

// =============================================================================
// Submitted form -> issue + field updates
// =============================================================================

/// Per-control validation messages, keyed by control name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormErrors(pub BTreeMap<String, String>);

impl FormErrors {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self
            .0
            .iter()
            .map(|(name, message)| format!("{name}: {message}"))
            .collect();
        f.write_str(&messages.join("; "))
    }
}

/// Validated form submission
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    pub issue: NewIssue,
    pub updates: Vec<FieldUpdate>,
}

impl FormSubmission {
    /// Validate submitted values against the project's fields
    ///
    /// Empty values leave a field unset; keys that match no field are ignored.
    pub fn parse(project: &ProjectData, values: &HashMap<String, String>) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();

        let title = values
            .get(TITLE_FIELD)
            .map(|title| title.trim())
            .unwrap_or_default();
        if title.is_empty() {
            errors
                .0
                .insert(TITLE_FIELD.to_string(), "Issue title is required".to_string());
        }
        let body = values.get(BODY_FIELD).cloned().unwrap_or_default();

        let mut updates = Vec::new();
        for field in &project.fields {
            let Some(raw) = values.get(&field.name) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }

            match field_value(field, raw) {
                Ok(value) => updates.push(FieldUpdate {
                    field_id: field.id.clone(),
                    value,
                }),
                Err(message) => {
                    errors.0.insert(field.name.clone(), message);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            issue: NewIssue {
                title: title.to_string(),
                body,
            },
            updates,
        })
    }
}

/// Text is sent exactly as typed; every other type is matched trimmed
fn field_value(field: &ProjectField, raw: &str) -> Result<ProjectV2FieldValue, String> {
    let trimmed = raw.trim();
    match field.field_type {
        FieldType::Text => Ok(ProjectV2FieldValue::Text(raw.to_string())),
        FieldType::Number => trimmed
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(ProjectV2FieldValue::Number)
            .ok_or_else(|| format!("\"{trimmed}\" is not a number")),
        FieldType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(ProjectV2FieldValue::Date)
            .map_err(|_| format!("\"{trimmed}\" is not a date (YYYY-MM-DD)")),
        FieldType::SingleSelect => find_option(field, trimmed)
            .map(|option| ProjectV2FieldValue::SingleSelectOptionId(option.id.clone())),
        FieldType::Iteration => find_option(field, trimmed)
            .map(|option| ProjectV2FieldValue::IterationId(option.id.clone())),
    }
}

fn find_option<'a>(field: &'a ProjectField, raw: &str) -> Result<&'a FieldOption, String> {
    field
        .options
        .iter()
        .flatten()
        .find(|option| option.name == raw)
        .ok_or_else(|| format!("\"{raw}\" is not an option of {}", field.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project_node() -> ProjectV2Node {
        serde_json::from_value(json!({
            "id": "PVT_1",
            "title": "Roadmap",
            "url": "https://github.com/orgs/project-forms/projects/1",
            "fields": {
                "nodes": [
                    { "id": "F_title", "dataType": "TITLE", "name": "Title" },
                    { "id": "F_notes", "dataType": "TEXT", "name": "Notes" },
                    { "id": "F_points", "dataType": "NUMBER", "name": "Points" },
                    { "id": "F_due", "dataType": "DATE", "name": "Due" },
                    {
                        "id": "F_status", "dataType": "SINGLE_SELECT", "name": "Status",
                        "options": [
                            { "id": "O_todo", "name": "Todo" },
                            { "id": "O_done", "name": "Done" }
                        ]
                    },
                    {
                        "id": "F_sprint", "dataType": "ITERATION", "name": "Sprint",
                        "configuration": {
                            "iterations": [
                                { "id": "I_2", "title": "Sprint 2", "duration": 14, "startDate": "2024-01-15" }
                            ],
                            "completedIterations": [
                                { "id": "I_1", "title": "Sprint 1", "duration": 14, "startDate": "2024-01-01" }
                            ],
                            "duration": 14,
                            "startDay": 1
                        }
                    },
                    { "id": "F_labels", "dataType": "LABELS", "name": "Labels" },
                    {}
                ]
            }
        }))
        .unwrap()
    }

    fn project() -> ProjectData {
        project_from_response(project_node())
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn keeps_supported_fields_in_order() {
        let project = project();
        let names: Vec<&str> = project.fields.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(project.id, "PVT_1");
        assert_eq!(names, ["Notes", "Points", "Due", "Status", "Sprint"]);
        assert!(project.fields[0].options.is_none());
    }

    #[test]
    fn iteration_options_list_active_then_completed() {
        let project = project();
        let sprint = project.fields.iter().find(|f| f.name == "Sprint").unwrap();
        let options = sprint.options.as_ref().unwrap();

        assert_eq!(
            options,
            &vec![
                FieldOption {
                    id: "I_2".into(),
                    name: "I_2".into(),
                    human_name: Some("Sprint 2 (14 days from 2024-01-15)".into()),
                },
                FieldOption {
                    id: "I_1".into(),
                    name: "I_1".into(),
                    human_name: Some("Sprint 1 (14 days from 2024-01-01)".into()),
                },
            ]
        );
    }

    #[test]
    fn schema_wraps_fields_with_title_and_body() {
        let schema = FormSchema::from_project(&project());
        let names: Vec<&str> = schema.controls.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(
            names,
            ["title", "Notes", "Points", "Due", "Status", "Sprint", "body"]
        );
        assert!(schema.controls[0].required);
        assert_eq!(schema.controls[2].kind, ControlKind::Input { input_type: "number" });
        assert_eq!(schema.controls[3].kind, ControlKind::Input { input_type: "date" });
        assert_eq!(schema.controls[6].kind, ControlKind::Textarea);
        assert_eq!(
            schema.controls[5].kind,
            ControlKind::Select {
                options: vec![
                    SelectOption {
                        value: "I_2".into(),
                        label: "Sprint 2 (14 days from 2024-01-15)".into()
                    },
                    SelectOption {
                        value: "I_1".into(),
                        label: "Sprint 1 (14 days from 2024-01-01)".into()
                    },
                ]
            }
        );
    }

    #[test]
    fn schema_serializes_control_kind_inline() {
        let schema = FormSchema::from_project(&project());
        let value = serde_json::to_value(&schema).unwrap();

        assert_eq!(
            value["controls"][1],
            json!({ "name": "Notes", "label": "Notes", "required": false, "control": "input", "inputType": "text" })
        );
        assert_eq!(value["controls"][4]["control"], "select");
        assert_eq!(value["controls"][4]["options"][0], json!({ "value": "Todo", "label": "Todo" }));
    }

    #[test]
    fn parses_every_field_type() {
        let submission = FormSubmission::parse(
            &project(),
            &values(&[
                ("title", "  Broken login  "),
                ("body", "Steps to reproduce"),
                ("Notes", "see logs"),
                ("Points", "3"),
                ("Due", "2024-03-01"),
                ("Status", "Done"),
                ("Sprint", "I_1"),
                ("Unknown", "ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(
            submission.issue,
            NewIssue {
                title: "Broken login".into(),
                body: "Steps to reproduce".into()
            }
        );
        assert_eq!(
            submission.updates,
            vec![
                FieldUpdate {
                    field_id: "F_notes".into(),
                    value: ProjectV2FieldValue::Text("see logs".into())
                },
                FieldUpdate {
                    field_id: "F_points".into(),
                    value: ProjectV2FieldValue::Number(3.0)
                },
                FieldUpdate {
                    field_id: "F_due".into(),
                    value: ProjectV2FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
                },
                FieldUpdate {
                    field_id: "F_status".into(),
                    value: ProjectV2FieldValue::SingleSelectOptionId("O_done".into())
                },
                FieldUpdate {
                    field_id: "F_sprint".into(),
                    value: ProjectV2FieldValue::IterationId("I_1".into())
                },
            ]
        );
    }

    #[test]
    fn empty_values_leave_fields_unset() {
        let submission = FormSubmission::parse(
            &project(),
            &values(&[("title", "Only a title"), ("Points", ""), ("Status", "  ")]),
        )
        .unwrap();

        assert!(submission.updates.is_empty());
        assert_eq!(submission.issue.body, "");
    }

    #[test]
    fn text_values_keep_surrounding_whitespace() {
        let submission = FormSubmission::parse(
            &project(),
            &values(&[("title", "t"), ("Notes", "  indented\n"), ("Points", " 5 ")]),
        )
        .unwrap();

        assert_eq!(
            submission.updates,
            vec![
                FieldUpdate {
                    field_id: "F_notes".into(),
                    value: ProjectV2FieldValue::Text("  indented\n".into())
                },
                FieldUpdate {
                    field_id: "F_points".into(),
                    value: ProjectV2FieldValue::Number(5.0)
                },
            ]
        );
    }

    #[test]
    fn collects_all_validation_errors() {
        let errors = FormSubmission::parse(
            &project(),
            &values(&[
                ("title", " "),
                ("Points", "three"),
                ("Due", "01/03/2024"),
                ("Status", "Blocked"),
            ]),
        )
        .unwrap_err();

        assert_eq!(errors.get("title"), Some("Issue title is required"));
        assert_eq!(errors.get("Points"), Some("\"three\" is not a number"));
        assert_eq!(
            errors.get("Due"),
            Some("\"01/03/2024\" is not a date (YYYY-MM-DD)")
        );
        assert_eq!(
            errors.get("Status"),
            Some("\"Blocked\" is not an option of Status")
        );
        assert!(errors.get("Sprint").is_none());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let errors =
            FormSubmission::parse(&project(), &values(&[("title", "t"), ("Points", "inf")]))
                .unwrap_err();
        assert!(errors.get("Points").is_some());
    }
}
