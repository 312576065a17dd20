//! GraphQL documents and wire types for GitHub Projects (v2)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const VERIFY_ACCESS_QUERY: &str = r#"
query verifyAccess($owner: String!, $repo: String!, $projectNumber: Int!) {
  repository(owner: $owner, name: $repo) {
    id
  }
  owner: repositoryOwner(login: $owner) {
    ... on ProjectV2Owner {
      project: projectV2(number: $projectNumber) {
        title
        url
        viewerCanUpdate
      }
    }
  }
}
"#;

pub const GET_PROJECT_WITH_FIELDS_QUERY: &str = r#"
query getProjectWithItems($owner: String!, $number: Int!) {
  userOrOrganization: repositoryOwner(login: $owner) {
    ... on ProjectV2Owner {
      projectV2(number: $number) {
        id
        title
        url
        fields(first: 50) {
          nodes {
            ... on ProjectV2FieldCommon {
              id
              dataType
              name
            }
            ... on ProjectV2SingleSelectField {
              options {
                id
                name
              }
            }
            ... on ProjectV2IterationField {
              configuration {
                iterations {
                  id
                  title
                  duration
                  startDate
                }
                completedIterations {
                  id
                  title
                  duration
                  startDate
                }
                duration
                startDay
              }
            }
          }
        }
      }
    }
  }
}
"#;

pub const ADD_PROJECT_ITEM_MUTATION: &str = r#"
mutation addIssueToProject($projectId: ID!, $contentId: ID!) {
  addProjectV2ItemById(input: { projectId: $projectId, contentId: $contentId }) {
    item {
      id
    }
  }
}
"#;

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error entry
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl<T> GraphQLResponse<T> {
    /// Data, or the error messages when the response carries any errors
    pub fn into_data(self) -> Result<T, super::GitHubError> {
        match (self.data, self.errors) {
            (_, Some(errors)) if !errors.is_empty() => Err(super::GitHubError::GraphQL(
                errors.into_iter().map(|e| e.message).collect(),
            )),
            (Some(data), _) => Ok(data),
            (None, _) => Err(super::GitHubError::Decode(
                "GraphQL response has neither data nor errors".to_string(),
            )),
        }
    }

    /// Data even when errors are present; errors only when there is no data
    pub fn into_partial_data(self) -> Result<T, super::GitHubError> {
        match self.data {
            Some(data) => {
                if let Some(errors) = self.errors.filter(|errors| !errors.is_empty()) {
                    tracing::debug!(
                        errors = ?errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
                        "Using partial GraphQL data"
                    );
                }
                Ok(data)
            }
            None => GraphQLResponse::<T> {
                data: None,
                errors: self.errors,
            }
            .into_data(),
        }
    }
}

// =============================================================================
// verifyAccess
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VerifyAccessData {
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub owner: Option<ProjectAccessOwner>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepositoryRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectAccessOwner {
    #[serde(default)]
    pub project: Option<ProjectAccessNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAccessNode {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub viewer_can_update: bool,
}

impl VerifyAccessData {
    pub fn project(&self) -> Option<&ProjectAccessNode> {
        self.owner.as_ref().and_then(|owner| owner.project.as_ref())
    }
}

// =============================================================================
// getProjectWithItems
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectQueryData {
    #[serde(default)]
    pub user_or_organization: Option<ProjectOwnerNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectOwnerNode {
    #[serde(default)]
    pub project_v2: Option<ProjectV2Node>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectV2Node {
    pub id: String,
    pub title: String,
    pub url: String,
    pub fields: FieldConnection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldConnection {
    #[serde(default)]
    pub nodes: Vec<FieldNode>,
}

/// One entry of `fields.nodes`
///
/// Fields outside the queried fragments come back as empty objects,
/// so everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<SingleSelectOptionNode>>,
    #[serde(default)]
    pub configuration: Option<IterationConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SingleSelectOptionNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationConfiguration {
    #[serde(default)]
    pub iterations: Vec<IterationNode>,
    #[serde(default)]
    pub completed_iterations: Vec<IterationNode>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub start_day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationNode {
    pub id: String,
    pub title: String,
    pub duration: u32,
    pub start_date: String,
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddItemData {
    pub add_project_v2_item_by_id: Option<AddItemPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddItemPayload {
    pub item: Option<ItemRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemRef {
    pub id: String,
}

/// `ProjectV2FieldValue` input object
///
/// Serializes to exactly one key, e.g. `{"singleSelectOptionId": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectV2FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    SingleSelectOptionId(String),
    IterationId(String),
}

/// Value to write into one project field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub field_id: String,
    pub value: ProjectV2FieldValue,
}

/// Build one mutation that sets every field, each under its own alias
///
/// Variables are `projectId`, `itemId`, then `field{i}` / `value{i}`.
pub fn update_item_fields_mutation(count: usize) -> String {
    let mut params = vec!["$projectId: ID!".to_string(), "$itemId: ID!".to_string()];
    let mut selections = Vec::with_capacity(count);

    for i in 0..count {
        params.push(format!("$field{i}: ID!"));
        params.push(format!("$value{i}: ProjectV2FieldValue!"));
        selections.push(format!(
            "  field{i}: updateProjectV2ItemFieldValue(input: {{ projectId: $projectId, itemId: $itemId, fieldId: $field{i}, value: $value{i} }}) {{\n    clientMutationId\n  }}"
        ));
    }

    format!(
        "mutation setItemFieldValues({}) {{\n{}\n}}",
        params.join(", "),
        selections.join("\n")
    )
}

/// Variables matching `update_item_fields_mutation(updates.len())`
pub fn update_item_fields_variables(
    project_id: &str,
    item_id: &str,
    updates: &[FieldUpdate],
) -> serde_json::Value {
    let mut variables = serde_json::Map::new();
    variables.insert("projectId".to_string(), project_id.into());
    variables.insert("itemId".to_string(), item_id.into());
    for (i, update) in updates.iter().enumerate() {
        variables.insert(format!("field{i}"), update.field_id.clone().into());
        variables.insert(
            format!("value{i}"),
            serde_json::to_value(&update.value).unwrap_or(serde_json::Value::Null),
        );
    }
    serde_json::Value::Object(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_values_serialize_as_single_key_objects() {
        assert_eq!(
            serde_json::to_value(ProjectV2FieldValue::SingleSelectOptionId("opt".into())).unwrap(),
            json!({ "singleSelectOptionId": "opt" })
        );
        assert_eq!(
            serde_json::to_value(ProjectV2FieldValue::Number(3.5)).unwrap(),
            json!({ "number": 3.5 })
        );
        assert_eq!(
            serde_json::to_value(ProjectV2FieldValue::Date(
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
            ))
            .unwrap(),
            json!({ "date": "2024-02-29" })
        );
        assert_eq!(
            serde_json::to_value(ProjectV2FieldValue::IterationId("it".into())).unwrap(),
            json!({ "iterationId": "it" })
        );
    }

    #[test]
    fn update_mutation_aliases_each_field() {
        let mutation = update_item_fields_mutation(2);

        assert!(mutation.starts_with(
            "mutation setItemFieldValues($projectId: ID!, $itemId: ID!, $field0: ID!, $value0: ProjectV2FieldValue!, $field1: ID!, $value1: ProjectV2FieldValue!)"
        ));
        assert!(mutation.contains("field0: updateProjectV2ItemFieldValue("));
        assert!(mutation.contains("fieldId: $field1, value: $value1"));
    }

    #[test]
    fn update_variables_follow_mutation_numbering() {
        let updates = vec![
            FieldUpdate {
                field_id: "F1".into(),
                value: ProjectV2FieldValue::Text("hello".into()),
            },
            FieldUpdate {
                field_id: "F2".into(),
                value: ProjectV2FieldValue::SingleSelectOptionId("O1".into()),
            },
        ];

        let variables = update_item_fields_variables("P", "I", &updates);

        assert_eq!(
            variables,
            json!({
                "projectId": "P",
                "itemId": "I",
                "field0": "F1",
                "value0": { "text": "hello" },
                "field1": "F2",
                "value1": { "singleSelectOptionId": "O1" },
            })
        );
    }

    #[test]
    fn partial_data_survives_errors() {
        let response: GraphQLResponse<VerifyAccessData> = serde_json::from_value(json!({
            "data": { "repository": null, "owner": { "project": null } },
            "errors": [{ "type": "NOT_FOUND", "message": "Could not resolve to a Repository" }]
        }))
        .unwrap();

        let data = response.into_partial_data().unwrap();
        assert!(data.repository.is_none());
        assert!(data.project().is_none());
    }

    #[test]
    fn strict_data_rejects_errors() {
        let response: GraphQLResponse<VerifyAccessData> = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "Something went wrong" }]
        }))
        .unwrap();

        let error = response.into_data().unwrap_err();
        assert_eq!(error.to_string(), "Something went wrong");
    }

    #[test]
    fn unknown_field_nodes_deserialize_as_empty() {
        let node: FieldNode = serde_json::from_value(json!({})).unwrap();
        assert_eq!(node, FieldNode::default());
    }
}
