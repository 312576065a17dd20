//! E2E tests for issue form pages

mod common;

use common::{FORM_PATH, TestServer};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

const API_PATH: &str = "/api/forms/project-forms/demo/projects/1";

/// Issue creation, item creation and field update all succeed
async fn mock_submission(server: &TestServer) {
    Mock::given(method("POST"))
        .and(path("/repos/project-forms/demo/issues"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 42,
            "html_url": "https://github.com/project-forms/demo/issues/42",
            "node_id": "I_kwDOdemo42"
        })))
        .expect(1)
        .mount(&server.github)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("mutation addIssueToProject"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "addProjectV2ItemById": { "item": { "id": "PVTI_42" } } }
        })))
        .expect(1)
        .mount(&server.github)
        .await;
}

#[tokio::test]
async fn test_form_without_session_asks_to_sign_in() {
    let server = TestServer::new().await;

    let response = server.client.get(server.url(FORM_PATH)).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("Submit an issue to project-forms/demo"));
    assert!(body.contains(
        "/auth/github?return_to=%2Fproject-forms%2Fdemo%2Fprojects%2F1%2Fissues%2Fnew"
    ));
}

#[tokio::test]
async fn test_invalid_project_number_is_not_found() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/project-forms/demo/projects/abc/issues/new"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert!(response.text().await.unwrap().contains("Invalid URL"));
}

#[tokio::test]
async fn test_case_variant_path_redirects() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/project-forms/demo/Projects/1/Issues/New?title=Hi"))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()["location"],
        format!("{FORM_PATH}?title=Hi").as_str()
    );
}

#[tokio::test]
async fn test_form_lists_project_fields() {
    let server = TestServer::new().await;
    server.mock_loadable_project().await;

    let response = server
        .client
        .get(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("New issue for project-forms/demo"));
    assert!(body.contains(r#"name="title""#));
    assert!(body.contains(r#"name="Points""#));
    assert!(body.contains(r#"type="date""#));
    assert!(body.contains(r#"<option value="Todo">Todo</option>"#));
    assert!(body.contains("Sprint 3 (14 days from 2024-02-05)"));
    assert!(body.contains(r#"name="body""#));
    assert!(body.contains("The Octocat"));
    assert!(body.contains("Sign out"));
}

#[tokio::test]
async fn test_project_is_cached_per_user() {
    let server = TestServer::new().await;
    server.mock_loadable_project().await;

    for _ in 0..2 {
        let response = server
            .client
            .get(server.url(FORM_PATH))
            .header("Cookie", server.session_cookie())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    // Second load served from cache, no further GraphQL round trips
    assert_eq!(server.graphql_requests().await.len(), 2);
}

#[tokio::test]
async fn test_missing_project_access_is_forbidden() {
    let server = TestServer::new().await;
    server.mock_verify_access(true, Some(false)).await;

    let response = server
        .client
        .get(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
    let body = response.text().await.unwrap();
    assert!(body.contains("Access required"));
    assert_eq!(body.matches("<li>").count(), 3);
}

#[tokio::test]
async fn test_expired_github_token_asks_to_sign_in_again() {
    let server = TestServer::new().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Bad credentials"
        })))
        .mount(&server.github)
        .await;

    let response = server
        .client
        .get(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("Sign in with GitHub"));
}

#[tokio::test]
async fn test_github_outage_is_bad_gateway() {
    let server = TestServer::new().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "message": "Service unavailable"
        })))
        .mount(&server.github)
        .await;

    let response = server
        .client
        .get(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    assert!(response.text().await.unwrap().contains("Something went wrong"));
}

#[tokio::test]
async fn test_submit_creates_issue_and_sets_fields() {
    let server = TestServer::new().await;
    server.mock_loadable_project().await;
    mock_submission(&server).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("mutation setItemFieldValues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "field0": { "clientMutationId": null },
                "field1": { "clientMutationId": null },
                "field2": { "clientMutationId": null }
            }
        })))
        .expect(1)
        .mount(&server.github)
        .await;

    let response = server
        .client
        .post(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .form(&[
            ("title", "Login button does nothing"),
            ("body", "Clicking it has no effect."),
            ("Points", "3"),
            ("Due date", ""),
            ("Status", "Todo"),
            ("Sprint", "c5a9c7f1"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body = response.text().await.unwrap();
    assert!(body.contains("Issue created"));
    assert!(body.contains("https://github.com/project-forms/demo/issues/42"));

    let update = server
        .graphql_requests()
        .await
        .into_iter()
        .find(|request| {
            request["query"]
                .as_str()
                .is_some_and(|query| query.contains("mutation setItemFieldValues"))
        })
        .unwrap();
    assert_eq!(
        update["variables"],
        json!({
            "projectId": "PVT_demo",
            "itemId": "PVTI_42",
            "field0": "PVTF_points",
            "value0": { "number": 3.0 },
            "field1": "PVTSSF_status",
            "value1": { "singleSelectOptionId": "f75ad846" },
            "field2": "PVTIF_sprint",
            "value2": { "iterationId": "c5a9c7f1" }
        })
    );
}

#[tokio::test]
async fn test_submit_title_only_skips_field_update() {
    let server = TestServer::new().await;
    server.mock_loadable_project().await;
    mock_submission(&server).await;

    let response = server
        .client
        .post(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .form(&[("title", "Just a title"), ("Points", ""), ("Status", "")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert!(response.text().await.unwrap().contains("Issue created"));

    let field_updates = server
        .graphql_requests()
        .await
        .into_iter()
        .filter(|request| {
            request["query"]
                .as_str()
                .is_some_and(|query| query.contains("mutation setItemFieldValues"))
        })
        .count();
    assert_eq!(field_updates, 0);
}

#[tokio::test]
async fn test_submit_with_invalid_values_is_rejected() {
    let server = TestServer::new().await;
    server.mock_loadable_project().await;

    let response = server
        .client
        .post(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .form(&[("title", ""), ("Points", "many"), ("Status", "Done")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 422);
    let body = response.text().await.unwrap();
    assert!(body.contains("Issue title is required"));
    assert!(body.contains(r#""many" is not a number"#));
    assert!(body.contains(r#""Done" is not an option of Status"#));
    assert!(body.contains(r#"value="many""#));

    let issue_requests = server
        .github
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path().ends_with("/issues"))
        .count();
    assert_eq!(issue_requests, 0);
}

#[tokio::test]
async fn test_submit_without_session_is_unauthorized() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url(FORM_PATH))
        .form(&[("title", "Anonymous")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert!(response.text().await.unwrap().contains("Sign in with GitHub"));
}

#[tokio::test]
async fn test_submit_reports_incomplete_project_item() {
    let server = TestServer::new().await;
    server.mock_loadable_project().await;
    mock_submission(&server).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("mutation setItemFieldValues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Field is archived" }]
        })))
        .mount(&server.github)
        .await;

    let response = server
        .client
        .post(server.url(FORM_PATH))
        .header("Cookie", server.session_cookie())
        .form(&[("title", "Partially saved"), ("Points", "1")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body = response.text().await.unwrap();
    assert!(body.contains("Issue created, project not updated"));
    assert!(body.contains("https://github.com/project-forms/demo/issues/42"));
    assert!(body.contains("Field is archived"));
}

#[tokio::test]
async fn test_form_state_api_requires_session() {
    let server = TestServer::new().await;

    let response = server.client.get(server.url(API_PATH)).send().await.unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_form_state_api_returns_schema() {
    let server = TestServer::new().await;
    server.mock_loadable_project().await;

    let response = server
        .client
        .get(server.url(API_PATH))
        .header("Authorization", format!("Bearer {}", server.session_token()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"]["name"], "projectDataLoaded");
    assert_eq!(body["state"]["project"]["title"], "Demo project");

    let controls = body["schema"]["controls"].as_array().unwrap();
    let names: Vec<&str> = controls
        .iter()
        .filter_map(|control| control["name"].as_str())
        .collect();
    assert_eq!(
        names,
        vec!["title", "Points", "Due date", "Status", "Sprint", "body"]
    );
    assert_eq!(controls[0]["required"], true);
    assert_eq!(controls[3]["control"], "select");
}

#[tokio::test]
async fn test_form_state_api_reports_access_error() {
    let server = TestServer::new().await;
    server.mock_verify_access(false, None).await;

    let response = server
        .client
        .get(server.url(API_PATH))
        .header("Authorization", format!("Bearer {}", server.session_token()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"]["name"], "accessError");
    assert_eq!(body["state"]["access"]["hasRepoAccess"], false);
    assert!(body.get("schema").is_none());
}
