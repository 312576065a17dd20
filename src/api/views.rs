//! Server-rendered pages
//!
//! Plain HTML without scripts. Every interpolated value goes through
//! `html_escape`.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::auth::Session;
use crate::project::schema::{ControlKind, FormControl};
use crate::project::{Access, FormErrors, FormSchema, PageState, Parameters, SubmittedIssue};

/// Links and identity shared by every page
pub struct PageContext<'a> {
    pub session: Option<&'a Session>,
    /// Current path, used as the return target of sign-in and sign-out
    pub path: &'a str,
    pub web_url: &'a str,
    pub demo_path: &'a str,
}

fn layout(context: &PageContext<'_>, title: &str, body: &str) -> String {
    let account = match context.session {
        Some(session) => format!(
            r#"<form method="post" action="/logout?return_to={path}"><img src="{avatar}" alt="" width="20" height="20"> {name} <button type="submit">Sign out</button></form>"#,
            path = attr(&urlencoding::encode(context.path)),
            avatar = attr(&session.avatar_url),
            name = text(session.display_name()),
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - Project Forms</title>
</head>
<body>
<header>{account}</header>
<main>
{body}
</main>
</body>
</html>
"#,
        title = text(title),
    )
}

/// Page for a resolved stage; `values` and `errors` refill a rejected form
pub fn render_state(
    context: &PageContext<'_>,
    state: &PageState,
    values: Option<&HashMap<String, String>>,
    errors: Option<&FormErrors>,
) -> String {
    match state {
        PageState::InvalidPath => invalid_path(context),
        PageState::Unauthenticated { parameters } => unauthenticated(context, parameters, None),
        PageState::Loading { .. } => layout(context, "Loading", "<p>Loading project data...</p>"),
        PageState::AccessError {
            parameters,
            access,
            project,
        } => access_error(
            context,
            parameters,
            access,
            project.as_ref().map(|p| (p.title.as_str(), p.url.as_str())),
        ),
        PageState::RequestError { message, .. } => layout(
            context,
            "Error",
            &format!(
                "<h1>Something went wrong</h1>\n<p>GitHub request failed: {}</p>",
                text(message)
            ),
        ),
        PageState::ProjectDataLoaded { parameters, project } => {
            let schema = FormSchema::from_project(project);
            form(context, parameters, &schema, values, errors)
        }
    }
}

fn invalid_path(context: &PageContext<'_>) -> String {
    let body = format!(
        r#"<h1>Invalid URL</h1>
<p><code>{path}</code> is not a form URL.</p>
<p>Form URLs look like <code>/[owner]/[repo]/projects/[project number]/issues/new</code>, for example <a href="{demo}">{demo_text}</a>.</p>"#,
        path = text(context.path),
        demo = attr(context.demo_path),
        demo_text = text(context.demo_path),
    );
    layout(context, "Invalid URL", &body)
}

/// Login prompt after GitHub returned without signing the user in
pub fn sign_in_failed(context: &PageContext<'_>, parameters: &Parameters, message: &str) -> String {
    unauthenticated(context, parameters, Some(message))
}

fn unauthenticated(context: &PageContext<'_>, parameters: &Parameters, failure: Option<&str>) -> String {
    let failure = failure
        .map(|message| format!("<p class=\"error\">Sign-in failed: {}</p>\n", text(message)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>Submit an issue to {owner}/{repo}</h1>
{failure}<p>Sign in with GitHub to create an issue and add it to project #{number}.</p>
<p><a href="/auth/github?return_to={return_to}">Sign in with GitHub</a></p>"#,
        owner = text(&parameters.owner),
        repo = text(&parameters.repo),
        number = parameters.project_number,
        return_to = attr(&urlencoding::encode(&parameters.form_path())),
    );
    layout(context, "Sign in", &body)
}

fn check_item(ok: bool, label: &str) -> String {
    let mark = if ok { "&#x2705;" } else { "&#x274C;" };
    format!("<li>{mark} {label}</li>")
}

fn access_error(
    context: &PageContext<'_>,
    parameters: &Parameters,
    access: &Access,
    project: Option<(&str, &str)>,
) -> String {
    let repository = format!(
        r#"<a href="{url}">{owner}/{repo}</a>"#,
        url = attr(&parameters.repository_url(context.web_url)),
        owner = text(&parameters.owner),
        repo = text(&parameters.repo),
    );
    let project_link = match project {
        Some((title, url)) => format!(r#"<a href="{}">{}</a>"#, attr(url), text(title)),
        None => format!(
            r#"project #{} of <a href="{}">{}</a>"#,
            parameters.project_number,
            attr(&parameters.owner_url(context.web_url)),
            text(&parameters.owner)
        ),
    };

    let mut body = String::from("<h1>Access required</h1>\n<ul>\n");
    let _ = writeln!(
        body,
        "{}",
        check_item(access.has_repo_access, &format!("Access to {repository}"))
    );
    let _ = writeln!(
        body,
        "{}",
        check_item(
            access.has_project_read_access,
            &format!("Read access to {project_link}")
        )
    );
    let _ = writeln!(
        body,
        "{}",
        check_item(
            access.has_project_write_access,
            &format!("Write access to {project_link}")
        )
    );
    body.push_str("</ul>\n<p>Ask an owner for access, or make sure the GitHub App is installed on the repository and project owner.</p>");

    layout(context, "Access required", &body)
}

fn control(control: &FormControl, index: usize, value: &str, error: Option<&str>) -> String {
    let id = format!("control-{index}");
    let required = if control.required { " required" } else { "" };
    let mut html = format!(
        r#"<p><label for="{id}">{label}</label><br>"#,
        label = text(&control.label)
    );

    match &control.kind {
        ControlKind::Input { input_type } => {
            let step = if *input_type == "number" { r#" step="any""# } else { "" };
            let _ = write!(
                html,
                r#"<input type="{input_type}" id="{id}" name="{name}" value="{value}"{step}{required}>"#,
                name = attr(&control.name),
                value = attr(value),
            );
        }
        ControlKind::Textarea => {
            let _ = write!(
                html,
                r#"<textarea id="{id}" name="{name}" rows="8"{required}>{value}</textarea>"#,
                name = attr(&control.name),
                value = text(value),
            );
        }
        ControlKind::Select { options } => {
            let _ = write!(
                html,
                r#"<select id="{id}" name="{name}"{required}><option value="">-</option>"#,
                name = attr(&control.name),
            );
            for option in options {
                let selected = if option.value == value { " selected" } else { "" };
                let _ = write!(
                    html,
                    r#"<option value="{v}"{selected}>{label}</option>"#,
                    v = attr(&option.value),
                    label = text(&option.label),
                );
            }
            html.push_str("</select>");
        }
    }

    if let Some(error) = error {
        let _ = write!(html, r#"<br><strong class="error">{}</strong>"#, text(error));
    }
    html.push_str("</p>");
    html
}

fn form(
    context: &PageContext<'_>,
    parameters: &Parameters,
    schema: &FormSchema,
    values: Option<&HashMap<String, String>>,
    errors: Option<&FormErrors>,
) -> String {
    let mut body = format!(
        r#"<h1>New issue for {owner}/{repo}</h1>
<p>The issue is added to <a href="{url}">{title}</a>.</p>
<form method="post" action="{action}">
"#,
        owner = text(&parameters.owner),
        repo = text(&parameters.repo),
        url = attr(&schema.url),
        title = text(&schema.title),
        action = attr(&parameters.form_path()),
    );

    for (index, item) in schema.controls.iter().enumerate() {
        let value = values
            .and_then(|values| values.get(&item.name))
            .map(String::as_str)
            .unwrap_or_default();
        let error = errors.and_then(|errors| errors.get(&item.name));
        body.push_str(&control(item, index, value, error));
        body.push('\n');
    }

    body.push_str("<p><button type=\"submit\">Submit new issue</button></p>\n</form>");
    layout(context, &schema.title, &body)
}

/// Issue created and added to the project
pub fn submitted(context: &PageContext<'_>, issue: &SubmittedIssue) -> String {
    let body = format!(
        r#"<h1>Issue created</h1>
<p><a href="{url}">#{number}</a> was created and added to the project.</p>
<p><a href="{again}">Submit another issue</a></p>"#,
        url = attr(&issue.url),
        number = issue.number,
        again = attr(context.path),
    );
    layout(context, "Issue created", &body)
}

/// Issue created but not (fully) added to the project
pub fn incomplete(context: &PageContext<'_>, issue: &SubmittedIssue, message: &str) -> String {
    let body = format!(
        r#"<h1>Issue created, project not updated</h1>
<p><a href="{url}">#{number}</a> was created, but adding it to the project failed: {message}</p>
<p>Add it to the project on GitHub.</p>"#,
        url = attr(&issue.url),
        number = issue.number,
        message = text(message),
    );
    layout(context, "Project not updated", &body)
}
