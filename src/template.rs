use anyhow::{Context, Result};
use handlebars::{Handlebars, no_escape};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PullRequestBodyContext<'a> {
    pub name: &'a str,
    pub name_no_scope: &'a str,
    pub release_type: &'a str,
    pub next_version: &'a str,
    pub previous_version: &'a str,
    pub branch: &'a str,
    pub base_branch: &'a str,
}

const DEFAULT_PULL_REQUEST_BODY_TEMPLATE: &str = r#"<!-- managed-by: bumpr -->
## Bump `{{name}}`

| | |
|---|---|
| Package | `{{name}}` |
| Release type | `{{release_type}}` |
| Next version | `{{next_version}}` |
| Previous version | `{{previous_version}}` |

Merging this pull request into `{{base_branch}}` releases `{{name_no_scope}}` v{{next_version}}.
"#;

pub fn render_pull_request_body(
    context: &PullRequestBodyContext<'_>,
    template_override: Option<&str>,
) -> Result<String> {
    let template = template_override.unwrap_or(DEFAULT_PULL_REQUEST_BODY_TEMPLATE);
    render_template("pull-request-body", template, context)
}

fn render_template<T: Serialize>(name: &str, template_source: &str, context: &T) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(no_escape);
    handlebars.set_strict_mode(true);
    handlebars
        .register_template_string(name, template_source)
        .with_context(|| format!("Failed to register template `{name}`."))?;

    handlebars
        .render(name, context)
        .with_context(|| format!("Failed to render template `{name}`."))
}
