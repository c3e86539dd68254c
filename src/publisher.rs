use crate::config::ResolvedConfig;
use crate::naming::BumpBranchName;
use crate::package::PackageEntry;
use crate::runner::{CommandRunner, RunOptions, args, run_checked};
use crate::template::{self, PullRequestBodyContext};
use crate::version::ReleaseType;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const HOSTING_CLI: &str = "gh";

/// What the pull request describes.
#[derive(Debug, Clone)]
pub struct ReleaseMetadata<'a> {
    pub package: &'a PackageEntry,
    pub release_type: ReleaseType,
    pub previous_version: &'a str,
    pub next_version: &'a str,
    pub base_branch: &'a str,
}

pub fn pull_request_title(metadata: &ReleaseMetadata<'_>) -> String {
    format!(
        "bump! {} v{} ({})",
        metadata.package.name_no_scope, metadata.next_version, metadata.release_type
    )
}

/// Ensures the bump label exists and opens the pull request. Returns the URL
/// the hosting CLI printed, if any.
pub fn publish(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    config: &ResolvedConfig,
    branch: &BumpBranchName,
    metadata: &ReleaseMetadata<'_>,
) -> Result<Option<String>> {
    let pull_request = &config.pull_request;
    run_checked(
        runner,
        repo_root,
        HOSTING_CLI,
        args(&[
            "label",
            "create",
            &pull_request.label,
            "--description",
            &pull_request.label_description,
            "--color",
            &pull_request.label_color,
            "--force",
        ]),
        &RunOptions::default(),
        "Failed to create the pull request label.",
    )?;

    let template_override = load_template_override(repo_root, config)?;
    let body = template::render_pull_request_body(
        &PullRequestBodyContext {
            name: &metadata.package.name,
            name_no_scope: &metadata.package.name_no_scope,
            release_type: metadata.release_type.as_str(),
            next_version: metadata.next_version,
            previous_version: metadata.previous_version,
            branch: branch.as_str(),
            base_branch: metadata.base_branch,
        },
        template_override.as_deref(),
    )?;
    let title = pull_request_title(metadata);

    let output = run_checked(
        runner,
        repo_root,
        HOSTING_CLI,
        args(&[
            "pr",
            "create",
            "--base",
            metadata.base_branch,
            "--head",
            branch.as_str(),
            "--title",
            &title,
            "--label",
            &pull_request.label,
            "--body",
            &body,
        ]),
        &RunOptions::default(),
        "Failed to create the pull request.",
    )?;

    let url = output
        .stdout
        .lines()
        .map(str::trim)
        .rfind(|line| line.starts_with("https://"))
        .map(str::to_string);
    Ok(url)
}

fn load_template_override(repo_root: &Path, config: &ResolvedConfig) -> Result<Option<String>> {
    let Some(template_path) = &config.pull_request.body_template_file else {
        return Ok(None);
    };

    let full_path = repo_root.join(template_path);
    let contents = fs::read_to_string(&full_path).with_context(|| {
        format!(
            "Failed to read pull request template file `{}`.",
            full_path.display()
        )
    })?;
    Ok(Some(contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandResult;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct ScriptedRunner {
        responses: VecDeque<CommandResult>,
        calls: Vec<(String, Vec<String>)>,
    }

    impl ScriptedRunner {
        fn new(responses: Vec<CommandResult>) -> Self {
            Self {
                responses: responses.into(),
                calls: Vec::new(),
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &mut self,
            _cwd: &Path,
            program: &str,
            args: &[String],
            _options: &RunOptions,
        ) -> Result<CommandResult> {
            self.calls.push((program.to_string(), args.to_vec()));
            self.responses
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("Missing scripted response for `{program}`"))
        }
    }

    fn ok(stdout: &str) -> CommandResult {
        CommandResult {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn package() -> PackageEntry {
        PackageEntry {
            name: "@acme/widgets".to_string(),
            name_no_scope: "widgets".to_string(),
            version: "1.2.3".to_string(),
            description: None,
            directory: PathBuf::from("."),
            manifest_path: PathBuf::from("package.json"),
            is_root: true,
            workspace_patterns: Vec::new(),
        }
    }

    #[test]
    fn creates_label_then_pull_request() {
        let temp_dir = tempdir().unwrap();
        let package = package();
        let branch = BumpBranchName::new("widgets", "1.3.0");
        let mut runner = ScriptedRunner::new(vec![
            ok(""),
            ok("Creating pull request\nhttps://github.com/acme/widgets/pull/12\n"),
        ]);

        let url = publish(
            &mut runner,
            temp_dir.path(),
            &ResolvedConfig::default(),
            &branch,
            &ReleaseMetadata {
                package: &package,
                release_type: ReleaseType::Minor,
                previous_version: "1.2.3",
                next_version: "1.3.0",
                base_branch: "master",
            },
        )
        .unwrap();

        assert_eq!(
            url.as_deref(),
            Some("https://github.com/acme/widgets/pull/12")
        );
        let (program, label_args) = &runner.calls[0];
        assert_eq!(program, "gh");
        assert_eq!(&label_args[..3], &["label", "create", "bump"]);
        assert!(label_args.contains(&"--force".to_string()));

        let (_, pr_args) = &runner.calls[1];
        assert_eq!(&pr_args[..2], &["pr", "create"]);
        let head_index = pr_args.iter().position(|arg| arg == "--head").unwrap();
        assert_eq!(pr_args[head_index + 1], "bump/widgets-v1.3.0");
        let title_index = pr_args.iter().position(|arg| arg == "--title").unwrap();
        assert_eq!(pr_args[title_index + 1], "bump! widgets v1.3.0 (minor)");
        let body_index = pr_args.iter().position(|arg| arg == "--body").unwrap();
        assert!(pr_args[body_index + 1].contains("`1.2.3`"));
    }

    #[test]
    fn label_failure_stops_before_pull_request() {
        let temp_dir = tempdir().unwrap();
        let package = package();
        let branch = BumpBranchName::new("widgets", "1.3.0");
        let mut runner = ScriptedRunner::new(vec![CommandResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "HTTP 403: Resource not accessible by integration".to_string(),
        }]);

        let err = publish(
            &mut runner,
            temp_dir.path(),
            &ResolvedConfig::default(),
            &branch,
            &ReleaseMetadata {
                package: &package,
                release_type: ReleaseType::Patch,
                previous_version: "1.2.3",
                next_version: "1.2.4",
                base_branch: "master",
            },
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("HTTP 403"));
        assert_eq!(runner.calls.len(), 1);
    }

    #[test]
    fn uses_configured_body_template() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join(".github")).unwrap();
        fs::write(
            temp_dir.path().join(".github/bump-body.hbs"),
            "Bumping {{name}} to {{next_version}}",
        )
        .unwrap();
        let mut config = ResolvedConfig::default();
        config.pull_request.body_template_file = Some(".github/bump-body.hbs".to_string());

        let package = package();
        let branch = BumpBranchName::new("widgets", "2.0.0");
        let mut runner = ScriptedRunner::new(vec![ok(""), ok("")]);

        let url = publish(
            &mut runner,
            temp_dir.path(),
            &config,
            &branch,
            &ReleaseMetadata {
                package: &package,
                release_type: ReleaseType::Major,
                previous_version: "1.2.3",
                next_version: "2.0.0",
                base_branch: "main",
            },
        )
        .unwrap();

        assert!(url.is_none());
        let (_, pr_args) = &runner.calls[1];
        assert!(pr_args.contains(&"Bumping @acme/widgets to 2.0.0".to_string()));
    }
}
