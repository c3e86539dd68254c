use crate::config::ResolvedConfig;
use crate::error::{BumpError, RefLocation};
use crate::git;
use crate::naming::{self, BumpBranchName};
use crate::package::PackageEntry;
use crate::publisher::{self, ReleaseMetadata};
use crate::runner::{CommandRunner, OutputMode, RunOptions, args, run_checked};
use crate::version::{self, ReleaseType};
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::{Component, Path};

/// Where a lifecycle run currently is. `Failed` is terminal and reachable
/// from every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Syncing,
    Bumping,
    CollisionCheck,
    Committing,
    Pushing,
    CleaningUp,
    PublishingPR,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing with the remote",
            Self::Bumping => "bumping the version",
            Self::CollisionCheck => "checking for collisions",
            Self::Committing => "committing",
            Self::Pushing => "pushing",
            Self::CleaningUp => "cleaning up",
            Self::PublishingPR => "publishing the pull request",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What the operator asked for in the pull-request flow.
#[derive(Debug, Clone)]
pub struct ReleaseIntent {
    pub main_branch: String,
    pub remote: String,
    pub target_package: PackageEntry,
    pub release_type: ReleaseType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpOutcome {
    pub package_name: String,
    pub previous_version: String,
    pub next_version: String,
    pub branch: BumpBranchName,
    pub pull_request_url: Option<String>,
}

/// Push destination of the tag flow. Either a remote name or an
/// authenticated URL; the token never shows up in logs or errors.
pub struct PushTarget {
    destination: SecretString,
    token: Option<SecretString>,
}

impl PushTarget {
    pub fn remote(remote: &str) -> Self {
        Self {
            destination: SecretString::from(remote.to_string()),
            token: None,
        }
    }

    pub fn authenticated(actor: &str, token: SecretString, repository: &str) -> Self {
        let url = format!(
            "https://{actor}:{}@github.com/{repository}.git",
            token.expose_secret()
        );
        Self {
            destination: SecretString::from(url),
            token: Some(token),
        }
    }

    fn run_options(&self) -> RunOptions {
        match &self.token {
            Some(token) => RunOptions::default().redacting(token.expose_secret()),
            None => RunOptions::default(),
        }
    }
}

impl fmt::Debug for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushTarget")
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

/// Inputs of the CI tag flow.
#[derive(Debug)]
pub struct TagRequest {
    pub branch: String,
    pub package: PackageEntry,
    pub release_type: ReleaseType,
    pub commit_sha: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub push_target: PushTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Released { version: String, tag: String },
    Skipped { workspace: String },
}

pub struct Lifecycle<'a> {
    runner: &'a mut dyn CommandRunner,
    config: &'a ResolvedConfig,
    repo_root: &'a Path,
    stage: Stage,
    push_output: OutputMode,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        runner: &'a mut dyn CommandRunner,
        config: &'a ResolvedConfig,
        repo_root: &'a Path,
    ) -> Self {
        Self {
            runner,
            config,
            repo_root,
            stage: Stage::Idle,
            push_output: OutputMode::Capture,
        }
    }

    /// Output handling for the branch push, so an operator can answer
    /// credential prompts.
    pub fn with_push_output(mut self, output: OutputMode) -> Self {
        self.push_output = output;
        self
    }

    /// Bump, commit to a fresh `bump/...` branch, push it and open a pull
    /// request for it.
    pub fn run_bump_pr(&mut self, intent: &ReleaseIntent) -> Result<BumpOutcome> {
        let result = self.bump_pr_steps(intent);
        self.finish(result)
    }

    /// Bump, commit on the checked-out branch, tag and push both.
    pub fn run_tag_release(&mut self, request: &TagRequest) -> Result<TagOutcome> {
        let result = self.tag_release_steps(request);
        self.finish(result)
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.enter(Stage::Done);
                Ok(value)
            }
            Err(err) => {
                let failed_in = self.stage;
                self.enter(Stage::Failed);
                Err(err.context(format!("Bump failed while {failed_in}.")))
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("lifecycle: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn bump_pr_steps(&mut self, intent: &ReleaseIntent) -> Result<BumpOutcome> {
        let package = &intent.target_package;
        let main = intent.main_branch.as_str();
        let remote = intent.remote.as_str();

        self.enter(Stage::Syncing);
        let package_manager = self.config.package_manager.clone();
        self.probe_tools(&["git", package_manager.as_str(), "gh"])?;
        self.sync_main(main, remote)?;

        self.enter(Stage::Bumping);
        let previous_version = package.version.clone();
        let next_version = version::bump(self.runner, self.config, package, intent.release_type)?;
        log::info!(
            "Bumped {} from {previous_version} to {next_version}",
            package.name
        );

        self.enter(Stage::CollisionCheck);
        let branch = BumpBranchName::new(&package.name_no_scope, &next_version);
        self.ensure_branch_is_free(&branch, remote)?;

        self.enter(Stage::Committing);
        let message = naming::commit_message(&package.name_no_scope, &next_version);
        self.git(
            &["checkout", "-b", branch.as_str()],
            "Failed to create the bump branch.",
        )?;
        self.git(&["add", "--all"], "Failed to stage the bump.")?;
        self.git(&["commit", "-m", &message], "Failed to commit the bump.")?;
        self.summarize_commit(main, &branch)?;

        self.enter(Stage::Pushing);
        log::info!("Pushing {branch} to {remote}");
        run_checked(
            self.runner,
            self.repo_root,
            "git",
            args(&["push", "-u", remote, branch.as_str()]),
            &RunOptions::default().with_output(self.push_output),
            "Failed to push the bump branch.",
        )?;
        self.git(
            &["checkout", main],
            "Failed to switch back to the main branch.",
        )?;
        self.git(
            &["pull", "--ff-only", remote, main],
            "Failed to pull the main branch.",
        )?;

        self.enter(Stage::CleaningUp);
        self.git(
            &["branch", "-d", branch.as_str()],
            "Failed to delete the local bump branch.",
        )?;

        self.enter(Stage::PublishingPR);
        let pull_request_url = publisher::publish(
            self.runner,
            self.repo_root,
            self.config,
            &branch,
            &ReleaseMetadata {
                package,
                release_type: intent.release_type,
                previous_version: &previous_version,
                next_version: &next_version,
                base_branch: main,
            },
        )?;

        Ok(BumpOutcome {
            package_name: package.name.clone(),
            previous_version,
            next_version,
            branch,
            pull_request_url,
        })
    }

    fn tag_release_steps(&mut self, request: &TagRequest) -> Result<TagOutcome> {
        let package = &request.package;
        let remote = self.config.remote.clone();

        self.enter(Stage::Syncing);
        let package_manager = self.config.package_manager.clone();
        self.probe_tools(&["git", package_manager.as_str()])?;
        self.git(
            &["config", "user.name", &request.author_name],
            "Failed to configure the commit author.",
        )?;
        self.git(
            &["config", "user.email", &request.author_email],
            "Failed to configure the commit author.",
        )?;
        self.git(
            &["fetch", &remote, "--tags"],
            "Failed to fetch from the remote.",
        )?;
        self.git(
            &["checkout", &request.branch],
            "Failed to check out the release branch.",
        )?;

        if let Some(sha) = &request.commit_sha
            && !package.is_root
        {
            let workspace = workspace_prefix(self.repo_root, &package.directory);
            let files = git::files_in_commit(self.runner, self.repo_root, sha)?;
            let touched = files
                .iter()
                .any(|file| file.starts_with(&format!("{workspace}/")));
            if !touched {
                log::info!("No changes under `{workspace}` in {sha}; skipping the bump");
                return Ok(TagOutcome::Skipped { workspace });
            }
        }

        self.enter(Stage::Bumping);
        version::set_version(self.runner, self.config, package, &package.version)?;
        let next_version = version::bump(self.runner, self.config, package, request.release_type)?;

        self.enter(Stage::CollisionCheck);
        let tag = self
            .config
            .tag_template
            .render(&package.name_no_scope, &next_version);
        if git::ref_exists(self.runner, self.repo_root, &format!("refs/tags/{tag}"))? {
            self.rollback();
            return Err(BumpError::Collision {
                kind: "tag",
                name: tag,
                location: RefLocation::Local,
            }
            .into());
        }

        self.enter(Stage::Committing);
        let message = naming::commit_message(&package.name_no_scope, &next_version);
        let annotation = format!("{} v{next_version}", package.name_no_scope);
        self.git(
            &["commit", "-a", "-m", &message],
            "Failed to commit the bump.",
        )?;
        self.git(
            &["tag", "-a", &tag, "-m", &annotation],
            "Failed to create the tag.",
        )?;

        self.enter(Stage::Pushing);
        let target = &request.push_target;
        let options = target.run_options();
        let head = format!("HEAD:{}", request.branch);
        run_checked(
            self.runner,
            self.repo_root,
            "git",
            args(&[
                "push",
                target.destination.expose_secret(),
                &head,
                "--follow-tags",
            ]),
            &options,
            "Failed to push the bump commit.",
        )?;
        run_checked(
            self.runner,
            self.repo_root,
            "git",
            args(&["push", target.destination.expose_secret(), "--tags"]),
            &options,
            "Failed to push tags.",
        )?;

        log::info!("Tagged {tag}");
        Ok(TagOutcome::Released {
            version: next_version,
            tag,
        })
    }

    fn probe_tools(&mut self, tools: &[&str]) -> Result<()> {
        for tool in tools {
            let probe = self.runner.run(
                self.repo_root,
                tool,
                &args(&["--version"]),
                &RunOptions::default(),
            );
            match probe {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    return Err(BumpError::preflight(format!(
                        "`{tool} --version` exited with {}. Is `{tool}` installed correctly?",
                        output.exit_code
                    ))
                    .into());
                }
                Err(err) => {
                    if let Some(BumpError::Spawn { .. }) = err.downcast_ref::<BumpError>() {
                        return Err(BumpError::preflight(format!(
                            "`{tool}` is required but could not be started. Is it installed?"
                        ))
                        .into());
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn sync_main(&mut self, main: &str, remote: &str) -> Result<()> {
        if git::has_uncommitted_changes(self.runner, self.repo_root)? {
            return Err(BumpError::preflight(
                "The working tree has uncommitted changes. Commit or stash them first.",
            )
            .into());
        }

        log::info!("Syncing {main} with {remote}");
        self.git(
            &["fetch", "--prune", remote],
            "Failed to fetch from the remote.",
        )?;
        self.git(&["checkout", main], "Failed to check out the main branch.")?;

        let pull = self.runner.run(
            self.repo_root,
            "git",
            &args(&["pull", "--ff-only", remote, main]),
            &RunOptions::default(),
        )?;
        if !pull.success() {
            return Err(BumpError::preflight(format!(
                "`{main}` cannot be fast-forwarded to `{remote}/{main}`: {}",
                pull.stderr.trim()
            ))
            .into());
        }

        let head = git::resolve_ref(self.runner, self.repo_root, "HEAD")?;
        let local = git::resolve_ref(self.runner, self.repo_root, main)?;
        let upstream_ref = format!("{remote}/{main}");
        let upstream = git::resolve_ref(self.runner, self.repo_root, &upstream_ref)?;

        if local.is_none() || head != local {
            return Err(BumpError::preflight(format!("You must be on `{main}`.")).into());
        }
        if local != upstream {
            return Err(BumpError::preflight(format!(
                "`{main}` and `{upstream_ref}` differ. Push your changes first."
            ))
            .into());
        }
        Ok(())
    }

    fn ensure_branch_is_free(&mut self, branch: &BumpBranchName, remote: &str) -> Result<()> {
        let location = if git::ref_exists(self.runner, self.repo_root, branch.as_str())? {
            Some(RefLocation::Local)
        } else if git::ref_exists(self.runner, self.repo_root, &branch.remote_ref(remote))? {
            Some(RefLocation::Remote(remote.to_string()))
        } else {
            None
        };

        let Some(location) = location else {
            return Ok(());
        };

        self.rollback();
        Err(BumpError::Collision {
            kind: "branch",
            name: branch.to_string(),
            location,
        }
        .into())
    }

    /// Undo the on-disk bump. Failures are logged, never returned.
    fn rollback(&mut self) {
        log::warn!("Rolling back the version bump");
        let reset = run_checked(
            self.runner,
            self.repo_root,
            "git",
            args(&["reset", "--hard", "HEAD"]),
            &RunOptions::default(),
            "Failed to roll back the version bump.",
        );
        if let Err(err) = reset {
            log::error!("{err:#}. Restore the manifest by hand before retrying.");
        }
    }

    fn summarize_commit(&mut self, main: &str, branch: &BumpBranchName) -> Result<()> {
        let files = git::files_between(self.runner, self.repo_root, main, branch.as_str())?;
        if files.is_empty() {
            log::warn!("The bump commit on {branch} does not change any file");
        } else {
            log::info!("Bump commit changes: {}", files.join(", "));
        }
        Ok(())
    }

    fn git(&mut self, git_args: &[&str], context: &str) -> Result<()> {
        run_checked(
            self.runner,
            self.repo_root,
            "git",
            args(git_args),
            &RunOptions::default(),
            context,
        )
        .map(|_| ())
    }
}

/// Repository-relative `/`-separated path of a workspace directory.
fn workspace_prefix(repo_root: &Path, directory: &Path) -> String {
    let relative = directory.strip_prefix(repo_root).unwrap_or(directory);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
