use crate::config;
use crate::error::BumpError;
use crate::lifecycle::{Lifecycle, PushTarget, TagOutcome, TagRequest};
use crate::package::{self, PackageEntry, ROOT_WORKSPACE};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::version::ReleaseType;
use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Everything the CI flow reads from the job environment, read once.
#[derive(Debug)]
pub struct ActionInputs {
    pub workspace_root: PathBuf,
    pub release_type: ReleaseType,
    pub workspace: String,
    pub commit_sha: Option<String>,
    pub actor: Option<String>,
    pub token: Option<SecretString>,
    pub repository: Option<String>,
    pub git_ref: Option<String>,
    pub config_path: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
}

impl ActionInputs {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let Some(workspace_root) = value("GITHUB_WORKSPACE") else {
            bail!(
                "GITHUB_WORKSPACE is not set. `bumpr action` must run inside a GitHub Actions job."
            );
        };
        let Some(release) = value("INPUT_RELEASE") else {
            bail!("INPUT_RELEASE is not set. Release must match major|minor|patch");
        };
        let release_type = release.parse::<ReleaseType>()?;

        Ok(Self {
            workspace_root: PathBuf::from(workspace_root),
            release_type,
            workspace: value("INPUT_WORKSPACE").unwrap_or_else(|| ROOT_WORKSPACE.to_string()),
            commit_sha: value("GITHUB_SHA"),
            actor: value("GITHUB_ACTOR"),
            token: value("GITHUB_TOKEN").map(SecretString::from),
            repository: value("GITHUB_REPOSITORY"),
            git_ref: value("GITHUB_REF"),
            config_path: value("INPUT_CONFIG").map(PathBuf::from),
            output_file: value("GITHUB_OUTPUT").map(PathBuf::from),
        })
    }

    fn push_target(&self, remote: &str) -> PushTarget {
        match (&self.actor, &self.token, &self.repository) {
            (Some(actor), Some(token), Some(repository)) => {
                PushTarget::authenticated(actor, token.clone(), repository)
            }
            _ => PushTarget::remote(remote),
        }
    }
}

pub fn run() -> Result<()> {
    let inputs = ActionInputs::from_env()?;
    let mut runner = ProcessRunner;
    let outcome = run_with(&inputs, &mut runner)?;

    match &outcome {
        TagOutcome::Released { version, tag } => println!("Released {tag} (version {version})"),
        TagOutcome::Skipped { workspace } => {
            println!("No changes in `{workspace}`. Nothing to release.")
        }
    }
    if let Some(path) = &inputs.output_file {
        write_outputs(path, &outcome)?;
    }
    println!("Done");
    Ok(())
}

pub(crate) fn run_with(
    inputs: &ActionInputs,
    runner: &mut dyn CommandRunner,
) -> Result<TagOutcome> {
    let repo_root = inputs.workspace_root.as_path();
    let config = config::load(inputs.config_path.as_deref(), repo_root)?;
    for warning in &config.warnings {
        log::warn!("{warning}");
    }

    let branch = branch_from_ref(inputs.git_ref.as_deref())?;
    let package = resolve_workspace_package(repo_root, &inputs.workspace)?;
    let author_name = inputs
        .actor
        .clone()
        .unwrap_or_else(|| config.commit_author.name.clone());

    log::info!("Creating \"{}\" release", inputs.release_type);
    log::info!("Package name = {}", package.name);
    log::info!("Package name no scope = {}", package.name_no_scope);
    log::info!("Current version = {}", package.version);
    log::info!("Branch = {branch}");
    log::info!("Username = {author_name}");

    let request = TagRequest {
        branch,
        package,
        release_type: inputs.release_type,
        commit_sha: inputs.commit_sha.clone(),
        author_name,
        author_email: config.commit_author.email.clone(),
        push_target: inputs.push_target(&config.remote),
    };
    Lifecycle::new(runner, &config, repo_root).run_tag_release(&request)
}

fn branch_from_ref(git_ref: Option<&str>) -> Result<String> {
    let Some(git_ref) = git_ref else {
        let message = "GITHUB_REF is not set; cannot tell which branch to bump.";
        return Err(BumpError::preflight(message).into());
    };
    match git_ref.strip_prefix("refs/heads/") {
        Some(branch) if !branch.is_empty() => Ok(branch.to_string()),
        _ => Err(BumpError::preflight(format!(
            "`{git_ref}` is not a branch. Run the bump on a branch push."
        ))
        .into()),
    }
}

fn resolve_workspace_package(repo_root: &Path, workspace: &str) -> Result<PackageEntry> {
    if workspace == ROOT_WORKSPACE {
        return package::read_package(repo_root);
    }

    let relative = Path::new(workspace);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        bail!("Workspace `{workspace}` must be a path inside the repository.");
    }

    let mut entry = package::read_package(&repo_root.join(relative))?;
    entry.is_root = false;
    Ok(entry)
}

fn write_outputs(path: &Path, outcome: &TagOutcome) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open `{}`.", path.display()))?;

    let lines = match outcome {
        TagOutcome::Released { version, tag } => format!("version={version}\ntag={tag}\n"),
        TagOutcome::Skipped { .. } => "skipped=true\n".to_string(),
    };
    file.write_all(lines.as_bytes())
        .with_context(|| format!("Failed to write step outputs to `{}`.", path.display()))
}
