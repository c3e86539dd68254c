use crate::config::{self, ConfigSource, ResolvedConfig};
use crate::error::BumpError;
use crate::flavor;
use crate::git;
use crate::lifecycle::{BumpOutcome, Lifecycle, ReleaseIntent};
use crate::package::{self, PackageEntry};
use crate::runner::{CommandRunner, OutputMode, ProcessRunner};
use crate::version::ReleaseType;
use anyhow::{Context, Result, bail};
use dialoguer::{Input, Select};
use semver::Version;
use std::path::{Path, PathBuf};

/// The questions asked before a bump. `None` from a selection means the
/// operator backed out.
pub trait Interactor {
    fn main_branch(&mut self, default: &str) -> Result<String>;
    fn remote(&mut self, default: &str) -> Result<String>;
    fn choose_package(&mut self, packages: &[PackageEntry]) -> Result<Option<usize>>;
    fn choose_release_type(&mut self, package: &PackageEntry) -> Result<Option<ReleaseType>>;
}

struct CliInteractor;

impl Interactor for CliInteractor {
    fn main_branch(&mut self, default: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt("Main branch name")
            .default(default.to_string())
            .interact_text()
            .context("Failed to read the main branch name.")
    }

    fn remote(&mut self, default: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt("Remote name")
            .default(default.to_string())
            .interact_text()
            .context("Failed to read the remote name.")
    }

    fn choose_package(&mut self, packages: &[PackageEntry]) -> Result<Option<usize>> {
        let items = packages
            .iter()
            .map(|package| {
                format!(
                    "{} ({} v{})",
                    package.name_no_scope, package.name, package.version
                )
            })
            .collect::<Vec<_>>();
        Select::new()
            .with_prompt("Choose a package to bump")
            .items(&items)
            .default(0)
            .interact_opt()
            .context("Failed to read the package selection.")
    }

    fn choose_release_type(&mut self, package: &PackageEntry) -> Result<Option<ReleaseType>> {
        let current = Version::parse(&package.version).ok();
        let items = ReleaseType::ALL
            .iter()
            .map(|release_type| match &current {
                Some(current) => format!(
                    "{release_type} - {} ({current} -> {})",
                    release_type.description(),
                    release_type.apply(current)
                ),
                None => format!("{release_type} - {}", release_type.description()),
            })
            .collect::<Vec<_>>();
        let selection = Select::new()
            .with_prompt("Choose a release type")
            .items(&items)
            .default(0)
            .interact_opt()
            .context("Failed to read the release type selection.")?;
        Ok(selection.map(|index| ReleaseType::ALL[index]))
    }
}

pub fn run(directory: Option<PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine current directory.")?;
    let repo_root = match directory {
        Some(directory) => {
            println!("Using working directory: {}", directory.display());
            cwd.join(directory)
        }
        None => cwd,
    };

    let mut runner = ProcessRunner;
    let mut interactor = CliInteractor;
    let outcome = run_with(&repo_root, &mut runner, &mut interactor)?;

    println!(
        "Bumped {} from {} to {} on {}",
        outcome.package_name, outcome.previous_version, outcome.next_version, outcome.branch
    );
    if let Some(url) = &outcome.pull_request_url {
        println!("Pull request: {url}");
    }
    println!("{}", flavor::completion_line());
    println!("Done");
    Ok(())
}

pub(crate) fn run_with(
    repo_root: &Path,
    runner: &mut dyn CommandRunner,
    interactor: &mut dyn Interactor,
) -> Result<BumpOutcome> {
    let config = config::load(None, repo_root)?;
    for warning in &config.warnings {
        log::warn!("{warning}");
    }
    if let ConfigSource::Defaulted = config.source {
        log::debug!("No config file found. Using defaults");
    } else if let Some(path) = config.source.path() {
        log::info!("Loaded config from `{}`", path.display());
    }

    let root = package::read_package(repo_root)?;
    let mut packages = package::list_workspace_packages(&root)?;

    let default_main = default_main_branch(runner, repo_root, &config);
    let main_branch = interactor.main_branch(&default_main)?.trim().to_string();
    if main_branch.is_empty() {
        bail!("Main branch name cannot be empty.");
    }
    let remote = interactor.remote(&config.remote)?.trim().to_string();
    if remote.is_empty() {
        bail!("Remote name cannot be empty.");
    }

    let index = interactor
        .choose_package(&packages)?
        .ok_or(BumpError::Cancelled)?;
    if index >= packages.len() {
        bail!("Invalid package selection.");
    }
    let release_type = interactor
        .choose_release_type(&packages[index])?
        .ok_or(BumpError::Cancelled)?;

    let intent = ReleaseIntent {
        main_branch,
        remote,
        target_package: packages.swap_remove(index),
        release_type,
    };

    let mut lifecycle =
        Lifecycle::new(runner, &config, repo_root).with_push_output(OutputMode::Inherit);
    lifecycle.run_bump_pr(&intent)
}

/// Config wins, then the remote's advertised HEAD, then `master`.
fn default_main_branch(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    config: &ResolvedConfig,
) -> String {
    if let Some(branch) = &config.main_branch {
        return branch.clone();
    }

    match git::detect_remote_default_branch(runner, repo_root, &config.remote) {
        Ok(Some(branch)) => branch,
        Ok(None) => config::DEFAULT_MAIN_BRANCH.to_string(),
        Err(err) => {
            log::debug!("could not detect the remote default branch: {err:#}");
            config::DEFAULT_MAIN_BRANCH.to_string()
        }
    }
}
