use crate::runner::{CommandRunner, RunOptions, args, run_checked};
use anyhow::{Context, Result};
use std::path::Path;

/// Resolves `reference` to a commit id, `None` when git does not know it.
pub fn resolve_ref(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    reference: &str,
) -> Result<Option<String>> {
    let output = runner.run(
        repo_root,
        "git",
        &args(&["rev-parse", "--verify", "--quiet", reference]),
        &RunOptions::default(),
    )?;
    if !output.success() {
        return Ok(None);
    }

    let sha = output.stdout.trim();
    if sha.is_empty() {
        return Ok(None);
    }
    Ok(Some(sha.to_string()))
}

pub fn ref_exists(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    reference: &str,
) -> Result<bool> {
    Ok(resolve_ref(runner, repo_root, reference)?.is_some())
}

pub fn has_uncommitted_changes(runner: &mut dyn CommandRunner, repo_root: &Path) -> Result<bool> {
    let output = run_checked(
        runner,
        repo_root,
        "git",
        args(&["status", "-s"]),
        &RunOptions::default(),
        "Failed to inspect the working tree.",
    )?;
    Ok(!output.stdout.trim().is_empty())
}

/// Default branch advertised by `<remote>/HEAD`, if the clone knows it.
pub fn detect_remote_default_branch(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    remote: &str,
) -> Result<Option<String>> {
    let head_ref = format!("refs/remotes/{remote}/HEAD");
    let output = runner
        .run(
            repo_root,
            "git",
            &args(&["symbolic-ref", "--short", &head_ref]),
            &RunOptions::default(),
        )
        .context("Failed to run git while checking the remote HEAD.")?;

    if !output.success() {
        return Ok(None);
    }

    let trimmed = output.stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let prefix = format!("{remote}/");
    Ok(Some(
        trimmed
            .strip_prefix(prefix.as_str())
            .unwrap_or(trimmed)
            .to_string(),
    ))
}

/// Files touched by a single commit. `-m` makes merge commits list their
/// changes against the first parent too.
pub fn files_in_commit(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    sha: &str,
) -> Result<Vec<String>> {
    let output = run_checked(
        runner,
        repo_root,
        "git",
        args(&["log", "-m", "-1", "--name-only", "--pretty=format:", sha]),
        &RunOptions::default(),
        "Failed to list files changed by the commit under test.",
    )?;
    Ok(collect_paths(&output.stdout))
}

pub fn files_between(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    from: &str,
    to: &str,
) -> Result<Vec<String>> {
    let range = format!("{from}..{to}");
    let output = run_checked(
        runner,
        repo_root,
        "git",
        args(&["diff", "--name-only", &range]),
        &RunOptions::default(),
        "Failed to list files changed by the bump commit.",
    )?;
    Ok(collect_paths(&output.stdout))
}

fn collect_paths(stdout: &str) -> Vec<String> {
    let mut paths = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    paths.sort();
    paths.dedup();
    paths
}
