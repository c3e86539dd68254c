use crate::error::BumpError;
use anyhow::{Context, Result, anyhow, bail};
use glob::{MatchOptions, Pattern};
use rayon::prelude::*;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_FILE: &str = "package.json";
pub const ROOT_WORKSPACE: &str = "<root>";

const SKIPPED_DIRECTORY: &str = "node_modules";

/// Snapshot of a package manifest taken at workflow start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    pub name_no_scope: String,
    pub version: String,
    pub description: Option<String>,
    pub directory: PathBuf,
    pub manifest_path: PathBuf,
    pub is_root: bool,
    pub workspace_patterns: Vec<String>,
}

/// Strips an npm scope (`@scope/`) at the first `/`.
pub fn package_name_no_scope(name: &str) -> &str {
    match name.split_once('/') {
        Some((_, rest)) => rest,
        None => name,
    }
}

pub fn read_package(directory: &Path) -> Result<PackageEntry> {
    read_package_entry(directory, true)
}

fn read_package_entry(directory: &Path, is_root: bool) -> Result<PackageEntry> {
    let manifest_path = directory.join(MANIFEST_FILE);
    log::debug!("reading package from `{}`", manifest_path.display());

    let content = match fs::read_to_string(&manifest_path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(BumpError::ManifestMissing(directory.to_path_buf()).into());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read `{}`.", manifest_path.display()));
        }
    };

    let manifest: JsonValue = serde_json::from_str(&content)
        .map_err(|err| BumpError::manifest_invalid(&manifest_path, err.to_string()))?;
    let Some(object) = manifest.as_object() else {
        return Err(BumpError::manifest_invalid(&manifest_path, "expected a JSON object").into());
    };

    let version = required_string(object.get("version"), "version", &manifest_path)?;
    let name = required_string(object.get("name"), "name", &manifest_path)?;
    let description = object
        .get("description")
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    let workspace_patterns = workspace_patterns(object.get("workspaces"), &manifest_path)?;

    Ok(PackageEntry {
        name_no_scope: package_name_no_scope(&name).to_string(),
        name,
        version,
        description,
        directory: directory.to_path_buf(),
        manifest_path,
        is_root,
        workspace_patterns,
    })
}

fn required_string(value: Option<&JsonValue>, field: &str, manifest_path: &Path) -> Result<String> {
    match value {
        None | Some(JsonValue::Null) => Err(BumpError::manifest_invalid(
            manifest_path,
            format!("missing a \"{field}\" attribute"),
        )
        .into()),
        Some(JsonValue::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(JsonValue::String(_)) => Err(BumpError::manifest_invalid(
            manifest_path,
            format!("\"{field}\" cannot be empty"),
        )
        .into()),
        Some(_) => Err(BumpError::manifest_invalid(
            manifest_path,
            format!("\"{field}\" must be a string"),
        )
        .into()),
    }
}

fn workspace_patterns(value: Option<&JsonValue>, manifest_path: &Path) -> Result<Vec<String>> {
    let list = match value {
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(JsonValue::Array(list)) => list,
        // yarn: { "packages": [...], "nohoist": [...] }
        Some(JsonValue::Object(object)) => match object.get("packages") {
            Some(JsonValue::Array(list)) => list,
            None => return Ok(Vec::new()),
            Some(_) => {
                return Err(BumpError::manifest_invalid(
                    manifest_path,
                    "\"workspaces.packages\" must be an array of strings",
                )
                .into());
            }
        },
        Some(_) => {
            return Err(BumpError::manifest_invalid(
                manifest_path,
                "\"workspaces\" must be an array of strings",
            )
            .into());
        }
    };

    list.iter()
        .map(|pattern| {
            pattern.as_str().map(str::to_string).ok_or_else(|| {
                anyhow::Error::from(BumpError::manifest_invalid(
                    manifest_path,
                    "\"workspaces\" entries must be strings",
                ))
            })
        })
        .collect()
}

/// The root entry followed by every sub-package its workspace patterns
/// resolve to.
pub fn list_workspace_packages(root: &PackageEntry) -> Result<Vec<PackageEntry>> {
    let mut packages = vec![root.clone()];
    if root.workspace_patterns.is_empty() {
        return Ok(packages);
    }

    let directories = resolve_workspace_directories(&root.directory, &root.workspace_patterns)?;
    let members = directories
        .par_iter()
        .map(|directory| read_package_entry(directory, false))
        .collect::<Result<Vec<_>>>()?;

    log::debug!(
        "resolved {} workspace package(s) under `{}`",
        members.len(),
        root.directory.display()
    );
    packages.extend(members);
    Ok(packages)
}

fn resolve_workspace_directories(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let canonical_root = fs::canonicalize(root)
        .with_context(|| format!("Failed to resolve `{}`.", root.display()))?;
    // Keyed by real path so symlinked directories resolve to one member.
    let mut included = BTreeMap::<PathBuf, PathBuf>::new();
    let mut excluded = BTreeSet::new();

    for raw in patterns {
        let (negated, pattern) = match raw.trim().strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, raw.trim()),
        };
        ensure_inside_root(pattern)?;

        for (canonical, directory) in expand_pattern(root, &canonical_root, pattern)? {
            if negated {
                excluded.insert(canonical);
                continue;
            }
            included
                .entry(canonical)
                .and_modify(|kept| {
                    if directory.components().count() < kept.components().count() {
                        *kept = directory.clone();
                    }
                })
                .or_insert(directory);
        }
    }

    Ok(included
        .into_iter()
        .filter(|(canonical, _)| !excluded.contains(canonical) && *canonical != canonical_root)
        .map(|(_, directory)| directory)
        .collect())
}

fn ensure_inside_root(pattern: &str) -> Result<()> {
    let escapes = Path::new(pattern).components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        bail!("Workspace pattern `{pattern}` must stay inside the repository root.");
    }
    Ok(())
}

/// Directories under `root` matching `pattern` that hold a manifest, paired
/// with their canonical path. Dot-directories never match a wildcard and
/// `node_modules` is dropped.
fn expand_pattern(
    root: &Path,
    canonical_root: &Path,
    pattern: &str,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let manifest_pattern = format!(
        "{}/{}/{MANIFEST_FILE}",
        Pattern::escape(&root.to_string_lossy()),
        pattern.trim_end_matches('/')
    );
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let paths = glob::glob_with(&manifest_pattern, options)
        .map_err(|err| anyhow!("Workspace pattern `{pattern}` is not a valid glob: {err}"))?;

    let mut found = Vec::new();
    for entry in paths {
        let manifest = match entry {
            Ok(manifest) => manifest,
            Err(err) => {
                log::debug!(
                    "skipping `{}` while expanding `{pattern}`: {err}",
                    err.path().display()
                );
                continue;
            }
        };
        let Some(directory) = manifest.parent() else {
            continue;
        };
        let relative = directory.strip_prefix(root).unwrap_or(directory);
        if relative
            .components()
            .any(|component| component.as_os_str() == SKIPPED_DIRECTORY)
            || !manifest.is_file()
        {
            continue;
        }

        let Ok(canonical) = fs::canonicalize(directory) else {
            continue;
        };
        if !canonical.starts_with(canonical_root) {
            log::debug!(
                "skipping `{}`: it points outside the repository",
                directory.display()
            );
            continue;
        }
        found.push((canonical, directory.to_path_buf()));
    }
    Ok(found)
}
