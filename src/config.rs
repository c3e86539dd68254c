use crate::naming::TagTemplate;
use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_MAIN_BRANCH: &str = "master";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_PACKAGE_MANAGER: &str = "npm";
pub const DEFAULT_TAG_TEMPLATE: &str = "{name}/v{version}";
pub const DEFAULT_LABEL: &str = "bump";
pub const DEFAULT_LABEL_DESCRIPTION: &str = "Version bump of a package";
pub const DEFAULT_LABEL_COLOR: &str = "1d76db";
pub const DEFAULT_COMMIT_AUTHOR_NAME: &str = "Automated Version Bump";
pub const DEFAULT_COMMIT_AUTHOR_EMAIL: &str = "auto.version@users.noreply.github.com";

const CONFIG_FILE_CANDIDATES: [&str; 2] = ["bumpr.toml", ".bumpr.toml"];

#[derive(Debug, Clone)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Discovered(PathBuf),
    Defaulted,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(path) | Self::Discovered(path) => Some(path.as_path()),
            Self::Defaulted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthorConfig {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestConfig {
    pub label: String,
    pub label_description: String,
    pub label_color: String,
    pub body_template_file: Option<String>,
}

impl Default for PullRequestConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            label_description: DEFAULT_LABEL_DESCRIPTION.to_string(),
            label_color: DEFAULT_LABEL_COLOR.to_string(),
            body_template_file: None,
        }
    }
}

/// Settings for one run. Built once at start-up and passed by reference.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// `None` means "ask git for the remote's default branch".
    pub main_branch: Option<String>,
    pub remote: String,
    pub package_manager: String,
    pub tag_template: TagTemplate,
    pub pull_request: PullRequestConfig,
    pub commit_author: CommitAuthorConfig,
    pub source: ConfigSource,
    pub warnings: Vec<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            main_branch: None,
            remote: DEFAULT_REMOTE.to_string(),
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
            tag_template: TagTemplate::default(),
            pull_request: PullRequestConfig::default(),
            commit_author: CommitAuthorConfig {
                name: DEFAULT_COMMIT_AUTHOR_NAME.to_string(),
                email: DEFAULT_COMMIT_AUTHOR_EMAIL.to_string(),
            },
            source: ConfigSource::Defaulted,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, facet::Facet)]
struct RawConfig {
    main_branch: Option<String>,
    remote: Option<String>,
    package_manager: Option<String>,
    tag_template: Option<String>,
    pull_request: Option<RawPullRequestConfig>,
    commit_author: Option<RawCommitAuthorConfig>,
}

#[derive(Debug, Default, facet::Facet)]
struct RawPullRequestConfig {
    label: Option<String>,
    label_description: Option<String>,
    label_color: Option<String>,
    body_template_file: Option<String>,
}

#[derive(Debug, Default, facet::Facet)]
struct RawCommitAuthorConfig {
    name: Option<String>,
    email: Option<String>,
}

pub fn load(explicit_path: Option<&Path>, repo_root: &Path) -> Result<ResolvedConfig> {
    let Some((path, explicit)) = resolve_config_location(explicit_path, repo_root)? else {
        return Ok(ResolvedConfig::default());
    };

    let raw_contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file `{}`.", path.display()))?;
    let source = if explicit {
        ConfigSource::Explicit(path.clone())
    } else {
        ConfigSource::Discovered(path.clone())
    };

    let parsed_toml = raw_contents
        .parse::<toml::Value>()
        .with_context(|| format!("Config file `{}` is not valid TOML.", path.display()))?;
    let warnings = collect_warnings(&parsed_toml);

    let raw: RawConfig = facet_toml::from_str(&raw_contents).with_context(|| {
        format!(
            "Config file `{}` has unsupported value types.",
            path.display()
        )
    })?;

    let main_branch = match raw.main_branch {
        Some(value) => Some(non_empty(value, "`main_branch`")?),
        None => None,
    };
    let remote = non_empty(
        raw.remote.unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
        "`remote`",
    )?;
    let package_manager = non_empty(
        raw.package_manager
            .unwrap_or_else(|| DEFAULT_PACKAGE_MANAGER.to_string()),
        "`package_manager`",
    )?;
    let tag_template = match raw.tag_template.as_deref() {
        Some(value) => TagTemplate::parse(value)?,
        None => TagTemplate::default(),
    };
    let pull_request = resolve_pull_request_config(raw.pull_request)?;

    let raw_author = raw.commit_author.unwrap_or_default();
    let commit_author = CommitAuthorConfig {
        name: non_empty(
            raw_author
                .name
                .unwrap_or_else(|| DEFAULT_COMMIT_AUTHOR_NAME.to_string()),
            "`commit_author.name`",
        )?,
        email: non_empty(
            raw_author
                .email
                .unwrap_or_else(|| DEFAULT_COMMIT_AUTHOR_EMAIL.to_string()),
            "`commit_author.email`",
        )?,
    };

    Ok(ResolvedConfig {
        main_branch,
        remote,
        package_manager,
        tag_template,
        pull_request,
        commit_author,
        source,
        warnings,
    })
}

fn resolve_pull_request_config(raw: Option<RawPullRequestConfig>) -> Result<PullRequestConfig> {
    let Some(raw) = raw else {
        return Ok(PullRequestConfig::default());
    };

    let label = non_empty(
        raw.label.unwrap_or_else(|| DEFAULT_LABEL.to_string()),
        "`pull_request.label`",
    )?;
    let label_description = non_empty(
        raw.label_description
            .unwrap_or_else(|| DEFAULT_LABEL_DESCRIPTION.to_string()),
        "`pull_request.label_description`",
    )?;

    let label_color = raw
        .label_color
        .unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string())
        .trim()
        .trim_start_matches('#')
        .to_ascii_lowercase();
    if label_color.len() != 6 || !label_color.chars().all(|ch| ch.is_ascii_hexdigit()) {
        bail!("`pull_request.label_color` must be six hex digits, e.g. `1d76db`.");
    }

    let body_template_file = match raw.body_template_file {
        Some(path) => Some(normalize_repo_relative_path(
            &path,
            "`pull_request.body_template_file` path",
        )?),
        None => None,
    };

    Ok(PullRequestConfig {
        label,
        label_description,
        label_color,
        body_template_file,
    })
}

fn non_empty(value: String, label: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{label} cannot be empty.");
    }
    Ok(trimmed.to_string())
}

fn normalize_repo_relative_path(value: &str, label: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{label} cannot be empty.");
    }

    let path = Path::new(trimmed);
    if path.is_absolute() {
        bail!("{label} `{trimmed}` must be repository-relative.");
    }

    for component in path.components() {
        match component {
            Component::CurDir | Component::Normal(_) => {}
            Component::ParentDir => {
                bail!("{label} `{trimmed}` cannot contain `..`.");
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("{label} `{trimmed}` must be repository-relative.");
            }
        }
    }

    Ok(trimmed.to_string())
}

fn collect_warnings(parsed: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let Some(root) = parsed.as_table() else {
        return warnings;
    };

    let allowed_root: BTreeSet<&str> = BTreeSet::from([
        "main_branch",
        "remote",
        "package_manager",
        "tag_template",
        "pull_request",
        "commit_author",
    ]);
    for key in root
        .keys()
        .filter(|key| !allowed_root.contains(key.as_str()))
    {
        warnings.push(format!("Unknown config key `{key}` was ignored."));
    }

    let nested: [(&str, &[&str]); 2] = [
        (
            "pull_request",
            &[
                "label",
                "label_description",
                "label_color",
                "body_template_file",
            ],
        ),
        ("commit_author", &["name", "email"]),
    ];
    for (table_name, allowed) in nested {
        let Some(table) = root.get(table_name).and_then(toml::Value::as_table) else {
            continue;
        };
        for key in table.keys().filter(|key| !allowed.contains(&key.as_str())) {
            warnings.push(format!("Unknown config key `{table_name}.{key}` was ignored."));
        }
    }

    warnings
}

fn resolve_config_location(
    explicit_path: Option<&Path>,
    repo_root: &Path,
) -> Result<Option<(PathBuf, bool)>> {
    if let Some(explicit) = explicit_path {
        let explicit = if explicit.is_absolute() {
            explicit.to_path_buf()
        } else {
            repo_root.join(explicit)
        };
        if !explicit.exists() {
            bail!("Config file `{}` was not found.", explicit.display());
        }
        return Ok(Some((explicit, true)));
    }

    for candidate in CONFIG_FILE_CANDIDATES {
        let path = repo_root.join(candidate);
        if path.exists() {
            return Ok(Some((path, false)));
        }
    }

    Ok(None)
}
