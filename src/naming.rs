use anyhow::{Result, bail};
use std::fmt;

pub const VERSION_TOKEN: &str = "{version}";
pub const NAME_TOKEN: &str = "{name}";
const BUMP_BRANCH_PREFIX: &str = "bump/";

/// `bump/<nameNoScope>-v<nextVersion>`. Must not exist locally or on the
/// remote before the bump commit is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpBranchName(String);

impl BumpBranchName {
    pub fn new(name_no_scope: &str, next_version: &str) -> Self {
        Self(format!(
            "{BUMP_BRANCH_PREFIX}{}",
            release_slug(name_no_scope, next_version)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn remote_ref(&self, remote: &str) -> String {
        format!("{remote}/{}", self.0)
    }
}

impl fmt::Display for BumpBranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn release_slug(name_no_scope: &str, next_version: &str) -> String {
    format!("{name_no_scope}-v{next_version}")
}

pub fn commit_message(name_no_scope: &str, next_version: &str) -> String {
    format!("bump! {}", release_slug(name_no_scope, next_version))
}

/// Tag name pattern with one `{version}` and at most one `{name}` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTemplate {
    canonical: String,
}

impl Default for TagTemplate {
    fn default() -> Self {
        Self {
            canonical: crate::config::DEFAULT_TAG_TEMPLATE.to_string(),
        }
    }
}

impl TagTemplate {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            bail!("Tag template cannot be empty.");
        }

        if trimmed.match_indices(VERSION_TOKEN).count() != 1 {
            bail!(
                "Tag template `{trimmed}` must include exactly one `{}` token.",
                VERSION_TOKEN
            );
        }
        if trimmed.match_indices(NAME_TOKEN).count() > 1 {
            bail!(
                "Tag template `{trimmed}` may include `{}` at most once.",
                NAME_TOKEN
            );
        }
        let forbidden = |ch: char| ch.is_whitespace() || matches!(ch, '~' | '^' | ':');
        if trimmed.chars().any(forbidden) {
            bail!("Tag template `{trimmed}` contains characters git does not allow in tags.");
        }

        Ok(Self {
            canonical: trimmed.to_string(),
        })
    }

    pub fn render(&self, name_no_scope: &str, version: &str) -> String {
        self.canonical
            .replace(NAME_TOKEN, name_no_scope)
            .replace(VERSION_TOKEN, version)
    }
}
