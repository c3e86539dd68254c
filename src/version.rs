use crate::config::ResolvedConfig;
use crate::package::{self, PackageEntry};
use crate::runner::{CommandRunner, RunOptions, args, run_checked};
use anyhow::{Context, Result, bail};
use semver::Version;
use similar::TextDiff;
use std::fmt;
use std::fs;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReleaseType {
    Patch,
    Minor,
    Major,
}

impl ReleaseType {
    pub const ALL: [ReleaseType; 3] = [Self::Patch, Self::Minor, Self::Major];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Patch => "Bug fixes",
            Self::Minor => "Backwards compatible features",
            Self::Major => "Contains breaking changes",
        }
    }

    /// Where `current` lands after this release, following npm's rules for
    /// stable versions.
    pub fn apply(self, current: &Version) -> Version {
        let mut next = current.clone();
        let was_prerelease = !current.pre.is_empty();
        match self {
            Self::Major => {
                if !(was_prerelease && current.minor == 0 && current.patch == 0) {
                    next.major += 1;
                }
                next.minor = 0;
                next.patch = 0;
            }
            Self::Minor => {
                if !(was_prerelease && current.patch == 0) {
                    next.minor += 1;
                }
                next.patch = 0;
            }
            Self::Patch => {
                if !was_prerelease {
                    next.patch += 1;
                }
            }
        }
        next.pre = semver::Prerelease::EMPTY;
        next.build = semver::BuildMetadata::EMPTY;
        next
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for ReleaseType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            _ => bail!(
                "Invalid release type \"{}\". Release must match major|minor|patch",
                value.trim()
            ),
        }
    }
}

/// Increments the manifest version through the package manager and returns
/// the version read back from disk.
pub fn bump(
    runner: &mut dyn CommandRunner,
    config: &ResolvedConfig,
    package: &PackageEntry,
    release_type: ReleaseType,
) -> Result<String> {
    let before = read_manifest_text(package)?;
    log::info!(
        "Running '{} version' with \"{release_type}\" for {}",
        config.package_manager,
        package.name
    );

    run_checked(
        runner,
        &package.directory,
        &config.package_manager,
        args(&["version", release_type.as_str(), "--git-tag-version=false"]),
        &RunOptions::default(),
        "Failed to bump the package version.",
    )?;

    let bumped = package::read_package(&package.directory)
        .context("Failed to re-read the manifest after bumping.")?;
    if bumped.version == package.version {
        bail!(
            "`{} version {release_type}` left {} at {}. Nothing was bumped.",
            config.package_manager,
            package.name,
            package.version
        );
    }

    warn_on_unexpected_version(&package.version, &bumped.version, release_type);
    log_manifest_diff(package, &before)?;
    Ok(bumped.version)
}

/// Sets the manifest version to an explicit value. Re-applying the current
/// version is allowed and normalises the manifest formatting.
pub fn set_version(
    runner: &mut dyn CommandRunner,
    config: &ResolvedConfig,
    package: &PackageEntry,
    version: &str,
) -> Result<()> {
    run_checked(
        runner,
        &package.directory,
        &config.package_manager,
        args(&[
            "version",
            "--allow-same-version=true",
            "--git-tag-version=false",
            version,
        ]),
        &RunOptions::default(),
        "Failed to set the package version.",
    )?;

    let current = package::read_package(&package.directory)?;
    if current.version != version {
        bail!(
            "Expected {} to be at version {version} but the manifest says {}.",
            package.name,
            current.version
        );
    }
    Ok(())
}

fn warn_on_unexpected_version(previous: &str, next: &str, release_type: ReleaseType) {
    let (Ok(previous), Ok(next)) = (Version::parse(previous), Version::parse(next)) else {
        log::warn!("could not compare versions `{previous}` and `{next}` as semver");
        return;
    };

    let expected = release_type.apply(&previous);
    if next != expected {
        log::warn!("expected a {release_type} release of {previous} to be {expected}, got {next}");
    }
}

fn read_manifest_text(package: &PackageEntry) -> Result<String> {
    fs::read_to_string(&package.manifest_path)
        .with_context(|| format!("Failed to read `{}`.", package.manifest_path.display()))
}

fn log_manifest_diff(package: &PackageEntry, before: &str) -> Result<()> {
    let after = read_manifest_text(package)?;
    let diff = TextDiff::from_lines(before, after.as_str());
    let unified = diff
        .unified_diff()
        .context_radius(1)
        .header("before", "after")
        .to_string();

    if !unified.trim().is_empty() {
        log::info!(
            "{} changes:\n{}",
            package.manifest_path.display(),
            unified.trim_end()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandResult;
    use std::path::Path;
    use tempfile::tempdir;

    /// Plays `npm version`: rewrites the manifest version.
    struct FakeNpm {
        write_version: Option<String>,
        exit_code: i32,
        calls: Vec<Vec<String>>,
    }

    impl CommandRunner for FakeNpm {
        fn run(
            &mut self,
            cwd: &Path,
            _program: &str,
            args: &[String],
            _options: &RunOptions,
        ) -> Result<CommandResult> {
            self.calls.push(args.to_vec());
            if self.exit_code == 0
                && let Some(version) = &self.write_version
            {
                let manifest = cwd.join("package.json");
                let content = fs::read_to_string(&manifest).unwrap();
                let mut value: serde_json::Value = serde_json::from_str(&content).unwrap();
                value["version"] = serde_json::Value::String(version.clone());
                fs::write(&manifest, serde_json::to_string_pretty(&value).unwrap()).unwrap();
            }
            Ok(CommandResult {
                exit_code: self.exit_code,
                stdout: String::new(),
                stderr: if self.exit_code == 0 {
                    String::new()
                } else {
                    "npm ERR! Version not changed".to_string()
                },
            })
        }
    }

    fn package_at(root: &Path, version: &str) -> PackageEntry {
        fs::write(
            root.join("package.json"),
            format!(r#"{{ "name": "@acme/widgets", "version": "{version}" }}"#),
        )
        .unwrap();
        package::read_package(root).unwrap()
    }

    #[test]
    fn parses_release_types() {
        assert_eq!("patch".parse::<ReleaseType>().unwrap(), ReleaseType::Patch);
        assert_eq!(
            " Minor ".parse::<ReleaseType>().unwrap(),
            ReleaseType::Minor
        );
        assert_eq!("major".parse::<ReleaseType>().unwrap(), ReleaseType::Major);

        let err = "prerelease".parse::<ReleaseType>().unwrap_err();
        assert!(err.to_string().contains("major|minor|patch"));
    }

    #[test]
    fn applies_release_types_like_npm() {
        let base = Version::parse("1.2.3").unwrap();
        assert_eq!(ReleaseType::Patch.apply(&base), Version::new(1, 2, 4));
        assert_eq!(ReleaseType::Minor.apply(&base), Version::new(1, 3, 0));
        assert_eq!(ReleaseType::Major.apply(&base), Version::new(2, 0, 0));

        let pre = Version::parse("2.0.0-rc.1").unwrap();
        assert_eq!(ReleaseType::Major.apply(&pre), Version::new(2, 0, 0));
        assert_eq!(ReleaseType::Patch.apply(&pre), Version::new(2, 0, 0));
    }

    #[test]
    fn bump_returns_version_read_back_from_manifest() {
        let temp_dir = tempdir().unwrap();
        let package = package_at(temp_dir.path(), "1.2.3");
        let mut runner = FakeNpm {
            write_version: Some("1.3.0".to_string()),
            exit_code: 0,
            calls: Vec::new(),
        };

        let next = bump(
            &mut runner,
            &ResolvedConfig::default(),
            &package,
            ReleaseType::Minor,
        )
        .unwrap();

        assert_eq!(next, "1.3.0");
        assert_eq!(
            runner.calls,
            vec![vec![
                "version".to_string(),
                "minor".to_string(),
                "--git-tag-version=false".to_string()
            ]]
        );
    }

    #[test]
    fn bump_fails_when_manifest_is_unchanged() {
        let temp_dir = tempdir().unwrap();
        let package = package_at(temp_dir.path(), "1.2.3");
        let mut runner = FakeNpm {
            write_version: None,
            exit_code: 0,
            calls: Vec::new(),
        };

        let err = bump(
            &mut runner,
            &ResolvedConfig::default(),
            &package,
            ReleaseType::Patch,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Nothing was bumped"));
    }

    #[test]
    fn bump_fails_on_non_zero_exit() {
        let temp_dir = tempdir().unwrap();
        let package = package_at(temp_dir.path(), "1.2.3");
        let mut runner = FakeNpm {
            write_version: Some("1.2.4".to_string()),
            exit_code: 1,
            calls: Vec::new(),
        };

        let err = bump(
            &mut runner,
            &ResolvedConfig::default(),
            &package,
            ReleaseType::Patch,
        )
        .unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("Failed to bump the package version."));
        assert!(text.contains("npm ERR! Version not changed"));
        assert_eq!(
            package::read_package(temp_dir.path()).unwrap().version,
            "1.2.3"
        );
    }

    #[test]
    fn set_version_allows_same_version() {
        let temp_dir = tempdir().unwrap();
        let package = package_at(temp_dir.path(), "0.9.0");
        let mut runner = FakeNpm {
            write_version: Some("0.9.0".to_string()),
            exit_code: 0,
            calls: Vec::new(),
        };

        set_version(&mut runner, &ResolvedConfig::default(), &package, "0.9.0").unwrap();
        assert!(runner.calls[0].contains(&"--allow-same-version=true".to_string()));
    }
}
