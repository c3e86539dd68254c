use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where a colliding ref was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefLocation {
    Local,
    Remote(String),
}

impl fmt::Display for RefLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("in the local repository"),
            Self::Remote(remote) => write!(f, "on remote `{remote}`"),
        }
    }
}

/// Fatal failure classes of a bump run. Raised inside `anyhow::Error` so
/// callers can recover the class with `downcast_ref` through context layers.
#[derive(Debug, Error)]
pub enum BumpError {
    #[error("package.json does not exist in directory: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("package.json could not be read: {}: {reason}", .path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Preflight check failed: {0}")]
    Preflight(String),

    #[error("The {kind} `{name}` already exists {location}. Nothing was committed.")]
    Collision {
        kind: &'static str,
        name: String,
        location: RefLocation,
    },

    #[error("Command `{command}` failed (exit {code}): {details}")]
    CommandFailed {
        command: String,
        code: i32,
        details: String,
    },

    #[error("Failed to execute `{program}`. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cancelled by operator. No changes were made.")]
    Cancelled,
}

impl BumpError {
    pub fn manifest_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn preflight(message: impl Into<String>) -> Self {
        Self::Preflight(message.into())
    }
}
