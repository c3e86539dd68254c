use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "bumpr",
    version,
    about = "Bump a package version on its own branch and open a pull request",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Repository directory to work in. Defaults to the current directory.
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bump, commit, tag and push from a GitHub Actions job. Inputs are read
    /// from the job environment.
    Action,
}
