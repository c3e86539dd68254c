mod action;
mod cli;
mod config;
mod error;
mod flavor;
mod git;
mod interactive;
mod lifecycle;
mod naming;
mod package;
mod publisher;
mod runner;
mod template;
mod version;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn initialize_logger() -> Result<()> {
    let config = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("bumpr")
        .build();

    simplelog::TermLogger::init(
        log_level(
            std::env::var("BUMPR_LOG").ok().as_deref(),
            std::env::var("RUNNER_DEBUG").ok().as_deref(),
        ),
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    Ok(())
}

fn log_level(bumpr_log: Option<&str>, runner_debug: Option<&str>) -> simplelog::LevelFilter {
    match bumpr_log.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("trace") => simplelog::LevelFilter::Trace,
        Some("debug") => simplelog::LevelFilter::Debug,
        _ if runner_debug == Some("1") => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Info,
    }
}

fn main() {
    let cli = Cli::parse();
    let in_action = matches!(cli.command, Some(Commands::Action));

    if let Err(err) = initialize_logger().and_then(|()| run(cli)) {
        eprintln!("Error: {err:#}");
        if in_action {
            println!("::error::{}", workflow_command_escape(&format!("{err:#}")));
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Action) => action::run(),
        None => interactive::run(cli.dir),
    }
}

/// GitHub workflow commands end at the first newline.
fn workflow_command_escape(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_follows_environment() {
        use simplelog::LevelFilter;

        assert_eq!(log_level(None, None), LevelFilter::Info);
        assert_eq!(log_level(Some("trace"), None), LevelFilter::Trace);
        assert_eq!(log_level(Some("DEBUG"), None), LevelFilter::Debug);
        assert_eq!(log_level(None, Some("1")), LevelFilter::Debug);
        assert_eq!(log_level(Some("info"), Some("0")), LevelFilter::Info);
    }

    #[test]
    fn escapes_multiline_errors_for_workflow_commands() {
        assert_eq!(
            workflow_command_escape("Bump failed: 100%\nfatal: nope"),
            "Bump failed: 100%25%0Afatal: nope"
        );
    }
}
