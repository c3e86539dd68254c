use crate::error::BumpError;
use anyhow::{Context, Result, anyhow};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// How a child process's output is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Pipe stdout/stderr and collect them into the result.
    #[default]
    Capture,
    /// Hand the controlling terminal to the child (credential prompts and the
    /// like). Nothing is captured.
    Inherit,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output: OutputMode,
    /// Values masked in every log line and error message.
    pub redact: Vec<String>,
}

impl RunOptions {
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn redacting(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.redact.push(secret);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait CommandRunner {
    /// Runs one external process to completion. A non-zero exit is returned
    /// as data; only a failure to launch is an error.
    fn run(
        &mut self,
        cwd: &Path,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandResult>;
}

pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &mut self,
        cwd: &Path,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandResult> {
        log::debug!(
            "running `{}` in `{}`",
            redact(&format_command(program, args), &options.redact),
            cwd.display()
        );

        let mut command = Command::new(program);
        command.args(args).current_dir(cwd);

        match options.output {
            OutputMode::Inherit => {
                let status = command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .map_err(|source| spawn_error(program, source))?;
                Ok(CommandResult {
                    exit_code: exit_code(status),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            OutputMode::Capture => {
                let mut child = command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|source| spawn_error(program, source))?;

                let stdout_pipe = child.stdout.take();
                let stderr_pipe = child.stderr.take();
                let (stdout, stderr) = thread::scope(|scope| -> Result<(String, String)> {
                    let stderr_reader =
                        scope.spawn(|| drain(stderr_pipe, program, "stderr", &options.redact));
                    let stdout = drain(stdout_pipe, program, "stdout", &options.redact)
                        .with_context(|| format!("Failed to read stdout of `{program}`."))?;
                    let stderr = stderr_reader
                        .join()
                        .map_err(|_| anyhow!("stderr reader for `{program}` panicked"))?
                        .with_context(|| format!("Failed to read stderr of `{program}`."))?;
                    Ok((stdout, stderr))
                })?;

                let status = child
                    .wait()
                    .with_context(|| format!("Failed to wait for `{program}` to exit."))?;

                Ok(CommandResult {
                    exit_code: exit_code(status),
                    stdout,
                    stderr,
                })
            }
        }
    }
}

fn spawn_error(program: &str, source: io::Error) -> anyhow::Error {
    BumpError::Spawn {
        program: program.to_string(),
        source,
    }
    .into()
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

fn drain<R: Read>(
    pipe: Option<R>,
    program: &str,
    stream: &str,
    secrets: &[String],
) -> io::Result<String> {
    let Some(pipe) = pipe else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(pipe);
    let mut collected = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        log::trace!("{program} {stream}: {}", redact(text.trim_end(), secrets));
        collected.push_str(&text);
    }

    Ok(collected)
}

/// Runs a command and turns a non-zero exit into a `CommandFailed` error
/// carrying whatever the process wrote.
pub fn run_checked(
    runner: &mut dyn CommandRunner,
    cwd: &Path,
    program: &str,
    args: Vec<String>,
    options: &RunOptions,
    context: &str,
) -> Result<CommandResult> {
    let output = runner.run(cwd, program, &args, options)?;
    if !output.success() {
        let failure = BumpError::CommandFailed {
            command: redact(&format_command(program, &args), &options.redact),
            code: output.exit_code,
            details: redact(&failure_details(&output), &options.redact),
        };
        return Err(anyhow::Error::new(failure).context(context.to_string()));
    }
    Ok(output)
}

pub fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub fn format_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        return program.to_string();
    }
    format!("{program} {}", args.join(" "))
}

pub fn redact(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_string(), |acc, secret| {
            acc.replace(secret.as_str(), "***")
        })
}

fn failure_details(output: &CommandResult) -> String {
    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();
    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => "no output captured".to_string(),
        (false, true) => stderr.to_string(),
        (true, false) => stdout.to_string(),
        (false, false) => format!("{stderr}\n{stdout}"),
    }
}
