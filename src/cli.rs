use crate::engine::Launcher;
use crate::model::{LaunchConfig, LaunchEvent, LaunchReport, ResponseTrigger, StderrMode};
use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_PROGRAM: &str = "npx";
pub const DEFAULT_ARGS: [&str; 2] = ["drizzle-kit", "push:mysql"];

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    /// Final stdout fragment with no terminator; written as-is.
    StdoutTail(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
///
/// Only this writer touches stdout, so it keeps the lock. Stderr is shared
/// with the logger and is locked per line.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let mut out = std::io::LineWriter::new(stdout.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::StdoutTail(msg) => {
                    let _ = write!(out, "{}", msg);
                    let _ = out.flush();
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(std::io::stderr().lock(), "{}", msg);
                }
            }
        }

        let _ = out.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "push-migrate",
    version,
    about = "Run an interactive schema migration CLI unattended",
    long_about = "Launches the migration tool (npx drizzle-kit push:mysql by default), \
                  answers its confirmation prompt with a scripted line, relays its output \
                  and exits with its status code."
)]
pub struct Cli {
    /// Executable to launch instead of `npx`
    #[arg(long)]
    pub program: Option<String>,

    /// Line written to the tool's stdin
    #[arg(long, default_value = "0")]
    pub response: String,

    /// How long to wait after launch before answering
    #[arg(long, default_value = "2s")]
    pub delay: humantime::Duration,

    /// Answer as soon as this text appears on the tool's stdout instead of after --delay
    #[arg(long, value_name = "PATTERN", value_parser = clap::builder::NonEmptyStringValueParser::new())]
    pub wait_for: Option<String>,

    /// What to do with the tool's stderr
    #[arg(long, value_enum, default_value_t = StderrMode::Inherit)]
    pub stderr: StderrMode,

    /// Close the tool's stdin right after the response is written
    #[arg(long)]
    pub close_stdin: bool,

    /// Working directory for the tool
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Load variables from a dotenv file before launching (e.g. .env.local)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Fail before launching unless this variable is set and non-empty (repeatable)
    #[arg(long = "require-env", value_name = "VAR")]
    pub require_env: Vec<String>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Arguments for the tool (default: drizzle-kit push:mysql)
    #[arg(last = true, value_name = "ARGS")]
    pub tool_args: Vec<String>,
}

/// Generate a random run ID used to correlate log lines and reports.
fn gen_run_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    u64::from_le_bytes(b).to_string()
}

/// Build a `LaunchConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> LaunchConfig {
    let (program, tool_args) = match (&args.program, args.tool_args.is_empty()) {
        (None, true) => (
            DEFAULT_PROGRAM.to_string(),
            DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
        ),
        (None, false) => (DEFAULT_PROGRAM.to_string(), args.tool_args.clone()),
        (Some(p), _) => (p.clone(), args.tool_args.clone()),
    };

    let trigger = match &args.wait_for {
        Some(pattern) => ResponseTrigger::Prompt {
            pattern: pattern.clone(),
        },
        None => ResponseTrigger::Delay {
            delay: Duration::from(args.delay),
        },
    };

    LaunchConfig {
        run_id: gen_run_id(),
        program,
        args: tool_args,
        response: args.response.clone(),
        trigger,
        stderr: args.stderr,
        close_stdin: args.close_stdin,
        working_dir: args.cwd.clone(),
    }
}

/// Run one launch and return the exit code the process should end with.
pub async fn run(args: Cli) -> Result<i32> {
    crate::preflight::prepare(args.env_file.as_deref(), &args.require_env)?;

    let cfg = build_config(&args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<LaunchEvent>();

    let launcher = Launcher::new(cfg);
    let handle = tokio::spawn(async move { launcher.run(evt_tx).await });

    while let Some(ev) = evt_rx.recv().await {
        match ev {
            LaunchEvent::StdoutLine(line) => {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
            LaunchEvent::StdoutTail(tail) => {
                let _ = out_tx.send(OutputLine::StdoutTail(tail));
            }
            LaunchEvent::StderrLine(line) => {
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
            LaunchEvent::Spawned { pid } => debug!(?pid, "tool started"),
            LaunchEvent::ResponseSent { after } => debug!(?after, "response delivered"),
            // The engine already warned about it.
            LaunchEvent::PromptMissed => {}
            LaunchEvent::Exited { code, signal } => debug!(code, ?signal, "tool finished"),
        }
    }

    let result = handle.await.context("launcher task failed")?;

    // Flush everything the child printed before reporting any error.
    drop(out_tx);
    let _ = out_handle.await;

    let report = result?;
    handle_exports(&args, &report)?;
    Ok(report.exit_code)
}

fn handle_exports(args: &Cli, report: &LaunchReport) -> Result<()> {
    if let Some(p) = args.export_json.as_deref() {
        crate::storage::export_json(p, report)?;
        debug!(path = %p.display(), "exported launch report");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("push-migrate").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_drizzle_push() {
        let cfg = build_config(&parse(&[]));
        assert_eq!(cfg.program, "npx");
        assert_eq!(cfg.args, vec!["drizzle-kit", "push:mysql"]);
        assert_eq!(cfg.response, "0");
        assert_eq!(
            cfg.trigger,
            ResponseTrigger::Delay {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(cfg.stderr, StderrMode::Inherit);
        assert!(!cfg.close_stdin);
        assert!(cfg.run_id.parse::<u64>().is_ok());
    }

    #[test]
    fn test_trailing_args_replace_tool_args() {
        let cfg = build_config(&parse(&["--", "drizzle-kit", "push:pg", "--verbose"]));
        assert_eq!(cfg.program, "npx");
        assert_eq!(cfg.args, vec!["drizzle-kit", "push:pg", "--verbose"]);
    }

    #[test]
    fn test_program_override_drops_default_args() {
        let cfg = build_config(&parse(&["--program", "./bin/drizzle-kit"]));
        assert_eq!(cfg.program, "./bin/drizzle-kit");
        assert!(cfg.args.is_empty());

        let cfg = build_config(&parse(&["--program", "pnpm", "--", "drizzle-kit", "push"]));
        assert_eq!(cfg.command_line(), "pnpm drizzle-kit push");
    }

    #[test]
    fn test_wait_for_selects_prompt_trigger() {
        let cfg = build_config(&parse(&["--wait-for", "?", "--delay", "10s"]));
        assert_eq!(
            cfg.trigger,
            ResponseTrigger::Prompt {
                pattern: "?".into()
            }
        );
    }

    #[test]
    fn test_option_values() {
        let args = parse(&[
            "--delay",
            "500ms",
            "--response",
            "yes",
            "--stderr",
            "relay",
            "--close-stdin",
            "--require-env",
            "DATABASE_HOST",
            "--require-env",
            "DATABASE_NAME",
        ]);
        assert_eq!(args.require_env, vec!["DATABASE_HOST", "DATABASE_NAME"]);
        let cfg = build_config(&args);
        assert_eq!(
            cfg.trigger,
            ResponseTrigger::Delay {
                delay: Duration::from_millis(500)
            }
        );
        assert_eq!(cfg.response, "yes");
        assert_eq!(cfg.stderr, StderrMode::Relay);
        assert!(cfg.close_stdin);
    }

    #[test]
    fn test_rejects_empty_prompt_pattern() {
        assert!(Cli::try_parse_from(["push-migrate", "--wait-for", ""]).is_err());
    }

    #[test]
    fn test_run_ids_differ() {
        assert_ne!(gen_run_id(), gen_run_id());
    }
}
