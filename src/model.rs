use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub run_id: String,
    pub program: String,
    pub args: Vec<String>,
    /// Line written to the child's stdin, without its terminator.
    pub response: String,
    pub trigger: ResponseTrigger,
    pub stderr: StderrMode,
    #[serde(default)]
    pub close_stdin: bool,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl LaunchConfig {
    /// Command line as a single display string, e.g. `npx drizzle-kit push:mysql`.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// When the scripted response is written to the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseTrigger {
    /// Blind wait after spawn, no check that the prompt is on screen.
    Delay {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// First time `pattern` shows up on stdout, partial lines included.
    Prompt { pattern: String },
}

impl Default for ResponseTrigger {
    fn default() -> Self {
        ResponseTrigger::Delay {
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StderrMode {
    /// Child writes straight to our stderr
    #[default]
    Inherit,
    /// Child stderr is read line by line and echoed to our stderr
    Relay,
    /// Child stderr goes to the null device
    Discard,
}

/// Events emitted by the launcher and consumed by the CLI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchEvent {
    Spawned {
        pid: Option<u32>,
    },
    ResponseSent {
        /// Time elapsed between spawn and the write.
        after: Duration,
    },
    /// Stdout closed before the prompt pattern appeared.
    PromptMissed,
    StdoutLine(String),
    /// Bytes after the last newline when stdout closed, echoed without a terminator.
    StdoutTail(String),
    StderrLine(String),
    Exited {
        code: i32,
        signal: Option<i32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchReport {
    pub run_id: String,
    #[serde(default)]
    pub timestamp_utc: String,
    pub program: String,
    pub args: Vec<String>,
    pub exit_code: i32,
    #[serde(default)]
    pub signal: Option<i32>,
    pub response_sent: bool,
    pub stdout_lines: u64,
    pub stderr_lines: u64,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LaunchConfig {
        LaunchConfig {
            run_id: "42".into(),
            program: "npx".into(),
            args: vec!["drizzle-kit".into(), "push:mysql".into()],
            response: "0".into(),
            trigger: ResponseTrigger::default(),
            stderr: StderrMode::default(),
            close_stdin: false,
            working_dir: None,
        }
    }

    #[test]
    fn test_command_line() {
        assert_eq!(config().command_line(), "npx drizzle-kit push:mysql");
    }

    #[test]
    fn test_default_trigger_is_two_second_delay() {
        assert_eq!(
            ResponseTrigger::default(),
            ResponseTrigger::Delay {
                delay: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_trigger_serializes_with_humantime() {
        let json = serde_json::to_value(config().trigger).unwrap();
        assert_eq!(json["kind"], "delay");
        assert_eq!(json["delay"], "2s");

        let prompt: ResponseTrigger =
            serde_json::from_str(r#"{"kind":"prompt","pattern":"?"}"#).unwrap();
        assert_eq!(
            prompt,
            ResponseTrigger::Prompt {
                pattern: "?".into()
            }
        );
    }
}
