mod exit;
mod output;
mod responder;

use crate::model::{LaunchConfig, LaunchEvent, LaunchReport, ResponseTrigger, StderrMode};
use anyhow::{Context, Result};
use futures::StreamExt;
use output::{Line, LineReader};
use responder::{PromptWatch, Responder};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{ChildStderr, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type EventTx = mpsc::UnboundedSender<LaunchEvent>;

pub struct Launcher {
    cfg: LaunchConfig,
}

impl Launcher {
    pub fn new(cfg: LaunchConfig) -> Self {
        Self { cfg }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.cfg.program);
        command
            .args(&self.cfg.args)
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(match self.cfg.stderr {
                StderrMode::Inherit => Stdio::inherit(),
                StderrMode::Relay => Stdio::piped(),
                StderrMode::Discard => Stdio::null(),
            });
        if let Some(dir) = &self.cfg.working_dir {
            command.current_dir(dir);
        }
        command
    }

    /// Spawn the tool, answer its prompt, stream its stdout and wait for it.
    ///
    /// There is no timeout: a child that never exits keeps this future pending.
    pub async fn run(self, event_tx: EventTx) -> Result<LaunchReport> {
        let run_id = self.cfg.run_id.clone();
        let timestamp_utc = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into());

        info!(%run_id, command = %self.cfg.command_line(), "launching migration tool");
        let started = Instant::now();
        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("failed to launch `{}`", self.cfg.program))?;

        let pid = child.id();
        debug!(%run_id, ?pid, "child spawned");
        let _ = event_tx.send(LaunchEvent::Spawned { pid });

        let stdin = child.stdin.take().context("child stdin was not piped")?;
        let stdout = child.stdout.take().context("child stdout was not piped")?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(relay_stderr(stderr, event_tx.clone())));

        let mut responder = Responder::new(stdin, &self.cfg.response, self.cfg.close_stdin);
        let reader = LineReader::new(stdout);

        let stdout_lines = match converse(
            &self.cfg.trigger,
            reader,
            &mut responder,
            started,
            &event_tx,
            &run_id,
        )
        .await
        {
            Ok(count) => count,
            Err(e) => {
                // Do not leave the child or the relay behind holding event_tx.
                if let Some(handle) = &stderr_task {
                    handle.abort();
                }
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(e);
            }
        };
        debug!(%run_id, stdout_lines, "child stdout closed");

        let status = child.wait().await.context("failed to wait for child")?;
        let response_sent = responder.sent();
        // Stdin is held open until the child is gone.
        drop(responder);

        let stderr_lines = match stderr_task {
            Some(handle) => handle.await.context("stderr relay task failed")??,
            None => 0,
        };

        let code = exit::exit_code(status);
        let signal = exit::signal(status);
        let elapsed = started.elapsed();
        match signal {
            Some(signal) => warn!(%run_id, signal, code, "migration tool killed by signal"),
            None => info!(%run_id, code, ?elapsed, "migration tool exited"),
        }
        let _ = event_tx.send(LaunchEvent::Exited { code, signal });

        Ok(LaunchReport {
            run_id,
            timestamp_utc,
            program: self.cfg.program.clone(),
            args: self.cfg.args.clone(),
            exit_code: code,
            signal,
            response_sent,
            stdout_lines,
            stderr_lines,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }
}

async fn send_response<W: AsyncWrite + Unpin>(
    responder: &mut Responder<W>,
    started: Instant,
    event_tx: &EventTx,
    run_id: &str,
) -> Result<()> {
    if responder.respond().await? {
        let after = started.elapsed();
        info!(%run_id, ?after, "sent scripted response");
        let _ = event_tx.send(LaunchEvent::ResponseSent { after });
    }
    Ok(())
}

/// Answer the prompt according to `trigger` and forward stdout until it closes.
async fn converse<R, W>(
    trigger: &ResponseTrigger,
    mut reader: LineReader<R>,
    responder: &mut Responder<W>,
    started: Instant,
    event_tx: &EventTx,
    run_id: &str,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match trigger {
        ResponseTrigger::Delay { delay } => {
            tokio::time::sleep(*delay).await;
            send_response(responder, started, event_tx, run_id).await?;
            stream_stdout(reader, event_tx).await
        }
        ResponseTrigger::Prompt { pattern } => {
            let watch = PromptWatch::new(pattern.as_str());
            watch_for_prompt(&mut reader, &watch, responder, started, event_tx, run_id).await
        }
    }
}

/// Forward stdout lines until the child closes the pipe.
async fn stream_stdout<R: AsyncRead + Unpin>(
    reader: LineReader<R>,
    event_tx: &EventTx,
) -> Result<u64> {
    let lines = reader.into_lines();
    futures::pin_mut!(lines);
    let mut count = 0u64;
    while let Some(line) = lines.next().await {
        let event = match line.context("failed to read child stdout")? {
            Line::Full(text) => LaunchEvent::StdoutLine(text),
            Line::Tail(text) => LaunchEvent::StdoutTail(text),
        };
        let _ = event_tx.send(event);
        count += 1;
    }
    Ok(count)
}

/// Forward stdout lines and answer the first time the prompt shows up,
/// either in a completed line or in the unterminated tail.
async fn watch_for_prompt<R, W>(
    reader: &mut LineReader<R>,
    watch: &PromptWatch,
    responder: &mut Responder<W>,
    started: Instant,
    event_tx: &EventTx,
    run_id: &str,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut count = 0u64;
    loop {
        while let Some(line) = reader.take_line() {
            let prompted = !responder.sent() && watch.seen(&line);
            let _ = event_tx.send(LaunchEvent::StdoutLine(line));
            count += 1;
            if prompted {
                send_response(responder, started, event_tx, run_id).await?;
            }
        }

        if reader.is_eof() {
            if let Some(rest) = reader.take_rest() {
                let prompted = !responder.sent() && watch.seen(&rest);
                let _ = event_tx.send(LaunchEvent::StdoutTail(rest));
                count += 1;
                if prompted {
                    send_response(responder, started, event_tx, run_id).await?;
                }
            }
            break;
        }

        if !responder.sent() && watch.seen(&reader.partial()) {
            send_response(responder, started, event_tx, run_id).await?;
        }

        reader
            .fill()
            .await
            .context("failed to read child stdout")?;
    }

    if !responder.sent() {
        warn!(
            %run_id,
            pattern = watch.pattern(),
            "stdout closed before the prompt appeared; no response sent"
        );
        let _ = event_tx.send(LaunchEvent::PromptMissed);
    }
    Ok(count)
}

async fn relay_stderr(stderr: ChildStderr, event_tx: EventTx) -> Result<u64> {
    let lines = LineReader::new(stderr).into_lines();
    futures::pin_mut!(lines);
    let mut count = 0u64;
    while let Some(line) = lines.next().await {
        let line = line.context("failed to read child stderr")?;
        let _ = event_tx.send(LaunchEvent::StderrLine(line.text().to_owned()));
        count += 1;
    }
    Ok(count)
}
