use anyhow::{bail, Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes the scripted response to the child's stdin, at most once.
pub(crate) struct Responder<W> {
    stdin: Option<W>,
    payload: String,
    close_after: bool,
    sent: bool,
}

impl<W: AsyncWrite + Unpin> Responder<W> {
    pub fn new(stdin: W, response: &str, close_after: bool) -> Self {
        Self {
            stdin: Some(stdin),
            payload: format!("{response}\n"),
            close_after,
            sent: false,
        }
    }

    pub fn sent(&self) -> bool {
        self.sent
    }

    /// Write and flush the response line. Returns `false` if it already went out.
    pub async fn respond(&mut self) -> Result<bool> {
        if self.sent {
            return Ok(false);
        }
        let Some(stdin) = self.stdin.as_mut() else {
            bail!("child stdin is already closed");
        };
        stdin
            .write_all(self.payload.as_bytes())
            .await
            .context("failed to write scripted response to child stdin")?;
        stdin
            .flush()
            .await
            .context("failed to flush child stdin")?;
        self.sent = true;

        if self.close_after {
            if let Some(mut stdin) = self.stdin.take() {
                // The child may already be gone; closing is best-effort.
                let _ = stdin.shutdown().await;
            }
        }
        Ok(true)
    }
}

/// Substring match for the prompt-watch trigger.
#[derive(Debug, Clone)]
pub(crate) struct PromptWatch {
    pattern: String,
}

impl PromptWatch {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn seen(&self, text: &str) -> bool {
        !self.pattern.is_empty() && text.contains(&self.pattern)
    }
}
