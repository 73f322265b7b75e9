use futures::Stream;
use std::borrow::Cow;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One unit of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Line {
    /// Newline-terminated; terminator stripped.
    Full(String),
    /// Bytes left when the pipe closed without a final newline, kept as-is.
    Tail(String),
}

impl Line {
    pub fn text(&self) -> &str {
        match self {
            Line::Full(text) | Line::Tail(text) => text,
        }
    }
}

/// Line splitter over a child pipe.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte character split
/// across reads is only decoded once its line is complete. The unterminated
/// tail stays visible through [`LineReader::partial`] for prompt matching.
pub(crate) struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(8 * 1024),
            eof: false,
        }
    }

    /// Read whatever the pipe has next. Returns 0 once the writer closed it.
    pub async fn fill(&mut self) -> io::Result<usize> {
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Pop the next complete line, terminator stripped.
    pub fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        Some(decode(line))
    }

    /// Text received after the last newline.
    pub fn partial(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    /// Drain the unterminated tail, if any. Only meaningful at EOF.
    pub fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub async fn next_line(&mut self) -> io::Result<Option<Line>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(Line::Full(line)));
            }
            if self.eof {
                return Ok(self.take_rest().map(Line::Tail));
            }
            self.fill().await?;
        }
    }

    /// Lazy, finite sequence of lines ending when the pipe closes.
    /// A read error is yielded once and ends the sequence.
    pub fn into_lines(self) -> impl Stream<Item = io::Result<Line>> {
        futures::stream::unfold(self, |mut reader| async move {
            match reader.next_line().await {
                Ok(Some(line)) => Some((Ok(line), reader)),
                Ok(None) => None,
                Err(e) => {
                    reader.eof = true;
                    reader.buf.clear();
                    Some((Err(e), reader))
                }
            }
        })
    }
}

fn decode(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8_lossy(&line).into_owned()
}
