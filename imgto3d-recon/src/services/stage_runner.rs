//! External stage execution
//!
//! One stage is one external-tool process. Its stdout and stderr are merged
//! line by line, forwarded to the caller as they arrive, and the trailing
//! characters are kept for failure reports.

use async_trait::async_trait;
use imgto3d_common::{Error, Result};
use std::fmt;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A fully built external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    /// Stage label used in logs and errors
    pub stage: String,
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for StageInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a stage process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// `None` when the process could not start or was killed by a signal
    pub exit_code: Option<i32>,
    /// Bounded tail of merged output (empty when cancelled)
    pub output_tail: String,
    pub cancelled: bool,
}

impl StageOutcome {
    pub fn success(&self) -> bool {
        !self.cancelled && self.exit_code == Some(0)
    }

    pub fn cancelled() -> Self {
        Self {
            exit_code: None,
            output_tail: String::new(),
            cancelled: true,
        }
    }
}

/// Per-line output callback
pub type LineSink<'a> = dyn for<'l> Fn(&'l str) + Send + Sync + 'a;

/// Runs one external stage to completion
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Run `invocation`, calling `on_line` for every output line
    ///
    /// Cancellation kills the process and yields [`StageOutcome::cancelled`].
    /// Non-zero exits are reported in the outcome, not as `Err`.
    async fn run(
        &self,
        invocation: &StageInvocation,
        on_line: &LineSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome>;
}

/// Runs stages as child processes via `tokio::process`
#[derive(Debug, Clone)]
pub struct ProcessStageRunner {
    log_tail_chars: usize,
}

impl ProcessStageRunner {
    pub fn new(log_tail_chars: usize) -> Self {
        Self { log_tail_chars }
    }
}

impl Default for ProcessStageRunner {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_LOG_TAIL_CHARS)
    }
}

#[async_trait]
impl StageRunner for ProcessStageRunner {
    async fn run(
        &self,
        invocation: &StageInvocation,
        on_line: &LineSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        debug!(stage = %invocation.stage, "Running: {}", invocation);

        let mut child = match Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(stage = %invocation.stage, "Failed to start {}: {}", invocation.program, e);
                let mut tail = TailBuffer::new(self.log_tail_chars);
                tail.push_line(&format!("Failed to start {}: {}", invocation.program, e));
                return Ok(StageOutcome {
                    exit_code: None,
                    output_tail: tail.into_string(),
                    cancelled: false,
                });
            }
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("stderr not captured")))?;
        let mut out_reader = BufReader::new(stdout);
        let mut err_reader = BufReader::new(stderr);
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let mut out_open = true;
        let mut err_open = true;
        let mut tail = TailBuffer::new(self.log_tail_chars);

        // Raw byte lines: tools print file names in whatever encoding they got
        while out_open || err_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    kill(&mut child, &invocation.stage).await;
                    return Ok(StageOutcome::cancelled());
                }
                read = read_raw_line(&mut out_reader, &mut out_buf), if out_open => {
                    out_open = forward_line(read, &mut out_buf, &mut tail, on_line, &invocation.stage);
                }
                read = read_raw_line(&mut err_reader, &mut err_buf), if err_open => {
                    err_open = forward_line(read, &mut err_buf, &mut tail, on_line, &invocation.stage);
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                kill(&mut child, &invocation.stage).await;
                return Ok(StageOutcome::cancelled());
            }
            status = child.wait() => status?,
        };

        Ok(StageOutcome {
            exit_code: status.code(),
            output_tail: tail.into_string(),
            cancelled: false,
        })
    }
}

async fn read_raw_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_until(b'\n', buf).await
}

/// Forward one completed read; returns whether the stream is still open
fn forward_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    tail: &mut TailBuffer,
    on_line: &LineSink<'_>,
    stage: &str,
) -> bool {
    match read {
        Ok(0) => false,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            buf.clear();
            tail.push_line(&line);
            on_line(&line);
            true
        }
        Err(e) => {
            warn!(stage, "Failed to read stage output: {}", e);
            false
        }
    }
}

async fn kill(child: &mut tokio::process::Child, stage: &str) {
    if let Err(e) = child.kill().await {
        warn!(stage, "Failed to kill stage process: {}", e);
    } else {
        debug!(stage, "Stage process killed");
    }
}

/// Keeps the last `max_chars` characters of appended lines
#[derive(Debug, Clone)]
pub struct TailBuffer {
    buf: String,
    max_chars: usize,
}

impl TailBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buf: String::new(),
            max_chars,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');

        let excess = self.buf.chars().count().saturating_sub(self.max_chars);
        if excess > 0 {
            let cut = self
                .buf
                .char_indices()
                .nth(excess)
                .map_or(self.buf.len(), |(i, _)| i);
            self.buf.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}
