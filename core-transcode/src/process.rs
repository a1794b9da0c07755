//! # External Codec Process
//!
//! [`CodecProcess`] owns one invocation of an external codec tool. Input is
//! written to the child's stdin while stdout and stderr are drained
//! concurrently, so neither side can block on a full pipe. The whole exchange
//! is bounded by a deadline. On timeout the child is killed and reaped before
//! the error is returned, and dropping the handle early kills the child too.

use crate::error::{Result, TranscodeError};
use bytes::Bytes;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

/// Scoped handle to a running codec process.
pub struct CodecProcess {
    child: Child,
    program: String,
    stderr_tail_bytes: usize,
}

impl CodecProcess {
    /// Launch `program` with piped stdio.
    ///
    /// # Errors
    ///
    /// [`TranscodeError::EncoderUnavailable`] if the program cannot be started.
    pub fn spawn<S: AsRef<str>>(
        program: &Path,
        args: &[S],
        stderr_tail_bytes: usize,
    ) -> Result<Self> {
        let name = program.display().to_string();

        let mut command = Command::new(program);
        for arg in args {
            command.arg(arg.as_ref());
        }

        let child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(program = %name, "Failed to launch codec: {}", e);
                TranscodeError::EncoderUnavailable {
                    program: name.clone(),
                    reason: e.to_string(),
                }
            })?;

        debug!(program = %name, pid = ?child.id(), "Codec process started");

        Ok(Self {
            child,
            program: name,
            stderr_tail_bytes,
        })
    }

    /// OS process id, while the child has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Feed `input` on stdin and collect stdout until the process exits.
    ///
    /// # Errors
    ///
    /// - [`TranscodeError::Timeout`] if `deadline` passes first; the child is
    ///   killed and waited for
    /// - [`TranscodeError::EncoderFailed`] on a non-zero exit, carrying the
    ///   tail of stderr
    #[instrument(skip(self, input), fields(program = %self.program, pid = ?self.child.id(), bytes = input.len()))]
    pub async fn communicate(mut self, input: Bytes, deadline: Instant) -> Result<Vec<u8>> {
        let started = Instant::now();
        let (mut stdin, mut stdout, mut stderr) = match (
            self.child.stdin.take(),
            self.child.stdout.take(),
            self.child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                return Err(TranscodeError::EncoderUnavailable {
                    program: self.program.clone(),
                    reason: "stdio pipes were not captured".to_string(),
                })
            }
        };

        let child = &mut self.child;
        let exchange = async move {
            let write = async move {
                let result = stdin.write_all(&input).await;
                // Closing stdin signals end of input
                drop(stdin);
                result
            };
            let read_stdout = async {
                let mut out = Vec::new();
                stdout.read_to_end(&mut out).await.map(|_| out)
            };
            let read_stderr = async {
                let mut err = Vec::new();
                stderr.read_to_end(&mut err).await.map(|_| err)
            };

            let (written, out, err) = tokio::join!(write, read_stdout, read_stderr);
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((written, out?, err?, status))
        };

        let outcome = tokio::time::timeout_at(deadline, exchange).await;
        match outcome {
            Ok(Ok((written, out, err, status))) => self.finish(written, out, err, status),
            Ok(Err(e)) => {
                error!("Codec I/O failed: {}", e);
                self.kill().await;
                Err(TranscodeError::Io(e))
            }
            Err(_) => {
                let elapsed = started.elapsed();
                warn!(?elapsed, "Codec exceeded its deadline, killing");
                self.kill().await;
                Err(TranscodeError::Timeout { elapsed })
            }
        }
    }

    fn finish(
        &self,
        written: std::io::Result<()>,
        out: Vec<u8>,
        err: Vec<u8>,
        status: ExitStatus,
    ) -> Result<Vec<u8>> {
        if !status.success() {
            let stderr = self.stderr_tail(&err);
            error!(%status, stderr = %stderr, "Codec exited unsuccessfully");
            return Err(TranscodeError::EncoderFailed {
                status: status.to_string(),
                stderr,
            });
        }

        // A successful exit with unread input means the tool ignored part of
        // the stream
        if let Err(e) = written {
            warn!("Codec exited before consuming all input: {}", e);
            return Err(TranscodeError::EncoderFailed {
                status: status.to_string(),
                stderr: format!("input not fully consumed: {}", e),
            });
        }

        debug!(bytes = out.len(), "Codec finished");
        Ok(out)
    }

    /// Kill the child and wait for it, so no zombie is left behind.
    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            // Already exited and reaped
            debug!("Kill after exit: {}", e);
        }
    }

    fn stderr_tail(&self, stderr: &[u8]) -> String {
        let start = stderr.len().saturating_sub(self.stderr_tail_bytes);
        String::from_utf8_lossy(&stderr[start..]).trim().to_string()
    }
}
