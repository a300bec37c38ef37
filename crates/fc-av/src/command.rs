//! Builder for executing external tool commands with timeout and
//! cancellation support.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// How a streamed execution ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The process exited on its own. Non-zero statuses are not turned into
    /// errors here; the caller decides.
    Exited {
        status: ExitStatus,
        /// Last stderr lines, oldest first.
        stderr_tail: Vec<String>,
    },
    /// The cancellation token fired and the process was killed.
    Cancelled,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use fc_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> fc_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-version")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Arguments collected so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`fc_core::Error::Tool`] if spawning fails, the process times
    /// out, or it exits with a non-zero status (message includes stderr).
    pub async fn execute(&self) -> fc_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = self.command();
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| fc_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // The child is killed on drop, so a timeout does not leak it.
        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(fc_core::Error::tool(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(fc_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(fc_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    /// Execute the command, handing each stderr line to `on_line` as it
    /// arrives.
    ///
    /// When `cancel` fires the process is killed and
    /// [`StreamOutcome::Cancelled`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`fc_core::Error::Tool`] if spawning fails, stderr cannot be
    /// read (including invalid UTF-8), or the timeout expires.
    pub async fn execute_with_stderr_callback(
        &self,
        mut on_line: impl FnMut(&str),
        cancel: Option<CancellationToken>,
    ) -> fc_core::Result<StreamOutcome> {
        let program_name = self.program_name();
        let cancel = cancel.unwrap_or_default();

        let mut cmd = self.command();
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| fc_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;
        tracing::debug!(tool = %program_name, pid = ?child.id(), "spawned");

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| fc_core::Error::tool(&program_name, "stderr was not captured"))?;
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    kill(&mut child, &program_name).await;
                    return Ok(StreamOutcome::Cancelled);
                }
                _ = &mut deadline => {
                    kill(&mut child, &program_name).await;
                    return Err(fc_core::Error::tool(
                        program_name,
                        format!("timed out after {:?}", self.timeout),
                    ));
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        on_line(&line);
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        kill(&mut child, &program_name).await;
                        return Err(fc_core::Error::tool(
                            program_name,
                            format!("malformed output stream: {e}"),
                        ));
                    }
                },
            }
        }

        // stderr closed; the process is exiting.
        let waited = tokio::select! {
            _ = cancel.cancelled() => Waited::Cancelled,
            _ = &mut deadline => Waited::TimedOut,
            status = child.wait() => Waited::Exited(status),
        };
        let status = match waited {
            Waited::Cancelled => {
                kill(&mut child, &program_name).await;
                return Ok(StreamOutcome::Cancelled);
            }
            Waited::TimedOut => {
                kill(&mut child, &program_name).await;
                return Err(fc_core::Error::tool(
                    program_name,
                    format!("timed out after {:?}", self.timeout),
                ));
            }
            Waited::Exited(status) => status.map_err(|e| {
                fc_core::Error::tool(&program_name, format!("I/O error waiting for process: {e}"))
            })?,
        };

        tracing::debug!(tool = %program_name, %status, "exited");
        Ok(StreamOutcome::Exited {
            status,
            stderr_tail: tail.into_iter().collect(),
        })
    }
}

enum Waited {
    Cancelled,
    TimedOut,
    Exited(std::io::Result<ExitStatus>),
}

async fn kill(child: &mut Child, program_name: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!(tool = %program_name, "failed to kill process: {e}");
    } else {
        tracing::info!(tool = %program_name, "killed process");
    }
}
