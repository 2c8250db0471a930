//! Child-process runner.
//!
//! Spawns argv directly (no shell), streams output line by line to the
//! terminal while capturing it, and enforces the per-command timeout and
//! cancellation by killing the child.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult, ExitCondition, RunOptions};

/// How long to wait for output readers after the child is gone.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of child output.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: OutputStream,
    pub message: String,
}

/// Output handler callback type.
pub type OutputHandler = Arc<dyn Fn(OutputLine) + Send + Sync>;

/// Runs commands as direct child processes.
#[derive(Clone, Default)]
pub struct ProcessRunner {
    output_handler: Option<OutputHandler>,
}

enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a handler receiving every output line.
    pub fn with_output_handler(mut self, handler: OutputHandler) -> Self {
        self.output_handler = Some(handler);
        self
    }

    fn build_command(argv: &[String], options: &RunOptions) -> RunnerResult<(PathBuf, Command)> {
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;
        let executable = options
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(program));

        let mut cmd = Command::new(&executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        Ok((executable, cmd))
    }

    fn spawn_reader<R>(&self, reader: Option<R>, stream: OutputStream, echo: bool) -> Option<JoinHandle<String>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handler = self.output_handler.clone();
        reader.map(|reader| tokio::spawn(collect_lines(reader, stream, echo, handler)))
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        argv: &[String],
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionResult> {
        let (executable, mut cmd) = Self::build_command(argv, options)?;
        let started_at = Utc::now();
        let start = Instant::now();

        info!("Executing: {}", format_command(argv));
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", executable.display(), e);
                return Ok(ExecutionResult::spawn_failed(
                    argv,
                    format!("Failed to spawn {}: {}", executable.display(), e),
                ));
            }
        };

        let stdout_task = self.spawn_reader(child.stdout.take(), OutputStream::Stdout, options.stream_output);
        let stderr_task = self.spawn_reader(child.stderr.take(), OutputStream::Stderr, options.stream_output);

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            _ = tokio::time::sleep(options.timeout) => WaitOutcome::TimedOut,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        let (exit_code, condition) = match outcome {
            WaitOutcome::Exited(status) => (status?.code(), ExitCondition::Exited),
            WaitOutcome::TimedOut => {
                warn!("Command timed out after {:?}, killing it", options.timeout);
                terminate(&mut child).await;
                (None, ExitCondition::TimedOut)
            }
            WaitOutcome::Cancelled => {
                warn!("Cancelled, killing running command");
                terminate(&mut child).await;
                (None, ExitCondition::Cancelled)
            }
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!("Command finished: {:?} {:?} in {}ms", condition, exit_code, duration_ms);

        Ok(ExecutionResult {
            argv: argv.to_vec(),
            exit_code,
            condition,
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        })
    }
}

async fn collect_lines<R>(
    reader: R,
    stream: OutputStream,
    echo: bool,
    handler: Option<OutputHandler>,
) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut output = String::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Output need not be UTF-8; keep draining either way.
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                output.push_str(&line);
                output.push('\n');
                if echo {
                    match stream {
                        OutputStream::Stdout => println!("{}", line),
                        OutputStream::Stderr => eprintln!("{}", line),
                    }
                }
                if let Some(handler) = &handler {
                    handler(OutputLine {
                        timestamp: Utc::now(),
                        stream,
                        message: line,
                    });
                }
            }
            Err(e) => {
                debug!("Stopped reading {}: {}", stream, e);
                break;
            }
        }
    }
    output
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill child process: {}", e);
    }
}

async fn drain(task: Option<JoinHandle<String>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, task).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("Output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            debug!("Output reader still open after {:?}", OUTPUT_DRAIN_TIMEOUT);
            String::new()
        }
    }
}

/// Format argv for logging.
pub fn format_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('\'') {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
