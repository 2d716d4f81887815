//! Process invoker: runs the external test tool and captures its output

use async_trait::async_trait;
use canary_common::ToolSettings;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::InvokeError;
use crate::invocation::Invocation;

/// Time a terminated tool gets to exit before it is killed
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Without a deadline, how long output pipes may stay open after the tool
/// has exited (a background process it left behind can hold them)
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// What one tool execution produced
#[derive(Debug, Clone, PartialEq)]
pub struct RawExecutionResult {
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl RawExecutionResult {
    pub fn exit_class(&self) -> ExitClass {
        ExitClass::from_code(self.exit_code)
    }
}

/// Exit codes as the test tool documents them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Ok,
    TestsFailed,
    Interrupted,
    InternalError,
    UsageError,
    NoTestsCollected,
    Other(i32),
    Signalled,
}

impl ExitClass {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitClass::Ok,
            Some(1) => ExitClass::TestsFailed,
            Some(2) => ExitClass::Interrupted,
            Some(3) => ExitClass::InternalError,
            Some(4) => ExitClass::UsageError,
            Some(5) => ExitClass::NoTestsCollected,
            Some(other) => ExitClass::Other(other),
            None => ExitClass::Signalled,
        }
    }

    /// Anything but "passed" and "some tests failed" is a tool-level error
    pub fn is_tool_error(&self) -> bool {
        !matches!(self, ExitClass::Ok | ExitClass::TestsFailed)
    }

    pub fn describe(&self) -> String {
        match self {
            ExitClass::Ok => "all tests passed".to_string(),
            ExitClass::TestsFailed => "some tests failed".to_string(),
            ExitClass::Interrupted => "test execution was interrupted".to_string(),
            ExitClass::InternalError => "test tool internal error".to_string(),
            ExitClass::UsageError => "test tool usage error".to_string(),
            ExitClass::NoTestsCollected => "no tests were collected".to_string(),
            ExitClass::Other(code) => format!("unknown exit code {}", code),
            ExitClass::Signalled => "test tool was killed by a signal".to_string(),
        }
    }
}

/// Executes invocations. The engine and the self-test harness only talk to
/// the tool through this trait.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Name used in logs and in ToolNotFound reports
    fn tool_name(&self) -> &str;

    /// Run one invocation to completion, or until `deadline` expires
    async fn execute(
        &self,
        invocation: &Invocation,
        deadline: Option<Duration>,
    ) -> Result<RawExecutionResult, InvokeError>;
}

/// Runs the configured test tool as a child process
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    program: String,
    prefix_args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl ProcessInvoker {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            program: settings.program.clone(),
            prefix_args: settings.args.clone(),
            working_dir: settings.working_dir.clone(),
            env: settings.env.clone(),
        }
    }

    /// Full argument vector, program first
    pub fn command_line(&self, invocation: &Invocation) -> Vec<String> {
        let mut line = vec![self.program.clone()];
        line.extend(self.prefix_args.iter().cloned());
        line.extend(invocation.to_args());
        line
    }

    /// Find the tool binary: explicit paths must exist, bare names must be on PATH
    pub fn locate(&self) -> Result<PathBuf, InvokeError> {
        let not_found = || InvokeError::ToolNotFound {
            program: self.program.clone(),
        };

        let candidate = Path::new(&self.program);
        if candidate.components().count() > 1 {
            let resolved = match &self.working_dir {
                Some(dir) if candidate.is_relative() => dir.join(candidate),
                _ => candidate.to_path_buf(),
            };
            if resolved.is_file() {
                Ok(resolved)
            } else {
                Err(not_found())
            }
        } else {
            which::which(&self.program).map_err(|_| not_found())
        }
    }
}

#[async_trait]
impl TestExecutor for ProcessInvoker {
    fn tool_name(&self) -> &str {
        &self.program
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        deadline: Option<Duration>,
    ) -> Result<RawExecutionResult, InvokeError> {
        let program = self.locate()?;
        let mut args = self.prefix_args.clone();
        args.extend(invocation.to_args());

        info!("Running {} {}", self.program, args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InvokeError::ToolNotFound {
                    program: self.program.clone(),
                }
            } else {
                InvokeError::Spawn {
                    program: self.program.clone(),
                    source: e,
                }
            }
        })?;

        let mut stdout = OutputCapture::spawn(child.stdout.take());
        let mut stderr = OutputCapture::spawn(child.stderr.take());

        let status = match deadline {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        "{} exceeded its deadline of {:.1}s, terminating",
                        self.program,
                        limit.as_secs_f64()
                    );
                    terminate(&mut child).await;
                    stdout.abort();
                    stderr.abort();
                    return Err(InvokeError::Timeout(limit));
                }
            },
            None => child.wait().await?,
        };

        // The rest of the deadline also bounds reading the pipes
        let drain = deadline
            .map(|limit| limit.saturating_sub(start.elapsed()).max(TERMINATE_GRACE))
            .unwrap_or(DRAIN_GRACE);
        if !drain_all([&mut stdout, &mut stderr], drain).await {
            warn!(
                "{} exited but its output stayed open for {:.1}s; keeping what was read",
                self.program,
                drain.as_secs_f64()
            );
            stdout.abort();
            stderr.abort();
        }
        let stdout = stdout.take();
        let stderr = stderr.take();
        let duration = start.elapsed();

        debug!(
            exit_code = ?status.code(),
            elapsed_ms = duration.as_millis() as u64,
            "Test tool finished"
        );

        Ok(RawExecutionResult {
            exit_code: status.code(),
            stdout,
            stderr,
            duration,
        })
    }
}

/// Reads one output pipe in the background into a shared buffer, so the
/// bytes read so far survive the reader being aborted
struct OutputCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(stream: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = stream.map(|mut stream| {
            let buf = buf.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buf.lock().extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            debug!("Failed to read tool output: {}", e);
                            break;
                        }
                    }
                }
            })
        });
        Self { buf, task }
    }

    /// Wait for end of stream
    async fn finished(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let _ = task.await;
            self.task = None;
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn take(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }
}

/// Whether every capture reached end of stream within `limit`
async fn drain_all(captures: [&mut OutputCapture; 2], limit: Duration) -> bool {
    let [a, b] = captures;
    tokio::time::timeout(limit, async {
        tokio::join!(a.finished(), b.finished());
    })
    .await
    .is_ok()
}

/// SIGTERM first, then a hard kill
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            if kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok()
            {
                return;
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill test tool: {}", e);
    }
}
