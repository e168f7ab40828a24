use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    types::{ColumnMapping, JobId},
    QueueError, QueueResult,
};

/// Grace period for the output pipes to drain after the task exited.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the external task needs to analyse one input.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub work_dir: PathBuf,
    pub column_mapping: Option<ColumnMapping>,
}

/// Runs the external analysis for one job.
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    /// Run to completion. When `cancel` fires the task and all of its
    /// descendants are terminated and `Interrupted` is returned.
    async fn run(&self, request: &AnalysisRequest, cancel: CancellationToken) -> QueueResult<()>;
}

/// Scripts and interpreter used by [`ScriptRunner`]
#[derive(Debug, Clone)]
pub struct ScriptRunnerConfig {
    /// Working directory of the scripts
    pub scripts_dir: PathBuf,
    pub interpreter: String,
    pub script: String,
    /// Variant taking the column mapping as a JSON argument
    pub columns_script: String,
    /// Variant used in development mode; ignores the column mapping
    pub dev_script: String,
    pub development_mode: bool,
}

impl Default for ScriptRunnerConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("."),
            interpreter: "bash".to_string(),
            script: "run_analysis.bash".to_string(),
            columns_script: "run_analysis_columns.bash".to_string(),
            dev_script: "run_analysis_dev.bash".to_string(),
            development_mode: false,
        }
    }
}

/// Runs `<interpreter> <script> <input> <work_dir> [<mapping>]` as a child
/// process in its own process group.
pub struct ScriptRunner {
    config: ScriptRunnerConfig,
}

impl ScriptRunner {
    pub fn new(config: ScriptRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptRunnerConfig {
        &self.config
    }

    /// Arguments passed to the interpreter for `request`.
    pub fn arguments(&self, request: &AnalysisRequest) -> QueueResult<Vec<OsString>> {
        let mapping = request
            .column_mapping
            .as_ref()
            .filter(|m| !m.is_empty() && !self.config.development_mode);

        let script = if self.config.development_mode {
            &self.config.dev_script
        } else if mapping.is_some() {
            &self.config.columns_script
        } else {
            &self.config.script
        };

        let mut args = vec![
            OsString::from(script),
            request.input_path.clone().into_os_string(),
            request.work_dir.clone().into_os_string(),
        ];
        if let Some(mapping) = mapping {
            args.push(OsString::from(mapping.to_json()?));
        }
        Ok(args)
    }

    fn command(&self, request: &AnalysisRequest) -> QueueResult<Command> {
        let mut command = Command::new(&self.config.interpreter);
        command
            .args(self.arguments(request)?)
            .current_dir(&self.config.scripts_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        Ok(command)
    }
}

#[async_trait]
impl AnalysisRunner for ScriptRunner {
    async fn run(&self, request: &AnalysisRequest, cancel: CancellationToken) -> QueueResult<()> {
        let mut child = self.command(request)?.spawn().map_err(|e| QueueError::ExecutionFailed {
            message: format!("error starting analysis: {}", e),
            stderr: String::new(),
        })?;
        info!(job_id = %request.job_id, pid = ?child.id(), "analysis executing");

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_stdout(request.job_id.clone(), out)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture_stderr(request.job_id.clone(), err)));

        let status: ExitStatus = tokio::select! {
            status = child.wait() => status.map_err(|e| QueueError::io("wait for analysis", e))?,
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                if let Some(task) = stdout {
                    task.abort();
                }
                if let Some(task) = stderr {
                    task.abort();
                }
                return Err(QueueError::Interrupted("analysis terminated".to_string()));
            }
        };

        if let Some(task) = stdout {
            let _ = tokio::time::timeout(PIPE_DRAIN_TIMEOUT, task).await;
        }
        let captured = match stderr {
            Some(task) => match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, task).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            },
            None => String::new(),
        };

        if status.success() {
            debug!(job_id = %request.job_id, "analysis finished");
            Ok(())
        } else {
            Err(QueueError::ExecutionFailed {
                message: status.to_string(),
                stderr: captured,
            })
        }
    }
}

async fn forward_stdout<R>(job_id: JobId, out: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(out).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(job_id = %job_id, "{}", line);
    }
}

async fn capture_stderr<R>(job_id: JobId, err: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut captured = String::new();
    let mut lines = BufReader::new(err).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(job_id = %job_id, "{}", line);
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

/// Kill the task with everything it spawned, then reap it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                warn!(pid, "failed to kill analysis process group: {}", e);
            }
        }
    }

    // Outside unix only the direct child can be reached.
    if let Err(e) = child.kill().await {
        debug!("analysis already exited: {}", e);
    }
}
