/// Building and running the KNIFE entry point

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::defs::{PipelineError, RunConfig, RunParams, SH_TAG};
use crate::utils::runlog::RunLog;


/// Positional arguments for completeRun.sh, in the order it reads them:
/// read directory, read id style, alignment parent directory, dataset name,
/// junction overlap, mode, report directory name, ntrim.
/// Reads and alignments both live in the working directory.
pub fn knife_args(params: &RunParams, work_dir: &Path) -> Vec<String> {
    let work_dir = work_dir.to_string_lossy().to_string();
    vec![
        work_dir.clone(),
        params.read_id_style.to_string(),
        work_dir,
        params.dataset_name.clone(),
        params.junction_overlap.to_string(),
        params.mode.clone(),
        params.report_directory_name.clone(),
        params.ntrim.to_string(),
    ]
}

/// The command line as it is written to the run log.
pub fn command_line(entry_script: &str, args: &[String]) -> String {
    let mut parts = vec![SH_TAG.to_string(), entry_script.to_string()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}


/// Destination for the child's combined output: the run log and the side log.
///
/// Like `tee`, a side log that cannot be written is dropped after one warning
/// and output keeps flowing to the run log, so the child never sees a closed pipe.
struct Tee {
    run_log: File,
    side_log: Option<File>,
    side_log_error: Option<String>,
    lines: usize,
}

impl Tee {
    fn new(run_log: File, side_log: Result<File, String>) -> Self {
        let mut tee = Self { run_log, side_log: None, side_log_error: None, lines: 0 };
        match side_log {
            Ok(file) => tee.side_log = Some(file),
            Err(e) => tee.disable_side_log(e),
        }
        tee
    }

    fn disable_side_log(&mut self, error: String) {
        warn!("Side log disabled: {}", error);
        self.side_log = None;
        self.side_log_error = Some(error);
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.run_log.write_all(line).await?;
        let side_result = match self.side_log.as_mut() {
            Some(side_log) => side_log.write_all(line).await.err(),
            None => None,
        };
        if let Some(e) = side_result {
            self.disable_side_log(e.to_string());
        }
        self.lines += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.run_log.flush().await?;
        let side_result = match self.side_log.as_mut() {
            Some(side_log) => side_log.flush().await.err(),
            None => None,
        };
        if let Some(e) = side_result {
            self.disable_side_log(e.to_string());
        }
        Ok(())
    }
}

/// Copies `reader` into the tee line by line until EOF. Bytes are passed
/// through untouched, so non-UTF-8 output survives.
fn spawn_tee_task<R>(reader: R, tee: Arc<Mutex<Tee>>) -> JoinHandle<Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                break;
            }
            tee.lock().await.write_line(&buf).await?;
        }
        Ok::<(), anyhow::Error>(())
    })
}


#[derive(Debug)]
pub struct KnifeRun {
    pub command: String,
    pub status: ExitStatus,
    pub output_lines: usize,
    /// Set when the side log could not be created or written.
    pub side_log_error: Option<String>,
}


/// Runs `sh <entry_script> <args>` inside the pipeline root, teeing stdout and
/// stderr to the run log and the side log.
///
/// # Arguments
/// * `config` - Run configuration; supplies the pipeline root, script and params.
/// * `log` - Run log receiving the command line and the child output.
///
/// # Returns
/// The finished run, or `ToolExecution` if the script is missing, cannot be
/// spawned, or exits non-zero.
pub async fn run_knife(config: &RunConfig, log: &RunLog) -> Result<KnifeRun, PipelineError> {
    let tool_error = |error: String| PipelineError::ToolExecution {
        tool: config.entry_script.clone(),
        error,
    };

    let script_path = config.knife_root.join(&config.entry_script);
    if !script_path.is_file() {
        return Err(tool_error(format!("{} not found", script_path.display())));
    }

    let args = knife_args(&config.params, &config.cwd);
    let command = command_line(&config.entry_script, &args);
    info!("Running {} in {}", command, config.knife_root.display());
    log.append_line(&command).map_err(|e| tool_error(format!("{:#}", e)))?;

    let run_log_file = log.open_append().map_err(|e| tool_error(format!("{:#}", e)))?;
    let side_log_path = config.side_log_path();
    let side_log_file = File::create(&side_log_path)
        .await
        .map_err(|e| format!("Failed to create {}: {}", side_log_path.display(), e));
    let tee = Arc::new(Mutex::new(Tee::new(File::from_std(run_log_file), side_log_file)));

    let mut child = Command::new(SH_TAG)
        .arg(&config.entry_script)
        .args(&args)
        .current_dir(&config.knife_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| tool_error(format!("Failed to spawn {}: {}", SH_TAG, e)))?;

    let stdout = child.stdout.take().ok_or_else(|| tool_error("Failed to get stdout".to_string()))?;
    let stderr = child.stderr.take().ok_or_else(|| tool_error("Failed to get stderr".to_string()))?;
    let out_task = spawn_tee_task(stdout, tee.clone());
    let err_task = spawn_tee_task(stderr, tee.clone());

    let status = child
        .wait()
        .await
        .map_err(|e| tool_error(format!("Failed to wait on child: {}", e)))?;

    for task in [out_task, err_task] {
        task.await
            .map_err(|e| tool_error(format!("Output task panicked: {}", e)))?
            .map_err(|e| tool_error(format!("Failed to copy output: {:#}", e)))?;
    }

    let (output_lines, side_log_error) = {
        let mut guard = tee.lock().await;
        guard.flush().await.map_err(|e| tool_error(format!("{:#}", e)))?;
        (guard.lines, guard.side_log_error.clone())
    };
    debug!("{} wrote {} lines of output", config.entry_script, output_lines);

    if !status.success() {
        let mut error = exit_description(status);
        if let Some(side) = &side_log_error {
            error.push_str(&format!("; side log disabled: {}", side));
        }
        return Err(tool_error(error));
    }

    Ok(KnifeRun { command, status, output_lines, side_log_error })
}

fn exit_description(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with status {}", code),
        None => format!("terminated by signal ({})", status),
    }
}
