// src/utils/runlog.rs: the append-only run log and per-phase outcomes

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info, warn};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ScriptSnapshot,
    PrepareDirs,
    Staging,
    TreeSnapshot,
    Pipeline,
    OutputArchive,
    TextArchive,
    TextCompress,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ScriptSnapshot => "script_snapshot",
            Phase::PrepareDirs => "prepare_dirs",
            Phase::Staging => "staging",
            Phase::TreeSnapshot => "tree_snapshot",
            Phase::Pipeline => "pipeline",
            Phase::OutputArchive => "output_archive",
            Phase::TextArchive => "text_archive",
            Phase::TextCompress => "text_compress",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Ok,
    Failed,
    Skipped,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Ok => write!(f, "ok"),
            PhaseStatus::Failed => write!(f, "failed"),
            PhaseStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub message: String,
}

impl PhaseOutcome {
    pub fn ok(phase: Phase, message: impl Into<String>) -> Self {
        Self { phase, status: PhaseStatus::Ok, message: message.into() }
    }

    pub fn failed(phase: Phase, message: impl Into<String>) -> Self {
        Self { phase, status: PhaseStatus::Failed, message: message.into() }
    }

    pub fn skipped(phase: Phase, message: impl Into<String>) -> Self {
        Self { phase, status: PhaseStatus::Skipped, message: message.into() }
    }

    /// Turns a phase result into an outcome, using `done` as the success message.
    pub fn from_result<T, E: fmt::Display>(phase: Phase, result: Result<T, E>, done: impl FnOnce(T) -> String) -> Self {
        match result {
            Ok(value) => Self::ok(phase, done(value)),
            Err(e) => Self::failed(phase, e.to_string()),
        }
    }
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Single line; embedded newlines would split the record.
        let message = self.message.replace('\n', " ");
        write!(f, "phase={} status={} message=\"{}\"", self.phase, self.status, message)
    }
}


/// The run's text log. Every write reopens the file in append mode so nothing
/// holds it open across phases, and the child process can share it.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Creates (or truncates) the log and writes the header: the working
    /// directory followed by three newlines.
    pub fn create(path: &Path, cwd: &Path) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create run log {}", path.display()))?;
        write!(file, "{}\n\n\n", cwd.display())
            .with_context(|| format!("Failed to write run log header {}", path.display()))?;
        Ok(Self { path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh append handle, e.g. for handing to a child process.
    pub fn open_append(&self) -> Result<File> {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open run log {}", self.path.display()))
    }

    pub fn append_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut file = self.open_append()?;
        file.write_all(bytes)
            .with_context(|| format!("Failed to append to run log {}", self.path.display()))?;
        Ok(())
    }

    pub fn append_line(&self, line: &str) -> Result<()> {
        self.append_bytes(format!("{}\n", line).as_bytes())
    }

    /// Three blank-line separator between sections.
    pub fn section_break(&self) -> Result<()> {
        self.append_bytes(b"\n\n\n")
    }

    /// Records a phase outcome in the run log and mirrors it to the stderr logger.
    /// A failure to write the log itself is only warned about; losing a log
    /// line must not stop the run.
    pub fn record(&self, outcome: &PhaseOutcome) {
        match outcome.status {
            PhaseStatus::Failed => error!("{}", outcome),
            PhaseStatus::Skipped => warn!("{}", outcome),
            PhaseStatus::Ok => info!("{}", outcome),
        }
        let line = format!("[{}] {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), outcome);
        if let Err(e) = self.append_line(&line) {
            warn!("Could not write to run log: {:#}", e);
        }
    }
}


/// Outcomes of one run, in phase order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<PhaseOutcome>,
}

impl RunReport {
    pub fn push(&mut self, log: &RunLog, outcome: PhaseOutcome) {
        log.record(&outcome);
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.outcomes.iter().find(|o| o.phase == phase)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PhaseOutcome> {
        self.outcomes.iter().filter(|o| o.status == PhaseStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Process exit status once setup has succeeded: always 0, unless
    /// `strict` is set and some phase failed.
    pub fn exit_code(&self, strict: bool) -> i32 {
        if strict && self.has_failures() { 1 } else { 0 }
    }
}
