use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cli::args::{Arguments, ReadIdStyle};

// External software
pub const SH_TAG: &str = "sh";
pub const KNIFE_TAG: &str = "completeRun.sh";
pub const KNIFE_SNAPSHOT_SCRIPT: &str = "findCircularRNA.sh";

// Static paths
pub const DEFAULT_KNIFE_ROOT: &str = "/src/knife/circularRNApipeline_Standalone";
pub const INDEX_DIR: &str = "index";
pub const DENOVO_DIR: &str = "denovo_scripts";
pub const DENOVO_INDEX_DIR: &str = "denovo_scripts/index";

// Static filenames
pub const RUN_LOG_STEM: &str = "logknife3";
pub const RUN_LOG_EXT: &str = "txt";
pub const DEFAULT_SIDE_LOG: &str = "logofstdoutfromknife";
pub const OUTPUT_ARCHIVE_TAG: &str = "knifeoutputfiles";
pub const TEXT_ARCHIVE_TAG: &str = "knifetextfiles";
pub const REPORT_SUFFIX: &str = "report.txt";
pub const TAR_EXT: &str = "tar";
pub const GZIP_EXT: &str = "gz";

// Input prefixes
pub const BT1_PREFIX: &str = "infilebt1";
pub const BT2_PREFIX: &str = "infilebt2";
pub const FASTAS_PREFIX: &str = "infilefastas";
pub const GTF_PREFIX: &str = "infilegtf";

/// A working-directory name prefix and the pipeline subdirectory its files land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingRule {
    pub prefix: &'static str,
    pub target: &'static str,
}

// Order and targets follow the original run script. bt1 ends up under
// denovo_scripts/index while fastas goes to index; the KNIFE docs put bt1/bt2
// together in index. Kept as-is until confirmed against a real run.
pub const STAGING_RULES: &[StagingRule] = &[
    StagingRule { prefix: BT2_PREFIX, target: INDEX_DIR },
    StagingRule { prefix: FASTAS_PREFIX, target: INDEX_DIR },
    StagingRule { prefix: GTF_PREFIX, target: DENOVO_DIR },
    StagingRule { prefix: BT1_PREFIX, target: DENOVO_INDEX_DIR },
];

// Static parameters, as used for the KNIFE test data call
pub const DEFAULT_DATASET_NAME: &str = "testData";
pub const DEFAULT_RUN_ID: &str = "nophred64";
pub const DEFAULT_MODE: &str = "skipDenovo";
pub const DEFAULT_JUNCTION_OVERLAP: u32 = 8;
pub const DEFAULT_REPORT_DIR: &str = "circReads";
pub const DEFAULT_NTRIM: u32 = 40;


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    IOError(String),

    #[error("Failed to move {from} to {to}: {error}")]
    Staging { from: PathBuf, to: PathBuf, error: String },

    #[error("Tool execution failed for {tool}: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Archive error: {0}")]
    Archive(String),
}


/// The fixed parameter block handed to completeRun.sh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    pub dataset_name: String,
    pub run_id: String,
    pub mode: String,
    pub read_id_style: ReadIdStyle,
    pub junction_overlap: u32,
    pub report_directory_name: String,
    pub ntrim: u32,
}

impl RunParams {
    /// Builds the parameter block, rejecting values the KNIFE scripts cannot cope with.
    ///
    /// The dataset name becomes a directory name and a bare positional
    /// argument, so it must be non-empty and free of whitespace and slashes.
    pub fn new(
        dataset_name: &str,
        run_id: &str,
        mode: &str,
        read_id_style: ReadIdStyle,
        junction_overlap: u32,
        report_directory_name: &str,
        ntrim: u32,
    ) -> Result<Self, PipelineError> {
        if dataset_name.is_empty() {
            return Err(PipelineError::InvalidConfig("dataset name is empty".to_string()));
        }
        if dataset_name.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(PipelineError::InvalidConfig(format!(
                "dataset name '{}' must not contain whitespace or '/'",
                dataset_name
            )));
        }
        for (label, value) in [("run id", run_id), ("mode", mode), ("report directory name", report_directory_name)] {
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} '{}' must be non-empty and contain no whitespace",
                    label, value
                )));
            }
        }

        Ok(Self {
            dataset_name: dataset_name.to_string(),
            run_id: run_id.to_string(),
            mode: mode.to_string(),
            read_id_style,
            junction_overlap,
            report_directory_name: report_directory_name.to_string(),
            ntrim,
        })
    }
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            run_id: DEFAULT_RUN_ID.to_string(),
            mode: DEFAULT_MODE.to_string(),
            read_id_style: ReadIdStyle::Complete,
            junction_overlap: DEFAULT_JUNCTION_OVERLAP,
            report_directory_name: DEFAULT_REPORT_DIR.to_string(),
            ntrim: DEFAULT_NTRIM,
        }
    }
}

impl fmt::Display for RunParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dataset={} run_id={} mode={} read_id_style={} junction_overlap={} report_dir={} ntrim={}",
            self.dataset_name,
            self.run_id,
            self.mode,
            self.read_id_style,
            self.junction_overlap,
            self.report_directory_name,
            self.ntrim
        )
    }
}


pub struct RunConfig {
    pub cwd: PathBuf,
    pub knife_root: PathBuf,
    pub entry_script: String,
    pub side_log: String,
    pub params: RunParams,
    pub strict: bool,
}

impl RunConfig {
    /// Resolves the parsed arguments against the current directory.
    pub fn from_args(args: &Arguments, cwd: &Path) -> Result<Self, PipelineError> {
        let params = RunParams::new(
            &args.dataset_name,
            &args.run_id,
            &args.mode,
            args.read_id_style.clone(),
            args.junction_overlap,
            &args.report_directory_name,
            args.ntrim,
        )?;

        let work_dir = match &args.work_dir {
            Some(dir) => absolutize(&PathBuf::from(dir), cwd),
            None => cwd.to_path_buf(),
        };
        let knife_root = absolutize(&PathBuf::from(&args.knife_root), cwd);

        if args.side_log.is_empty() || args.side_log.contains('/') {
            return Err(PipelineError::InvalidConfig(format!(
                "side log name '{}' must be a bare file name",
                args.side_log
            )));
        }

        Ok(Self {
            cwd: work_dir,
            knife_root,
            entry_script: args.entry_script.clone(),
            side_log: args.side_log.clone(),
            params,
            strict: args.strict,
        })
    }

    /// `<wdir>/logknife3<run_id>.txt`
    pub fn run_log_path(&self) -> PathBuf {
        self.cwd.join(format!("{}{}.{}", RUN_LOG_STEM, self.params.run_id, RUN_LOG_EXT))
    }

    /// Where KNIFE writes its results: `<wdir>/<dataset_name>`.
    pub fn dataset_dir(&self) -> PathBuf {
        self.cwd.join(&self.params.dataset_name)
    }

    pub fn output_archive_path(&self) -> PathBuf {
        self.cwd.join(format!(
            "{}{}{}.{}.{}",
            self.params.dataset_name, OUTPUT_ARCHIVE_TAG, self.params.run_id, TAR_EXT, GZIP_EXT
        ))
    }

    /// Uncompressed report tar; gzip turns it into `<...>.tar.gz`.
    pub fn text_archive_path(&self) -> PathBuf {
        self.cwd.join(format!(
            "{}{}{}.{}",
            self.params.dataset_name, TEXT_ARCHIVE_TAG, self.params.run_id, TAR_EXT
        ))
    }

    pub fn side_log_path(&self) -> PathBuf {
        self.knife_root.join(&self.side_log)
    }

    /// Pipeline root plus every staging target, in creation order.
    pub fn knife_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.knife_root.clone()];
        for rule in STAGING_RULES {
            let dir = self.knife_root.join(rule.target);
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
