use std::fmt;

use clap::{Parser, ValueEnum};

use crate::config::defs::{
    DEFAULT_DATASET_NAME, DEFAULT_JUNCTION_OVERLAP, DEFAULT_KNIFE_ROOT, DEFAULT_MODE, DEFAULT_NTRIM,
    DEFAULT_REPORT_DIR, DEFAULT_RUN_ID, DEFAULT_SIDE_LOG, KNIFE_TAG,
};

/// How read ids are written in the input FASTQ files.
#[derive(Debug, Clone, ValueEnum, Default, PartialEq, Eq)]
pub enum ReadIdStyle {
    #[default]
    Complete,
    Appended,
}

impl fmt::Display for ReadIdStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadIdStyle::Complete => write!(f, "complete"),
            ReadIdStyle::Appended => write!(f, "appended"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "knife-runner", version, about = "Stage inputs, run the KNIFE circular RNA pipeline and archive its outputs")]
pub struct Arguments {

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long, help = "Fail with exit status 1 if any phase failed. By default the run always exits 0.")]
    pub strict: bool,

    #[arg(short = 'w', long = "work-dir", help = "Directory holding the staged inputs and receiving outputs. Defaults to the current directory.")]
    pub work_dir: Option<String>,

    #[arg(short = 'k', long = "knife-root", default_value = DEFAULT_KNIFE_ROOT)]
    pub knife_root: String,

    #[arg(long, default_value = KNIFE_TAG)]
    pub entry_script: String,

    #[arg(long, default_value = DEFAULT_SIDE_LOG, help = "File name, inside the pipeline root, that receives a copy of the pipeline output")]
    pub side_log: String,

    #[arg(short = 'd', long, default_value = DEFAULT_DATASET_NAME, help = "Dataset name; no spaces allowed")]
    pub dataset_name: String,

    #[arg(short = 'r', long, default_value = DEFAULT_RUN_ID, help = "Run id used in log and archive names; change it for every run")]
    pub run_id: String,

    #[arg(short = 'm', long, default_value = DEFAULT_MODE)]
    pub mode: String,

    #[arg(long = "read-id-style", default_value = "complete", value_enum)]
    pub read_id_style: ReadIdStyle,

    #[arg(short = 'j', long, default_value_t = DEFAULT_JUNCTION_OVERLAP)]
    pub junction_overlap: u32,

    #[arg(long = "report-dir", default_value = DEFAULT_REPORT_DIR)]
    pub report_directory_name: String,

    #[arg(short = 'n', long, default_value_t = DEFAULT_NTRIM)]
    pub ntrim: u32,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Arguments::try_parse_from(["knife-runner"]).unwrap();
        assert_eq!(args.dataset_name, "testData");
        assert_eq!(args.read_id_style, ReadIdStyle::Complete);
        assert_eq!(args.junction_overlap, 8);
        assert_eq!(args.ntrim, 40);
        assert_eq!(args.knife_root, DEFAULT_KNIFE_ROOT);
        assert!(args.work_dir.is_none());
        assert!(!args.strict);
    }

    #[test]
    fn test_overrides() {
        let args = Arguments::try_parse_from([
            "knife-runner",
            "-d", "SRR1027187",
            "--read-id-style", "appended",
            "-j", "13",
            "--strict",
        ])
        .unwrap();
        assert_eq!(args.dataset_name, "SRR1027187");
        assert_eq!(args.read_id_style, ReadIdStyle::Appended);
        assert_eq!(args.read_id_style.to_string(), "appended");
        assert_eq!(args.junction_overlap, 13);
        assert!(args.strict);
    }
}
