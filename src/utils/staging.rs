// src/utils/staging.rs: moving prefixed inputs to where KNIFE expects them

use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::defs::{PipelineError, StagingRule};
use crate::utils::file::move_entry;
use crate::utils::runlog::RunLog;


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}


/// Destination name for an entry: the name with `prefix` removed from the front.
/// A name that is exactly the prefix keeps its name, as `mv file dir/` would.
/// Works on raw bytes, so names that are not valid UTF-8 pass through intact.
pub fn staged_name<'a>(name: &'a OsStr, prefix: &str) -> Option<&'a OsStr> {
    let stripped = name.as_bytes().strip_prefix(prefix.as_bytes())?;
    if stripped.is_empty() {
        Some(name)
    } else {
        Some(OsStr::from_bytes(stripped))
    }
}


/// Entries of `dir` whose file name starts with `prefix`, sorted by name.
pub fn matching_entries(dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, OsString)>, PipelineError> {
    let read_dir = fs::read_dir(dir)
        .map_err(|e| PipelineError::IOError(format!("Failed to read {}: {}", dir.display(), e)))?;

    let mut matches = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| PipelineError::IOError(e.to_string()))?;
        let name = entry.file_name();
        if name.as_bytes().starts_with(prefix.as_bytes()) {
            matches.push((entry.path(), name));
        }
    }
    matches.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(matches)
}


/// Moves every prefixed input in `work_dir` into its rule's target directory
/// under `knife_root`, logging one `mv <old> <new>` line per move.
///
/// Rules are applied in order. The first failed move aborts the whole loop;
/// files already moved stay where they are.
///
/// # Arguments
/// * `work_dir` - Directory holding the prefixed inputs.
/// * `knife_root` - Pipeline root; rule targets are relative to it.
/// * `rules` - (prefix, target) pairs.
/// * `log` - Run log receiving the `mv` lines.
///
/// # Returns
/// Every move performed, in order.
pub fn stage_inputs(
    work_dir: &Path,
    knife_root: &Path,
    rules: &[StagingRule],
    log: &RunLog,
) -> Result<Vec<StagedFile>, PipelineError> {
    let mut staged = Vec::new();

    for rule in rules {
        let target_dir = knife_root.join(rule.target);
        for (from, name) in matching_entries(work_dir, rule.prefix)? {
            let Some(new_name) = staged_name(&name, rule.prefix) else {
                continue;
            };
            let to = target_dir.join(new_name);

            move_entry(&from, &to).map_err(|e| PipelineError::Staging {
                from: from.clone(),
                to: to.clone(),
                error: e.to_string(),
            })?;
            debug!("Staged {} -> {}", from.display(), to.display());

            log.append_line(&format!("mv {} {}", from.display(), to.display()))
                .map_err(|e| PipelineError::IOError(format!("{:#}", e)))?;
            staged.push(StagedFile { from, to });
        }
    }

    Ok(staged)
}
