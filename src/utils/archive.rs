// src/utils/archive.rs: tar.gz packaging of KNIFE outputs

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

use crate::config::defs::{PipelineError, GZIP_EXT};
use crate::utils::runlog::RunLog;


/// Writes `dataset_dir`'s contents to a gzipped tar at `archive_path`.
///
/// Entry names are relative to `dataset_dir`, so the archive unpacks to
/// `circReads/`, `logs/`, ... with no top-level dataset folder. Each entry name
/// is appended to the run log. The archive is assembled in a temporary file
/// next to `archive_path` and only renamed into place once complete.
///
/// # Returns
/// Number of entries written.
pub fn archive_dataset(dataset_dir: &Path, archive_path: &Path, log: &RunLog) -> Result<usize, PipelineError> {
    if !dataset_dir.is_dir() {
        return Err(PipelineError::Archive(format!(
            "{} is not a directory",
            dataset_dir.display()
        )));
    }

    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".knife-archive-")
        .tempfile_in(parent)
        .map_err(|e| PipelineError::Archive(format!("Failed to create temp archive in {}: {}", parent.display(), e)))?;

    let enc = GzEncoder::new(tmp, Compression::default());
    let mut tar = TarBuilder::new(enc);
    // Symlinks are stored as links, as `tar -c` does; a dangling one is still archived.
    tar.follow_symlinks(false);
    let mut entries = 0usize;

    for entry in WalkDir::new(dataset_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| PipelineError::Archive(e.to_string()))?;
        let path = entry.path();
        if path == archive_path {
            continue;
        }
        let relative = path
            .strip_prefix(dataset_dir)
            .map_err(|e| PipelineError::Archive(e.to_string()))?;

        let listed = if entry.file_type().is_dir() {
            tar.append_dir(relative, path)
                .map_err(|e| PipelineError::Archive(format!("{}: {}", path.display(), e)))?;
            format!("{}/", relative.display())
        } else {
            tar.append_path_with_name(path, relative)
                .map_err(|e| PipelineError::Archive(format!("{}: {}", path.display(), e)))?;
            relative.display().to_string()
        };
        entries += 1;

        if let Err(e) = log.append_line(&listed) {
            warn!("Could not log archive entry {}: {:#}", listed, e);
        }
    }

    let enc = tar.into_inner().map_err(|e| PipelineError::Archive(e.to_string()))?;
    let tmp = enc.finish().map_err(|e| PipelineError::Archive(e.to_string()))?;
    tmp.persist(archive_path)
        .map_err(|e| PipelineError::Archive(format!("Failed to write {}: {}", archive_path.display(), e.error)))?;

    debug!("Wrote {} entries to {}", entries, archive_path.display());
    Ok(entries)
}


/// Files under `root` whose name ends with `suffix`, in sorted walk order.
/// Symlinks to files count as files. Unreadable directories are skipped with
/// a warning.
pub fn collect_report_files(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path while collecting reports: {}", e);
                continue;
            }
        };
        if !entry.path().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(suffix) {
            files.push(entry.into_path());
        }
    }
    files
}


/// Maps each file to its archive name (its basename). When two files share a
/// basename the later one in `files` wins, matching what unpacking an archive
/// with both entries would leave behind.
pub fn flatten_names(files: &[PathBuf]) -> BTreeMap<OsString, PathBuf> {
    let mut flattened = BTreeMap::new();
    for file in files {
        if let Some(name) = file.file_name() {
            if let Some(previous) = flattened.insert(name.to_os_string(), file.clone()) {
                debug!(
                    "{} replaces {} in flattened archive",
                    file.display(),
                    previous.display()
                );
            }
        }
    }
    flattened
}


#[derive(Debug, Default)]
pub struct FlatArchive {
    pub added: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Writes `files` to an uncompressed tar at `tar_path`, using basenames only.
///
/// The tar is created by the first file and appended to by the rest. Symlinks
/// are followed, so a linked report is stored with its contents. A file
/// that cannot be added is recorded in `failed` and the remaining files are
/// still tried. Nothing is written when `files` is empty.
pub fn archive_flattened(files: &[PathBuf], tar_path: &Path) -> Result<FlatArchive, PipelineError> {
    let mut result = FlatArchive::default();
    let flattened = flatten_names(files);
    if flattened.is_empty() {
        return Ok(result);
    }

    let out = File::create(tar_path)
        .map_err(|e| PipelineError::Archive(format!("Failed to create {}: {}", tar_path.display(), e)))?;
    let mut tar = TarBuilder::new(BufWriter::new(out));

    for (name, path) in flattened {
        match tar.append_path_with_name(&path, &name) {
            Ok(()) => result.added.push(path),
            Err(e) => {
                warn!("Failed to add {} to {}: {}", path.display(), tar_path.display(), e);
                result.failed.push((path, e.to_string()));
            }
        }
    }

    tar.into_inner()
        .and_then(|w| w.into_inner().map_err(|e| e.into_error()))
        .map_err(|e| PipelineError::Archive(format!("Failed to finish {}: {}", tar_path.display(), e)))?;

    Ok(result)
}


/// Compresses `path` to `<path>.gz` and removes the original, like `gzip`.
pub fn gzip_file(path: &Path) -> Result<PathBuf, PipelineError> {
    let mut gz_name = path.as_os_str().to_os_string();
    gz_name.push(".");
    gz_name.push(GZIP_EXT);
    let gz_path = PathBuf::from(gz_name);

    let compress = || -> io::Result<()> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut enc = GzEncoder::new(BufWriter::new(File::create(&gz_path)?), Compression::default());
        io::copy(&mut reader, &mut enc)?;
        enc.finish()?.into_inner().map_err(|e| e.into_error())?;
        fs::remove_file(path)
    };

    compress().map_err(|e| PipelineError::Archive(format!("Failed to gzip {}: {}", path.display(), e)))?;
    Ok(gz_path)
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    fn tar_gz_entries(path: &Path) -> Result<Vec<(String, String)>> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
        let mut entries = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            entries.push((name, content));
        }
        Ok(entries)
    }

    #[test]
    fn test_archive_dataset_has_no_top_level_folder() -> Result<()> {
        let tmp = tempdir()?;
        let dataset = tmp.path().join("testData");
        fs::create_dir_all(dataset.join("circReads/reports"))?;
        fs::create_dir_all(dataset.join("sampleStats"))?;
        fs::write(dataset.join("circReads/reports/x_report.txt"), "r")?;
        fs::write(dataset.join("sampleStats/SampleAlignStats.txt"), "s")?;
        let log = RunLog::create(&tmp.path().join("log.txt"), tmp.path())?;
        let archive = tmp.path().join("testDataknifeoutputfilesrun.tar.gz");

        let n = archive_dataset(&dataset, &archive, &log)?;
        assert_eq!(n, 5);

        let names: Vec<String> = tar_gz_entries(&archive)?.into_iter().map(|(n, _)| n).collect();
        assert!(names.iter().all(|n| !n.starts_with("testData")));
        let top: std::collections::BTreeSet<&str> =
            names.iter().map(|n| n.split('/').next().unwrap_or("")).collect();
        assert_eq!(top.into_iter().collect::<Vec<_>>(), vec!["circReads", "sampleStats"]);
        assert!(names.contains(&"circReads/reports/x_report.txt".to_string()));

        let logged = fs::read_to_string(log.path())?;
        assert!(logged.contains("circReads/\n"));
        assert!(logged.contains("sampleStats/SampleAlignStats.txt\n"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_archive_dataset_keeps_dangling_symlink() -> Result<()> {
        let tmp = tempdir()?;
        let dataset = tmp.path().join("testData");
        fs::create_dir_all(dataset.join("circReads"))?;
        fs::write(dataset.join("circReads/reads.txt"), "r")?;
        std::os::unix::fs::symlink("missing_target.txt", dataset.join("circReads/link"))?;
        let log = RunLog::create(&tmp.path().join("log.txt"), tmp.path())?;
        let archive = tmp.path().join("out.tar.gz");

        let n = archive_dataset(&dataset, &archive, &log)?;
        assert_eq!(n, 3);

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&archive)?));
        let mut found = false;
        for entry in tar.entries()? {
            let entry = entry?;
            if entry.path()?.into_owned() == PathBuf::from("circReads/link") {
                assert_eq!(entry.header().entry_type(), tar::EntryType::Symlink);
                let target = entry.link_name()?.map(|t| t.into_owned());
                assert_eq!(target, Some(PathBuf::from("missing_target.txt")));
                found = true;
            }
        }
        assert!(found, "symlink entry missing from archive");
        Ok(())
    }

    #[test]
    fn test_archive_dataset_missing_dir() -> Result<()> {
        let tmp = tempdir()?;
        let log = RunLog::create(&tmp.path().join("log.txt"), tmp.path())?;
        let archive = tmp.path().join("out.tar.gz");

        let result = archive_dataset(&tmp.path().join("testData"), &archive, &log);
        assert!(matches!(result, Err(PipelineError::Archive(_))));
        assert!(!archive.exists());
        assert_eq!(fs::read_dir(tmp.path())?.count(), 1, "only the log should remain");
        Ok(())
    }

    #[test]
    fn test_collect_report_files() -> Result<()> {
        let tmp = tempdir()?;
        fs::create_dir_all(tmp.path().join("testData/circReads/combinedReports"))?;
        fs::create_dir_all(tmp.path().join("testData/circReads/reports"))?;
        fs::write(tmp.path().join("testData/circReads/combinedReports/naiveinfSRR1027187_1_report.txt"), "")?;
        fs::write(tmp.path().join("testData/circReads/reports/infSRR1027187_1_report.txt"), "")?;
        fs::write(tmp.path().join("testData/circReads/reports/report.txt.bak"), "")?;
        fs::write(tmp.path().join("notes.txt"), "")?;

        let files = collect_report_files(tmp.path(), "report.txt");
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["naiveinfSRR1027187_1_report.txt", "infSRR1027187_1_report.txt"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_report_files_follows_file_symlinks() -> Result<()> {
        let tmp = tempdir()?;
        fs::create_dir_all(tmp.path().join("real"))?;
        fs::write(tmp.path().join("real/data.txt"), "linked report")?;
        std::os::unix::fs::symlink(tmp.path().join("real/data.txt"), tmp.path().join("linked_report.txt"))?;
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), tmp.path().join("dangling_report.txt"))?;

        let files = collect_report_files(tmp.path(), "report.txt");
        assert_eq!(files, vec![tmp.path().join("linked_report.txt")]);

        let tar_path = tmp.path().join("text.tar");
        let result = archive_flattened(&files, &tar_path)?;
        assert!(result.failed.is_empty());
        let entries = tar_gz_entries(&gzip_file(&tar_path)?)?;
        assert_eq!(entries, vec![("linked_report.txt".to_string(), "linked report".to_string())]);
        Ok(())
    }

    #[test]
    fn test_flattened_duplicate_basename_last_wins() -> Result<()> {
        let tmp = tempdir()?;
        fs::create_dir_all(tmp.path().join("a"))?;
        fs::create_dir_all(tmp.path().join("b"))?;
        fs::write(tmp.path().join("a/report.txt"), "from a")?;
        fs::write(tmp.path().join("b/report.txt"), "from b")?;
        fs::write(tmp.path().join("b/x_report.txt"), "x")?;

        let files = collect_report_files(tmp.path(), "report.txt");
        let tar_path = tmp.path().join("text.tar");
        let result = archive_flattened(&files, &tar_path)?;
        assert_eq!(result.added.len(), 2);
        assert!(result.failed.is_empty());

        let gz = gzip_file(&tar_path)?;
        assert!(!tar_path.exists());
        assert_eq!(gz, tmp.path().join("text.tar.gz"));

        let entries = tar_gz_entries(&gz)?;
        assert_eq!(
            entries,
            vec![
                ("report.txt".to_string(), "from b".to_string()),
                ("x_report.txt".to_string(), "x".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_flattened_best_effort() -> Result<()> {
        let tmp = tempdir()?;
        let good = tmp.path().join("good_report.txt");
        fs::write(&good, "ok")?;
        let gone = tmp.path().join("gone_report.txt");

        let tar_path = tmp.path().join("text.tar");
        let result = archive_flattened(&[gone.clone(), good.clone()], &tar_path)?;
        assert_eq!(result.added, vec![good]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, gone);
        assert!(tar_path.exists());
        Ok(())
    }

    #[test]
    fn test_flattened_empty_writes_nothing() -> Result<()> {
        let tmp = tempdir()?;
        let tar_path = tmp.path().join("text.tar");
        let result = archive_flattened(&[], &tar_path)?;
        assert!(result.added.is_empty());
        assert!(!tar_path.exists());
        Ok(())
    }
}
