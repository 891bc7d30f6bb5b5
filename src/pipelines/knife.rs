use std::fs;

use anyhow::{Context, Result};
use log::info;

use crate::config::defs::{PipelineError, RunConfig, KNIFE_SNAPSHOT_SCRIPT, REPORT_SUFFIX, STAGING_RULES};
use crate::utils::archive::{archive_dataset, archive_flattened, collect_report_files, gzip_file};
use crate::utils::command::run_knife;
use crate::utils::file::{ensure_dirs, tree_listing};
use crate::utils::runlog::{Phase, PhaseOutcome, RunLog, RunReport};
use crate::utils::staging::stage_inputs;


/// One KNIFE run: stage inputs, run the pipeline, archive the results.
///
/// Only setup failures (creating the run log or the pipeline directories) are
/// returned as errors. Everything after that is recorded in the report and the
/// run carries on, since partial output is still worth collecting.
pub async fn run(config: &RunConfig) -> Result<RunReport> {
    println!("\n-------------\n KNIFE\n-------------\n");
    info!("Run parameters: {}", config.params);

    let log = RunLog::create(&config.run_log_path(), &config.cwd)
        .context("Failed to initialise run log")?;
    info!("Run log: {}", log.path().display());
    let mut report = RunReport::default();

    report.push(&log, snapshot_script(config, &log));

    let dirs = config.knife_dirs();
    let created = ensure_dirs(&dirs).context("Failed to prepare pipeline directories")?;
    report.push(
        &log,
        PhaseOutcome::ok(Phase::PrepareDirs, format!("{} of {} directories created", created.len(), dirs.len())),
    );

    let staged = stage_inputs(&config.cwd, &config.knife_root, STAGING_RULES, &log);
    report.push(
        &log,
        PhaseOutcome::from_result(Phase::Staging, staged, |files| format!("moved {} files", files.len())),
    );

    report.push(&log, snapshot_tree(config, &log));

    let knife = run_knife(config, &log).await;
    report.push(
        &log,
        PhaseOutcome::from_result(Phase::Pipeline, knife, |run| match run.side_log_error {
            Some(e) => format!(
                "{} finished ({} output lines); side log disabled: {}",
                config.entry_script, run.output_lines, e
            ),
            None => format!("{} finished ({} output lines)", config.entry_script, run.output_lines),
        }),
    );

    let output_archive = config.output_archive_path();
    let archived = archive_dataset(&config.dataset_dir(), &output_archive, &log);
    report.push(
        &log,
        PhaseOutcome::from_result(Phase::OutputArchive, archived, |n| {
            format!("{} entries in {}", n, output_archive.display())
        }),
    );

    for outcome in archive_reports(config) {
        report.push(&log, outcome);
    }

    Ok(report)
}


/// Copies the pipeline's `findCircularRNA.sh` into the run log so the log
/// records which version of the pipeline ran.
fn snapshot_script(config: &RunConfig, log: &RunLog) -> PhaseOutcome {
    let script = config.knife_root.join(KNIFE_SNAPSHOT_SCRIPT);
    let result = fs::read(&script)
        .with_context(|| format!("Error in writing {}", KNIFE_SNAPSHOT_SCRIPT))
        .and_then(|bytes| log.append_bytes(&bytes).map(|_| bytes.len()));
    PhaseOutcome::from_result(Phase::ScriptSnapshot, result.map_err(|e| format!("{:#}", e)), |n| {
        format!("copied {} bytes of {}", n, script.display())
    })
}

/// Writes a recursive listing of the pipeline root between section breaks.
fn snapshot_tree(config: &RunConfig, log: &RunLog) -> PhaseOutcome {
    let result = log
        .section_break()
        .and_then(|_| tree_listing(&config.knife_root))
        .and_then(|listing| log.append_bytes(listing.as_bytes()))
        .and_then(|_| log.section_break());
    PhaseOutcome::from_result(Phase::TreeSnapshot, result.map_err(|e| format!("{:#}", e)), |_| {
        format!("listed {}", config.knife_root.display())
    })
}

/// Flattened archive of every `*report.txt` under the working directory,
/// followed by gzip. Yields one outcome for the tar step and, when a tar was
/// written, one for compression.
fn archive_reports(config: &RunConfig) -> Vec<PhaseOutcome> {
    let files = collect_report_files(&config.cwd, REPORT_SUFFIX);
    if files.is_empty() {
        return vec![PhaseOutcome::skipped(
            Phase::TextArchive,
            format!("no *{} files under {}", REPORT_SUFFIX, config.cwd.display()),
        )];
    }

    let tar_path = config.text_archive_path();
    let mut outcomes = Vec::new();

    let archived = match archive_flattened(&files, &tar_path) {
        Ok(archived) => archived,
        Err(e) => return vec![PhaseOutcome::failed(Phase::TextArchive, e.to_string())],
    };
    if archived.failed.is_empty() {
        outcomes.push(PhaseOutcome::ok(
            Phase::TextArchive,
            format!("{} report files in {}", archived.added.len(), tar_path.display()),
        ));
    } else {
        let failed: Vec<String> = archived
            .failed
            .iter()
            .map(|(path, e)| format!("{}: {}", path.display(), e))
            .collect();
        outcomes.push(PhaseOutcome::failed(
            Phase::TextArchive,
            PipelineError::Archive(format!(
                "added {} of {} report files; {}",
                archived.added.len(),
                archived.added.len() + archived.failed.len(),
                failed.join("; ")
            ))
            .to_string(),
        ));
    }

    outcomes.push(PhaseOutcome::from_result(Phase::TextCompress, gzip_file(&tar_path), |gz| {
        format!("wrote {}", gz.display())
    }));
    outcomes
}
