use std::env;
use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{error, info, LevelFilter};

use knife_runner::cli::parse;
use knife_runner::config::defs::RunConfig;
use knife_runner::pipelines::knife;
use knife_runner::utils::runlog::RunReport;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let run_config = match RunConfig::from_args(&args, &dir) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let report = match knife::run(&run_config).await {
        Ok(report) => report,
        Err(e) => {
            error!("Run aborted: {:#} at {} milliseconds.", e, run_start.elapsed().as_millis());
            std::process::exit(1);
        }
    };

    print_summary(&report);
    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());

    let code = report.exit_code(run_config.strict);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}


fn print_summary(report: &RunReport) {
    println!("\n-------------\n Summary\n-------------");
    for outcome in &report.outcomes {
        println!("{:<16} {:<8} {}", outcome.phase.to_string(), outcome.status.to_string(), outcome.message);
    }
    println!();
}
