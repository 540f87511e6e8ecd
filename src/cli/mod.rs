pub mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::{process_overtime_command, process_worktime_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    agent::{scan_once, start_agent},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, AGENT_PREFIX, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Worklens", version, long_about = None)]
#[command(about = "Tracks local git activity and reports work-hour analytics", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable console logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Run the scanning agent in the current console")]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Run a single scan pass and print the result")]
    Scan {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Display per-day work/overtime hour totals")]
    Worktime {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Display the overtime distribution")]
    Overtime {
        #[command(flatten)]
        command: ReportCommand,
    },
}

/// The application directory of a command. Logs, state and buckets all live
/// under the same directory, whether it is explicit or the default one.
fn working_dir(commands: &Commands) -> Result<PathBuf> {
    let dir = match commands {
        Commands::Serve { dir } | Commands::Scan { dir } => dir.clone(),
        Commands::Worktime { command } | Commands::Overtime { command } => command.dir.clone(),
    };
    dir.map_or_else(create_application_default_path, Ok)
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };

    let prefix = match &args.commands {
        Commands::Serve { .. } => AGENT_PREFIX,
        _ => CLI_PREFIX,
    };
    let dir = working_dir(&args.commands)?;
    enable_logging(prefix, &dir, logging_level, args.log)?;

    match args.commands {
        Commands::Serve { .. } => start_agent(dir).await,
        Commands::Scan { .. } => {
            let report = scan_once(dir).await?;
            println!(
                "{} repositories scanned, {} skipped, {} commits seen, {} records reported",
                report.repos_scanned,
                report.repos_skipped,
                report.commits_seen,
                report.records_emitted
            );
            Ok(())
        }
        Commands::Worktime { command } => process_worktime_command(command, dir).await,
        Commands::Overtime { command } => process_overtime_command(command, dir).await,
    }
}
