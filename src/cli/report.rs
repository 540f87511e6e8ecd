use std::{collections::BTreeMap, fmt::Display, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::TryStreamExt;
use now::DateTimeNow;

use crate::{
    agent::config::AgentConfig,
    tracker::{
        buckets::{BucketStorageImpl, WorkHourBucket},
        summary::{calculate_overtime_stats, calculate_work_time, extract_buckets},
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Shared arguments of the `worktime` and `overtime` commands.
#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"15/03/2025\", \"1 week ago\". Defaults to the beginning of the current week"
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Defaults to today"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "User to report on. Defaults to the user the agent is configured with")]
    user: Option<String>,
    #[arg(long, help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state")]
    pub(super) dir: Option<PathBuf>,
}

struct ReportSetup {
    storage: BucketStorageImpl,
    user_id: Arc<str>,
    start: NaiveDate,
    end: NaiveDate,
}

fn parse_date(
    value: Option<String>,
    now: DateTime<Local>,
    dialect: chrono_english::Dialect,
    fallback: DateTime<Local>,
) -> Result<DateTime<Local>> {
    match value.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => Ok(v.with_timezone(&Local)),
        Some(Err(e)) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {e}"),
            )
            .into()),
        None => Ok(fallback),
    }
}

fn prepare(command: ReportCommand, dir: PathBuf) -> Result<ReportSetup> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = command.date_style.into();

    let start = parse_date(command.start_date, now, dialect, now.beginning_of_week())?;
    let end = parse_date(command.end_date, now, dialect, now)?;

    let user_id: Arc<str> = command
        .user
        .unwrap_or_else(|| AgentConfig::load(&dir.join("config.json")).user_id)
        .into();
    let storage = BucketStorageImpl::new(dir.join("buckets"))?;

    Ok(ReportSetup {
        storage,
        user_id,
        start: start.date_naive(),
        end: end.date_naive(),
    })
}

/// Command to process `worktime`. Prints per-day hour totals for the range and a
/// sum over the whole range.
pub async fn process_worktime_command(command: ReportCommand, dir: PathBuf) -> Result<()> {
    let ReportSetup {
        storage,
        user_id,
        start,
        end,
    } = prepare(command, dir)?;

    let buckets: Vec<WorkHourBucket> = extract_buckets(storage, user_id.clone(), start, end)
        .try_collect()
        .await?;

    let mut by_day = BTreeMap::<NaiveDate, Vec<&WorkHourBucket>>::new();
    for bucket in &buckets {
        by_day.entry(bucket.date).or_default().push(bucket);
    }

    println!("Work time for {user_id} from {start} to {end}");
    for (date, day) in &by_day {
        let totals = calculate_work_time(day.iter().copied());
        println!(
            "{date}\t{}h total\t{}h normal\t{}h overtime",
            totals.total_hours, totals.normal_hours, totals.overtime_hours
        );
    }

    let totals = calculate_work_time(&buckets);
    println!(
        "range\t{}h total\t{}h normal\t{}h overtime",
        totals.total_hours, totals.normal_hours, totals.overtime_hours
    );
    Ok(())
}

/// Command to process `overtime`. Prints the overtime distribution over days,
/// hours of day and the weekday/weekend split.
pub async fn process_overtime_command(command: ReportCommand, dir: PathBuf) -> Result<()> {
    let ReportSetup {
        storage,
        user_id,
        start,
        end,
    } = prepare(command, dir)?;

    let buckets: Vec<WorkHourBucket> = extract_buckets(storage, user_id.clone(), start, end)
        .try_collect()
        .await?;
    let stats = calculate_overtime_stats(&buckets, start, end);

    println!("Overtime for {user_id} from {start} to {end}");
    for (date, hours) in &stats.by_day {
        println!("{date}\t{hours}h");
    }
    println!();
    for (hour, count) in stats.by_hour.iter().enumerate() {
        if *count > 0 {
            println!("{hour:02}:00\t{count}h");
        }
    }
    println!(
        "weekdays {}h, weekends {}h, total {}h",
        stats.weekday_total,
        stats.weekend_total,
        stats.total()
    );
    Ok(())
}
