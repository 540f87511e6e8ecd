use std::{collections::BTreeMap, future, sync::Arc};

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Weekday};
use futures::{stream, Stream, StreamExt};
use tracing::error;

use super::{
    buckets::{BucketStorage, WorkHourBucket},
    classifier::HourKind,
};

/// Hour totals derived from a set of buckets. Hours are whole numbers because
/// activity is bucketed per hour upstream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkTimeTotals {
    pub total_hours: u32,
    pub normal_hours: u32,
    pub overtime_hours: u32,
}

/// Counts active hours. Break hours count toward the total but toward neither
/// normal nor overtime, an active lunch hour is still presence without being work.
pub fn calculate_work_time<'a>(
    buckets: impl IntoIterator<Item = &'a WorkHourBucket>,
) -> WorkTimeTotals {
    let mut totals = WorkTimeTotals::default();
    for bucket in buckets {
        if !bucket.has_activity {
            continue;
        }
        totals.total_hours += 1;
        match bucket.kind {
            HourKind::Regular => totals.normal_hours += 1,
            HourKind::Overtime => totals.overtime_hours += 1,
            HourKind::Break => {}
        }
    }
    totals
}

/// Distribution of overtime hours over a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvertimeStats {
    /// One entry for every calendar day in the requested range, zero included.
    pub by_day: BTreeMap<NaiveDate, u32>,
    pub by_hour: [u32; 24],
    pub weekday_total: u32,
    pub weekend_total: u32,
}

impl OvertimeStats {
    pub fn total(&self) -> u32 {
        self.weekday_total + self.weekend_total
    }
}

/// Tallies overtime hours per day, per hour-of-day and across the
/// weekday/weekend split. Days without overtime keep their zero entry so charts
/// get a continuous axis.
pub fn calculate_overtime_stats<'a>(
    buckets: impl IntoIterator<Item = &'a WorkHourBucket>,
    start: NaiveDate,
    end: NaiveDate,
) -> OvertimeStats {
    let mut by_day = BTreeMap::new();
    let mut day = start;
    while day <= end {
        by_day.insert(day, 0);
        day = day.succ_opt().expect("End of time should never happen");
    }

    let mut stats = OvertimeStats {
        by_day,
        by_hour: [0; 24],
        weekday_total: 0,
        weekend_total: 0,
    };

    for bucket in buckets {
        if !bucket.has_activity || !bucket.is_overtime() {
            continue;
        }
        if bucket.date < start || bucket.date > end {
            continue;
        }
        *stats.by_day.entry(bucket.date).or_insert(0) += 1;
        stats.by_hour[bucket.hour.min(23) as usize] += 1;
        if matches!(bucket.date.weekday(), Weekday::Sat | Weekday::Sun) {
            stats.weekend_total += 1;
        } else {
            stats.weekday_total += 1;
        }
    }

    stats
}

/// Extracts buckets of one user between 2 dates (both inclusive). To do it in an
/// efficient manner streams are used.
pub fn extract_buckets(
    storage: impl BucketStorage + Send + Sync + 'static,
    user_id: Arc<str>,
    start: NaiveDate,
    end: NaiveDate,
) -> impl Stream<Item = Result<WorkHourBucket>> {
    let storage = Arc::new(storage);

    let files = date_range(start, end)
        .map(move |day| {
            let storage = storage.clone();
            async move { (day, storage.get_day(day).await) }
        })
        .buffered(4);

    files
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to process bucket file {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .filter(move |v| {
            future::ready(match v {
                Ok(bucket) => bucket.user_id == user_id,
                Err(_) => true,
            })
        })
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold((start, end), |(mut current, end)| {
        future::ready({
            if current <= end {
                let last_current = current;
                current = current.succ_opt().expect("End of time should never happen");
                Some((last_current, (current, end)))
            } else {
                None
            }
        })
    })
}
