use anyhow::Result;
use chrono::{DateTime, Local, Timelike};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    buckets::{BucketStorage, WorkHourBucket},
    classifier::{classify_hour, WorkTimeConfig},
};

/// What produced an activity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// Commit or uncommitted-diff change reported by the repository scanner.
    Code,
    /// Browser event reported by the web-activity boundary.
    Web,
}

/// Resolves the work-time configuration for a user. Users without an explicit
/// configuration get the defaults.
#[cfg_attr(test, mockall::automock)]
pub trait WorkTimeConfigSource: Send + Sync {
    fn config_for(&self, user_id: &str) -> WorkTimeConfig;
}

/// A fixed user → config mapping. Serves the agent, which only knows the users
/// listed in its configuration file.
pub struct StaticConfigSource {
    configs: std::collections::HashMap<String, WorkTimeConfig>,
}

impl StaticConfigSource {
    pub fn new(configs: std::collections::HashMap<String, WorkTimeConfig>) -> Self {
        Self { configs }
    }
}

impl WorkTimeConfigSource for StaticConfigSource {
    fn config_for(&self, user_id: &str) -> WorkTimeConfig {
        self.configs.get(user_id).cloned().unwrap_or_default()
    }
}

/// Accumulates activity into per-user-per-day-per-hour buckets.
///
/// Upserts are serialized through a mutex so that concurrent reports for the same
/// hour never lose increments. The hour kind is classified once, when the bucket
/// is created, and kept as-is afterwards.
pub struct WorkHourAggregator<S: BucketStorage> {
    storage: S,
    configs: Box<dyn WorkTimeConfigSource>,
    write_guard: Mutex<()>,
}

impl<S: BucketStorage> WorkHourAggregator<S> {
    pub fn new(storage: S, configs: Box<dyn WorkTimeConfigSource>) -> Self {
        Self {
            storage,
            configs,
            write_guard: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Registers `count` units of activity in the hour bucket that `timestamp`
    /// falls into, creating the bucket on first activity.
    pub async fn record_activity(
        &self,
        user_id: &str,
        timestamp: DateTime<Local>,
        kind: ActivityKind,
        count: u32,
    ) -> Result<()> {
        let date = timestamp.date_naive();
        let hour = timestamp.hour();

        let _guard = self.write_guard.lock().await;

        let mut day = self.storage.get_day(date).await?;
        let bucket = match day
            .iter_mut()
            .find(|b| b.hour == hour && b.user_id.as_ref() == user_id)
        {
            Some(v) => v,
            None => {
                let config = self.configs.config_for(user_id);
                let hour_kind = classify_hour(&config, date, hour);
                debug!("Opening bucket for {user_id} at {date} {hour}h as {hour_kind:?}");
                day.push(WorkHourBucket {
                    user_id: user_id.into(),
                    date,
                    hour,
                    has_activity: false,
                    code_changes: 0,
                    web_activities: 0,
                    kind: hour_kind,
                });
                day.last_mut().unwrap()
            }
        };

        bucket.has_activity = true;
        match kind {
            ActivityKind::Code => bucket.code_changes += count,
            ActivityKind::Web => bucket.web_activities += count,
        }

        self.storage.put_day(date, day).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    use crate::tracker::{
        buckets::{BucketStorage, BucketStorageImpl},
        classifier::{HourKind, WorkTimeConfig},
    };

    use super::{ActivityKind, MockWorkTimeConfigSource, WorkHourAggregator};

    fn default_source() -> MockWorkTimeConfigSource {
        let mut source = MockWorkTimeConfigSource::new();
        source
            .expect_config_for()
            .returning(|_| WorkTimeConfig::default());
        source
    }

    fn aggregator(
        dir: &std::path::Path,
        source: MockWorkTimeConfigSource,
    ) -> WorkHourAggregator<BucketStorageImpl> {
        let storage = BucketStorageImpl::new(dir.to_owned()).unwrap();
        WorkHourAggregator::new(storage, Box::new(source))
    }

    #[tokio::test]
    async fn test_counts_accumulate_within_hour() -> Result<()> {
        let dir = tempdir()?;
        let aggregator = aggregator(dir.path(), default_source());
        // Monday 10:00 and 10:40 land in the same bucket.
        let first = Local.with_ymd_and_hms(2018, 7, 2, 10, 0, 0).unwrap();
        let second = Local.with_ymd_and_hms(2018, 7, 2, 10, 40, 0).unwrap();

        aggregator
            .record_activity("tester", first, ActivityKind::Code, 1)
            .await?;
        aggregator
            .record_activity("tester", second, ActivityKind::Code, 2)
            .await?;
        aggregator
            .record_activity("tester", second, ActivityKind::Web, 5)
            .await?;

        let day = aggregator.storage().get_day(first.date_naive()).await?;
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].code_changes, 3);
        assert_eq!(day[0].web_activities, 5);
        assert!(day[0].has_activity);
        assert_eq!(day[0].kind, HourKind::Regular);
        Ok(())
    }

    #[tokio::test]
    async fn test_users_get_separate_buckets() -> Result<()> {
        let dir = tempdir()?;
        let aggregator = aggregator(dir.path(), default_source());
        let moment = Local.with_ymd_and_hms(2018, 7, 2, 10, 0, 0).unwrap();

        aggregator
            .record_activity("a", moment, ActivityKind::Code, 1)
            .await?;
        aggregator
            .record_activity("b", moment, ActivityKind::Code, 1)
            .await?;

        let day = aggregator.storage().get_day(moment.date_naive()).await?;
        assert_eq!(day.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_hour_kind_is_frozen_on_creation() -> Result<()> {
        let dir = tempdir()?;
        let calls = AtomicUsize::new(0);
        let mut source = MockWorkTimeConfigSource::new();
        source.expect_config_for().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                WorkTimeConfig::default()
            } else {
                // A later lookup would declare every hour overtime.
                WorkTimeConfig {
                    work_start: "00:00".into(),
                    work_end: "00:00".into(),
                    lunch_start: "00:00".into(),
                    lunch_end: "00:00".into(),
                    weekend_is_overtime: true,
                }
            }
        });
        let aggregator = aggregator(dir.path(), source);
        let moment = Local.with_ymd_and_hms(2018, 7, 2, 10, 0, 0).unwrap();

        aggregator
            .record_activity("tester", moment, ActivityKind::Code, 1)
            .await?;
        aggregator
            .record_activity("tester", moment, ActivityKind::Code, 1)
            .await?;

        let day = aggregator.storage().get_day(moment.date_naive()).await?;
        assert_eq!(day.len(), 1);
        // Still classified with the configuration seen at creation time.
        assert_eq!(day[0].kind, HourKind::Regular);
        Ok(())
    }

    #[tokio::test]
    async fn test_scenario_classification() -> Result<()> {
        let dir = tempdir()?;
        let aggregator = aggregator(dir.path(), default_source());

        // Monday 13:30 is lunch, Monday 19:10 is overtime, Saturday 10:00 is overtime.
        let lunch = Local.with_ymd_and_hms(2018, 7, 2, 13, 30, 0).unwrap();
        let evening = Local.with_ymd_and_hms(2018, 7, 2, 19, 10, 0).unwrap();
        let saturday = Local.with_ymd_and_hms(2018, 7, 7, 10, 0, 0).unwrap();

        for moment in [lunch, evening, saturday] {
            aggregator
                .record_activity("tester", moment, ActivityKind::Web, 1)
                .await?;
        }

        let monday = aggregator.storage().get_day(lunch.date_naive()).await?;
        let lunch_bucket = monday.iter().find(|b| b.hour == 13).unwrap();
        assert_eq!(lunch_bucket.kind, HourKind::Break);
        assert!(!lunch_bucket.is_overtime());
        assert!(lunch_bucket.has_activity);

        let evening_bucket = monday.iter().find(|b| b.hour == 19).unwrap();
        assert!(evening_bucket.is_overtime());

        let weekend = aggregator.storage().get_day(saturday.date_naive()).await?;
        assert!(weekend[0].is_overtime());
        Ok(())
    }
}
