use std::sync::Arc;

use anyhow::Result;
use chrono::Local;

use crate::{
    agent::scanner::records::ChangeRecord,
    tracker::{
        aggregator::{ActivityKind, WorkHourAggregator},
        buckets::BucketStorage,
    },
};

use super::module::ChangeProcessor;

/// Bridges the scanning pipeline and [WorkHourAggregator]: every change record
/// becomes one unit of code activity in the hour it was recorded at.
pub struct ActivityRecorder<S: BucketStorage> {
    aggregator: WorkHourAggregator<S>,
    user_id: Arc<str>,
}

impl<S: BucketStorage> ActivityRecorder<S> {
    pub fn new(aggregator: WorkHourAggregator<S>, user_id: Arc<str>) -> Self {
        Self {
            aggregator,
            user_id,
        }
    }
}

impl<S: BucketStorage> ChangeProcessor for ActivityRecorder<S> {
    async fn process_next(&mut self, record: ChangeRecord) -> Result<()> {
        self.aggregator
            .record_activity(
                &self.user_id,
                record.recorded_at.with_timezone(&Local),
                ActivityKind::Code,
                1,
            )
            .await
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
