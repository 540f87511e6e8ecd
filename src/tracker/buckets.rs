use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::utils::time::date_to_record_name;

use super::classifier::HourKind;

/// Aggregate of activity for one user during one hour of one local day.
/// The hour kind is decided once when the bucket is created and never recomputed,
/// even if the user's work-time configuration changes later that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHourBucket {
    pub user_id: Arc<str>,
    pub date: NaiveDate,
    pub hour: u32,
    #[serde(default)]
    pub has_activity: bool,
    #[serde(default)]
    pub code_changes: u32,
    #[serde(default)]
    pub web_activities: u32,
    #[serde(default = "default_kind")]
    pub kind: HourKind,
}

fn default_kind() -> HourKind {
    HourKind::Regular
}

impl WorkHourBucket {
    pub fn is_overtime(&self) -> bool {
        self.kind == HourKind::Overtime
    }
}

/// Interface for abstracting storage of hour buckets. Buckets are grouped into a
/// document per local day so that summary queries only touch the days they need.
pub trait BucketStorage {
    /// Retrieves every bucket recorded for a day, across all users.
    fn get_day(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<WorkHourBucket>>> + Send;

    /// Replaces the stored document for a day.
    fn put_day(
        &self,
        date: NaiveDate,
        buckets: Vec<WorkHourBucket>,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Deref> BucketStorage for T
where
    T::Target: BucketStorage,
{
    fn get_day(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<WorkHourBucket>>> + Send {
        self.deref().get_day(date)
    }

    fn put_day(
        &self,
        date: NaiveDate,
        buckets: Vec<WorkHourBucket>,
    ) -> impl Future<Output = Result<()>> + Send {
        self.deref().put_day(date, buckets)
    }
}

/// The main realization of [BucketStorage]. One json document per day in a flat
/// directory, written atomically through a temporary file.
pub struct BucketStorageImpl {
    bucket_dir: PathBuf,
}

impl BucketStorageImpl {
    pub fn new(bucket_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&bucket_dir)?;

        Ok(Self { bucket_dir })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.bucket_dir
            .join(format!("{}.json", date_to_record_name(date)))
    }
}

impl BucketStorage for BucketStorageImpl {
    async fn get_day(&self, date: NaiveDate) -> Result<Vec<WorkHourBucket>> {
        let path = self.day_path(date);
        debug!("Reading buckets from {path:?}");

        let mut file = match File::open(&path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        read?;

        match serde_json::from_str::<Vec<WorkHourBucket>>(&content) {
            Ok(v) => Ok(v),
            Err(e) => {
                // Corrupted documents might appear after shutdowns. Treated as a fresh day.
                warn!("Bucket document {path:?} is unreadable: {e}");
                Ok(vec![])
            }
        }
    }

    async fn put_day(&self, date: NaiveDate, buckets: Vec<WorkHourBucket>) -> Result<()> {
        let path = self.day_path(date);
        let tmp = path.with_extension("json.tmp");

        let mut file = File::create(&tmp).await?;
        file.lock_exclusive()?;
        let content = serde_json::to_vec(&buckets)?;
        let write = async {
            file.write_all(&content).await?;
            file.flush().await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        file.unlock_async().await?;
        write?;

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
