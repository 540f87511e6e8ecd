//! Incremental repository change detection.
//!  - Repositories are discovered below the configured watch roots.
//!  - A persisted cursor per repository makes commit reporting incremental.
//!  - Uncommitted changes are reported as positive deltas, deduplicated through
//!    a fingerprint of the raw diff text.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::utils::clock::Clock;

use self::{
    records::{ChangeRecord, DiffTotals, ScanError, ScanReport},
    repo::{discover_repositories, ScannedRepo},
    state::{DiffStateStore, RepoCursor},
};

pub mod records;
pub mod repo;
pub mod state;

/// Periodically walks the watched repositories and reports changes since the
/// previous pass to the processing side.
pub struct ScanModule {
    next: mpsc::Sender<ChangeRecord>,
    state_store: DiffStateStore,
    watch_roots: Vec<PathBuf>,
    exclude_patterns: Vec<String>,
    scan_frequency: Duration,
    shutdown: CancellationToken,
    time_provider: Box<dyn Clock>,
}

impl ScanModule {
    pub fn new(
        next: mpsc::Sender<ChangeRecord>,
        state_store: DiffStateStore,
        watch_roots: Vec<PathBuf>,
        exclude_patterns: Vec<String>,
        scan_frequency: Duration,
        shutdown: CancellationToken,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            state_store,
            watch_roots,
            exclude_patterns,
            scan_frequency,
            shutdown,
            time_provider,
        }
    }

    /// Executes the scanning event loop.
    pub async fn run(self) -> Result<()> {
        let mut scan_point = self.time_provider.instant();
        loop {
            scan_point += self.scan_frequency;

            match self.scan_pass().await {
                Ok(report) => {
                    info!(
                        "Pass finished: {} scanned, {} skipped, {} records",
                        report.repos_scanned, report.repos_skipped, report.records_emitted
                    );
                }
                Err(e) => {
                    // Only the loss of the reporting channel ends up here, every
                    // per-repository problem is absorbed into the report.
                    error!("Scan pass aborted {e:?}");
                    return Err(e);
                }
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop the processing module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(scan_point) => ()
            }
        }
    }

    /// One full pass over every watched repository. State is loaded once at the
    /// start and persisted once at the end, so an abandoned pass only costs a
    /// harmless re-emission on the next one.
    pub async fn scan_pass(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        if self.watch_roots.is_empty() {
            debug!("No watch roots configured, nothing to scan");
            return Ok(report);
        }

        let lock = match self.state_store.lock_pass().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping pass, could not take the state lock: {e}");
                return Ok(report);
            }
        };

        let mut state = self.state_store.load().await;
        let repos = discover_repositories(&self.watch_roots, &self.exclude_patterns);

        for path in repos {
            let mut cursor = state.cursor(&path);
            match self.scan_repository(&path, &mut cursor).await {
                Ok((commits, records)) => {
                    report.repos_scanned += 1;
                    report.commits_seen += commits;
                    report.records_emitted += records;
                }
                Err(ScanError::ReporterClosed) => {
                    // The pass is abandoned without saving, which is safe: the
                    // collector deduplicates re-emitted commits by hash.
                    if let Err(e) = lock.release().await {
                        warn!("Failed to release the pass lock: {e}");
                    }
                    return Err(ScanError::ReporterClosed.into());
                }
                Err(e) => {
                    warn!("Skipping repository {path:?}: {e}");
                    report.repos_skipped += 1;
                }
            }
            state.set_cursor(path, cursor);
        }

        self.state_store.save(&state).await;
        if let Err(e) = lock.release().await {
            warn!("Failed to release the pass lock: {e}");
        }
        Ok(report)
    }

    /// Reports new commits and the uncommitted delta of one repository.
    /// Returns `(commits seen, records emitted)`.
    async fn scan_repository(
        &self,
        path: &Path,
        cursor: &mut RepoCursor,
    ) -> Result<(usize, usize), ScanError> {
        let repo = ScannedRepo::open(path)?;
        let branch = repo.branch_name();
        let now = self.time_provider.time();
        let mut emitted = 0;

        let commits = repo.new_commits(cursor.last_commit_hash.as_deref(), now)?;
        let commits_seen = commits.len();
        for hash in commits {
            let totals = repo.commit_totals(&hash)?;
            // The cursor advances per commit, a crash mid-batch resumes after the
            // last processed commit instead of re-reporting the whole batch.
            cursor.last_commit_hash = Some(hash.clone());
            if totals.files_changed == 0 {
                // Empty commits advance the cursor without producing a record.
                continue;
            }
            self.send(ChangeRecord {
                repo_name: repo.name().clone(),
                branch: branch.clone(),
                totals,
                committed: true,
                commit_hash: Some(hash),
                recorded_at: now,
            })
            .await?;
            emitted += 1;
        }

        match repo.working_diff()? {
            None => {
                cursor.last_diff_fingerprint = None;
                cursor.last_uncommitted = DiffTotals::default();
            }
            Some(diff) if cursor.last_diff_fingerprint.as_deref() == Some(diff.fingerprint.as_str()) => {
                // Byte-identical diff since the last look, nothing new to report.
            }
            Some(diff) => {
                let delta = diff.totals.delta_since(&cursor.last_uncommitted);
                cursor.last_diff_fingerprint = Some(diff.fingerprint);
                cursor.last_uncommitted = diff.totals;

                if delta.lines_added + delta.lines_deleted > 0 {
                    self.send(ChangeRecord {
                        repo_name: repo.name().clone(),
                        branch,
                        totals: delta,
                        committed: false,
                        commit_hash: None,
                        recorded_at: now,
                    })
                    .await?;
                    emitted += 1;
                }
            }
        }

        Ok((commits_seen, emitted))
    }

    async fn send(&self, record: ChangeRecord) -> Result<(), ScanError> {
        debug!("Reporting {record:?}");
        self.next
            .send(record)
            .await
            .map_err(|_| ScanError::ReporterClosed)
    }
}
