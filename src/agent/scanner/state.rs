use std::{collections::HashMap, io::ErrorKind, path::Path, path::PathBuf};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use super::records::DiffTotals;

/// Resume point for one repository. Every field defaults so documents written by
/// older versions still load.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCursor {
    /// Hash of the last commit that was reported. Commits strictly after it are new.
    #[serde(default)]
    pub last_commit_hash: Option<String>,
    /// Content hash of the working-tree diff seen on the previous pass.
    #[serde(default)]
    pub last_diff_fingerprint: Option<String>,
    /// Full (non-delta) uncommitted stats snapshot from the previous pass.
    #[serde(default)]
    pub last_uncommitted: DiffTotals,
}

/// Cursor state for every known repository, persisted as a single document.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerState {
    #[serde(default)]
    pub repos: HashMap<PathBuf, RepoCursor>,
}

impl ScannerState {
    pub fn cursor(&self, repo: &Path) -> RepoCursor {
        self.repos.get(repo).cloned().unwrap_or_default()
    }

    pub fn set_cursor(&mut self, repo: PathBuf, cursor: RepoCursor) {
        self.repos.insert(repo, cursor);
    }
}

/// Persistence for [ScannerState].
///
/// Loading never fails: an unreadable document degrades to the empty state, which
/// just means the next pass re-scans with the bounded fallback windows. Saving is
/// best-effort for the same reason.
pub struct DiffStateStore {
    state_path: PathBuf,
    lock_path: PathBuf,
}

/// Held for the duration of one scan pass. Protects the load-modify-save cycle
/// against a second agent instance pointed at the same state directory.
pub struct ScanPassLock {
    file: File,
}

impl ScanPassLock {
    pub async fn release(self) -> Result<()> {
        self.file.unlock_async().await?;
        Ok(())
    }
}

impl DiffStateStore {
    pub fn new(state_dir: &Path) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(state_dir)?;

        Ok(Self {
            state_path: state_dir.join("scanner-state.json"),
            lock_path: state_dir.join("scanner.lock"),
        })
    }

    /// Takes the single-writer lock for a pass. Blocks until a competing pass
    /// finishes.
    pub async fn lock_pass(&self) -> Result<ScanPassLock> {
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .await?;
        file.lock_exclusive()?;
        Ok(ScanPassLock { file })
    }

    pub async fn load(&self) -> ScannerState {
        let mut file = match File::open(&self.state_path).await {
            Ok(v) => v,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Could not open scanner state {:?}: {e}", self.state_path);
                }
                return ScannerState::default();
            }
        };

        let mut content = String::new();
        if let Err(e) = file.read_to_string(&mut content).await {
            warn!("Could not read scanner state {:?}: {e}", self.state_path);
            return ScannerState::default();
        }

        match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                // Might happen after shutdowns or a schema change. A full re-scan
                // is bounded by the fallback windows, so dropping the state is safe.
                warn!("Scanner state {:?} is unreadable: {e}", self.state_path);
                ScannerState::default()
            }
        }
    }

    pub async fn save(&self, state: &ScannerState) {
        if let Err(e) = self.save_inner(state).await {
            warn!("Failed to persist scanner state {:?}: {e}", self.state_path);
        }
    }

    async fn save_inner(&self, state: &ScannerState) -> Result<()> {
        let tmp = self.state_path.with_extension("json.tmp");
        let content = serde_json::to_vec(state)?;

        let mut file = File::create(&tmp).await?;
        file.write_all(&content).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.state_path).await?;
        debug!("Saved scanner state for {} repositories", state.repos.len());
        Ok(())
    }
}
