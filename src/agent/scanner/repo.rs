use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use git2::{DiffFormat, DiffOptions, Oid, Repository};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::records::{DiffTotals, ScanError};

/// Fallback window when a remembered commit hash no longer resolves, for example
/// after a history rewrite.
const STALE_CURSOR_WINDOW: Duration = Duration::hours(24);
/// Fallback window for a repository that was never scanned. Kept short to avoid
/// flooding the collector with a repository's whole history.
const FIRST_SCAN_WINDOW: Duration = Duration::hours(1);

/// Enumerates git repositories reachable from the configured roots: the root
/// itself when it is a repository, plus immediate subdirectories that are
/// repositories. Exclude patterns match as substrings of the repository name or
/// its full path.
pub fn discover_repositories(roots: &[PathBuf], exclude_patterns: &[String]) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for root in roots {
        if is_repository(root) {
            found.push(root.clone());
        }

        let entries = match std::fs::read_dir(root) {
            Ok(v) => v,
            Err(e) => {
                warn!("Can't list watch root {root:?}: {e}");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && is_repository(&path) {
                found.push(path);
            }
        }
    }

    found.retain(|path| !is_excluded(path, exclude_patterns));
    found.sort();
    found.dedup();
    debug!("Discovered {} repositories", found.len());
    found
}

fn is_repository(path: &Path) -> bool {
    // A .git file (not directory) covers worktrees and submodules.
    path.join(".git").exists()
}

fn is_excluded(path: &Path, patterns: &[String]) -> bool {
    let full_path = path.to_string_lossy();
    let name = path
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| name.contains(p.as_str()) || full_path.contains(p.as_str()))
}

/// Fingerprint and aggregate stats of the current working-tree diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDiff {
    pub fingerprint: String,
    pub totals: DiffTotals,
}

/// Read access to a single repository. Only a linear first-parent view of the
/// current branch and the working-tree diff are exposed, this is not a general
/// purpose VCS layer.
pub struct ScannedRepo {
    repo: Repository,
    name: Arc<str>,
}

impl ScannedRepo {
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let repo = Repository::open(path)?;
        let name: Arc<str> = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string())
            .into();
        Ok(Self { repo, name })
    }

    /// Directory basename. This is the only repository identifier that leaves
    /// the machine.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn branch_name(&self) -> Arc<str> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.shorthand().map(|v| v.to_string()))
            .unwrap_or_else(|| "HEAD".to_string())
            .into()
    }

    fn head_oid(&self) -> Option<Oid> {
        self.repo.head().ok().and_then(|head| head.target())
    }

    /// Commit hashes that are new relative to `cursor`, oldest first.
    ///
    /// When the cursor still resolves this is exactly the `cursor..HEAD` range
    /// along the first parent. When it does not (or never existed) only commits
    /// inside a bounded time window are returned.
    pub fn new_commits(
        &self,
        cursor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, ScanError> {
        let Some(head) = self.head_oid() else {
            // Unborn branch, nothing to report yet.
            return Ok(vec![]);
        };

        let resolved = cursor
            .and_then(|hash| Oid::from_str(hash).ok())
            .filter(|oid| self.repo.find_commit(*oid).is_ok());

        let mut walk = self.repo.revwalk()?;
        walk.push(head)?;
        walk.simplify_first_parent()?;

        let window = match (resolved, cursor) {
            (Some(oid), _) => {
                walk.hide(oid)?;
                None
            }
            (None, Some(stale)) => {
                debug!("Cursor {stale} of {} no longer resolves", self.name);
                Some(STALE_CURSOR_WINDOW)
            }
            (None, None) => Some(FIRST_SCAN_WINDOW),
        };
        let cutoff = window.map(|w| (now - w).timestamp());

        let mut commits = Vec::new();
        for oid in walk {
            let oid = oid?;
            if let Some(cutoff) = cutoff {
                let commit = self.repo.find_commit(oid)?;
                if commit.time().seconds() < cutoff {
                    break;
                }
            }
            commits.push(oid.to_string());
        }
        commits.reverse();
        Ok(commits)
    }

    /// File/line stats of one commit against its first parent.
    pub fn commit_totals(&self, hash: &str) -> Result<DiffTotals, ScanError> {
        let commit = self.repo.find_commit(Oid::from_str(hash)?)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(commit.parent(0)?.tree()?),
        };

        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        Ok(totals_of(&diff)?)
    }

    /// The working-tree diff against HEAD, untracked files included. Returns
    /// [None] when the tree is clean.
    pub fn working_diff(&self) -> Result<Option<WorkingDiff>, ScanError> {
        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(_) => None,
        };

        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .show_untracked_content(true);
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;

        if diff.deltas().len() == 0 {
            return Ok(None);
        }

        let mut patch = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            patch.push(line.origin() as u8);
            patch.extend_from_slice(line.content());
            true
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&patch);

        Ok(Some(WorkingDiff {
            fingerprint: hex::encode(hasher.finalize()),
            totals: totals_of(&diff)?,
        }))
    }
}

fn totals_of(diff: &git2::Diff) -> Result<DiffTotals, git2::Error> {
    let stats = diff.stats()?;
    Ok(DiffTotals {
        files_changed: stats.files_changed() as u64,
        lines_added: stats.insertions() as u64,
        lines_deleted: stats.deletions() as u64,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;

    use anyhow::Result;
    use chrono::Utc;
    use git2::{Repository, Signature};
    use tempfile::{tempdir, TempDir};

    use super::{discover_repositories, ScannedRepo};

    pub(crate) fn init_repo(dir: &Path) -> Repository {
        Repository::init(dir).unwrap()
    }

    pub(crate) fn commit_file(
        repo: &Repository,
        name: &str,
        content: &str,
        message: &str,
    ) -> String {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let signature = Signature::now("tester", "tester@example.com").unwrap();
        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .map(|oid| repo.find_commit(oid).unwrap());
        let parents: Vec<_> = parent.iter().collect();

        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )
        .unwrap()
        .to_string()
    }

    fn repo_fixture() -> (TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = init_repo(dir.path());
        (dir, repo)
    }

    #[test]
    fn test_first_scan_uses_bounded_window() -> Result<()> {
        let (dir, repo) = repo_fixture();
        let a = commit_file(&repo, "a.txt", "one\n", "first");
        let b = commit_file(&repo, "a.txt", "one\ntwo\n", "second");

        let scanned = ScannedRepo::open(dir.path())?;
        // Fresh commits fall inside the 1h first-scan window.
        let commits = scanned.new_commits(None, Utc::now())?;
        assert_eq!(commits, vec![a, b]);
        Ok(())
    }

    #[test]
    fn test_resumes_after_cursor_oldest_first() -> Result<()> {
        let (dir, repo) = repo_fixture();
        let a = commit_file(&repo, "a.txt", "one\n", "a");
        let b = commit_file(&repo, "a.txt", "one\ntwo\n", "b");
        let c = commit_file(&repo, "a.txt", "one\ntwo\nthree\n", "c");

        let scanned = ScannedRepo::open(dir.path())?;
        let commits = scanned.new_commits(Some(&a), Utc::now())?;
        assert_eq!(commits, vec![b, c]);
        Ok(())
    }

    #[test]
    fn test_no_new_commits_after_head_cursor() -> Result<()> {
        let (dir, repo) = repo_fixture();
        commit_file(&repo, "a.txt", "one\n", "a");
        let b = commit_file(&repo, "a.txt", "one\ntwo\n", "b");

        let scanned = ScannedRepo::open(dir.path())?;
        assert!(scanned.new_commits(Some(&b), Utc::now())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_stale_cursor_falls_back_to_window() -> Result<()> {
        let (dir, repo) = repo_fixture();
        let a = commit_file(&repo, "a.txt", "one\n", "a");
        let b = commit_file(&repo, "a.txt", "one\ntwo\n", "b");

        let scanned = ScannedRepo::open(dir.path())?;
        // A hash that does not exist in this repository.
        let stale = "0123456789012345678901234567890123456789";
        let commits = scanned.new_commits(Some(stale), Utc::now())?;
        assert_eq!(commits, vec![a, b]);
        Ok(())
    }

    #[test]
    fn test_empty_repository_has_no_commits() -> Result<()> {
        let (dir, _repo) = repo_fixture();

        let scanned = ScannedRepo::open(dir.path())?;
        assert!(scanned.new_commits(None, Utc::now())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_commit_totals() -> Result<()> {
        let (dir, repo) = repo_fixture();
        commit_file(&repo, "a.txt", "one\ntwo\n", "a");
        let b = commit_file(&repo, "a.txt", "one\nthree\nfour\n", "b");

        let scanned = ScannedRepo::open(dir.path())?;
        let totals = scanned.commit_totals(&b)?;
        assert_eq!(totals.files_changed, 1);
        assert_eq!(totals.lines_added, 2);
        assert_eq!(totals.lines_deleted, 1);
        Ok(())
    }

    #[test]
    fn test_root_commit_totals_count_all_lines() -> Result<()> {
        let (dir, repo) = repo_fixture();
        let a = commit_file(&repo, "a.txt", "one\ntwo\n", "a");

        let scanned = ScannedRepo::open(dir.path())?;
        let totals = scanned.commit_totals(&a)?;
        assert_eq!(totals.files_changed, 1);
        assert_eq!(totals.lines_added, 2);
        Ok(())
    }

    #[test]
    fn test_clean_tree_has_no_working_diff() -> Result<()> {
        let (dir, repo) = repo_fixture();
        commit_file(&repo, "a.txt", "one\n", "a");

        let scanned = ScannedRepo::open(dir.path())?;
        assert_eq!(scanned.working_diff()?, None);
        Ok(())
    }

    #[test]
    fn test_working_diff_stats_and_fingerprint_stability() -> Result<()> {
        let (dir, repo) = repo_fixture();
        commit_file(&repo, "a.txt", "one\ntwo\n", "a");
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\nfour\n")?;

        let scanned = ScannedRepo::open(dir.path())?;
        let first = scanned.working_diff()?.unwrap();
        assert_eq!(first.totals.lines_added, 2);
        assert_eq!(first.totals.lines_deleted, 0);
        assert_eq!(first.totals.files_changed, 1);

        // Identical tree produces an identical fingerprint.
        let second = scanned.working_diff()?.unwrap();
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_discovery_depth_one_and_excludes() -> Result<()> {
        let root = tempdir()?;
        init_repo(&root.path().join("alpha"));
        init_repo(&root.path().join("beta"));
        init_repo(&root.path().join("node_modules"));
        // Deeper than one level below the root, must not be found.
        std::fs::create_dir_all(root.path().join("nested"))?;
        init_repo(&root.path().join("nested/gamma"));
        std::fs::create_dir_all(root.path().join("not-a-repo"))?;

        let found = discover_repositories(
            &[root.path().to_owned()],
            &["node_modules".to_string()],
        );

        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        Ok(())
    }

    #[test]
    fn test_discovery_includes_root_repository() -> Result<()> {
        let root = tempdir()?;
        init_repo(root.path());

        let found = discover_repositories(&[root.path().to_owned()], &[]);
        assert_eq!(found, vec![root.path().to_owned()]);
        Ok(())
    }
}
