//! Commit-graph walker with blob-level deduplication.
//!
//! Unlike a per-commit diff/message extractor, this walker's unit of work is
//! the unique blob: every `(path, blob_sha)` pair touched by history is
//! accumulated under its blob SHA so identical content reached through
//! multiple commits or paths is read and embedded exactly once.
use crate::error::{GitCtxError, WalkerError};
use git2::{Repository, Sort};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One occurrence of a blob somewhere in history.
#[derive(Debug, Clone)]
pub struct BlobLocation {
    pub blob_sha: String,
    pub file_path: String,
    pub commit_sha: String,
    pub author_name: String,
    pub author_email: String,
    pub commit_date: i64,
    pub commit_message: String,
    pub is_head: bool,
    pub is_merge: bool,
}

/// One unique blob with every location it was found at.
#[derive(Debug, Clone)]
pub struct BlobRecord {
    pub sha: String,
    pub content: Vec<u8>,
    pub size: usize,
    pub locations: Vec<BlobLocation>,
}

/// Counters surfaced after a walk, mirroring the original implementation's
/// `WalkStats`.
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    pub commits_seen: usize,
    pub blobs_indexed: usize,
    pub blobs_skipped: usize,
    pub errors: usize,
}

/// Progress snapshot delivered every 10 commits. The callback is pure
/// observation; it cannot abort the walk and its own errors are swallowed.
pub struct Progress<'a> {
    pub commits_seen: usize,
    pub unique_blobs: usize,
    pub current_commit_sha: &'a str,
}

pub struct CommitWalker {
    repo: Repository,
    repo_path: PathBuf,
}

impl CommitWalker {
    /// Discover and open a git repository from any path within it.
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, GitCtxError> {
        let path = path.as_ref();
        let repo = Repository::discover(path)
            .map_err(|_| WalkerError::RepoNotFound(path.display().to_string()))?;
        let repo_path = repo
            .path()
            .parent()
            .ok_or_else(|| WalkerError::RepoNotFound(path.display().to_string()))?
            .to_path_buf();
        tracing::info!(path = %repo_path.display(), "opened git repository");
        Ok(Self { repo, repo_path })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// SHA of the commit `HEAD` currently resolves to.
    pub fn head_commit_sha(&self) -> Result<String, GitCtxError> {
        let head = self
            .repo
            .head()
            .and_then(|r| r.peel_to_commit())
            .map_err(|_| WalkerError::NoHead)?;
        Ok(head.id().to_string())
    }

    /// Walk every local ref's reachable commits, diffing each against its
    /// first parent (or the empty tree for roots), and emit one
    /// [`BlobRecord`] per unique blob SHA. `progress` is invoked every 10
    /// commits.
    pub fn walk_blobs(
        &self,
        mut progress: impl FnMut(Progress),
    ) -> Result<(Vec<BlobRecord>, WalkStats), GitCtxError> {
        let mut stats = WalkStats::default();
        let head_paths = self.head_blob_paths().unwrap_or_default();

        let mut revwalk = self.repo.revwalk().map_err(|_| WalkerError::NoHead)?;
        revwalk
            .set_sorting(Sort::TIME | Sort::TOPOLOGICAL)
            .map_err(|_| WalkerError::NoHead)?;
        if self.push_all_refs(&mut revwalk).is_err() {
            return Err(WalkerError::NoHead.into());
        }

        let mut accumulator: HashMap<String, Vec<BlobLocation>> = HashMap::new();

        for oid in revwalk {
            let oid = match oid {
                Ok(oid) => oid,
                Err(_) => {
                    stats.errors += 1;
                    continue;
                }
            };
            let commit = match self.repo.find_commit(oid) {
                Ok(c) => c,
                Err(_) => {
                    stats.errors += 1;
                    continue;
                }
            };

            let commit_sha = commit.id().to_string();
            let is_merge = commit.parent_count() > 1;
            let author = commit.author();
            let author_name = author.name().unwrap_or("unknown").to_string();
            let author_email = author.email().unwrap_or("").to_string();
            let commit_date = commit.time().seconds();
            let commit_message = commit.message().unwrap_or("").to_string();

            match self.diff_paths(&commit) {
                Ok(pairs) => {
                    for (path, blob_sha) in pairs {
                        let is_head = head_paths
                            .get(&path)
                            .map(|sha| sha == &blob_sha)
                            .unwrap_or(false);
                        accumulator.entry(blob_sha.clone()).or_default().push(BlobLocation {
                            blob_sha,
                            file_path: path,
                            commit_sha: commit_sha.clone(),
                            author_name: author_name.clone(),
                            author_email: author_email.clone(),
                            commit_date,
                            commit_message: commit_message.clone(),
                            is_head,
                            is_merge,
                        });
                    }
                }
                Err(_) => stats.errors += 1,
            }

            stats.commits_seen += 1;
            if stats.commits_seen % 10 == 0 {
                progress(Progress {
                    commits_seen: stats.commits_seen,
                    unique_blobs: accumulator.len(),
                    current_commit_sha: &commit_sha,
                });
            }
        }

        let mut records = Vec::with_capacity(accumulator.len());
        for (sha, mut locations) in accumulator {
            // HEAD locations first, then by commit_date descending.
            locations.sort_by(|a, b| {
                b.is_head
                    .cmp(&a.is_head)
                    .then_with(|| b.commit_date.cmp(&a.commit_date))
            });
            match self.read_blob(&sha) {
                Ok(content) => {
                    let size = content.len();
                    records.push(BlobRecord {
                        sha,
                        content,
                        size,
                        locations,
                    });
                    stats.blobs_indexed += 1;
                }
                Err(_) => {
                    stats.errors += 1;
                    stats.blobs_skipped += 1;
                }
            }
        }

        Ok((records, stats))
    }

    fn push_all_refs(&self, revwalk: &mut git2::Revwalk) -> Result<(), git2::Error> {
        let refs = self.repo.references()?;
        let mut pushed_any = false;
        for r in refs.flatten() {
            if let Some(oid) = r.target() {
                // Ignore refs that don't resolve to a commit (tags on blobs, etc).
                if self.repo.find_commit(oid).is_ok() && revwalk.push(oid).is_ok() {
                    pushed_any = true;
                }
            }
        }
        if !pushed_any {
            revwalk.push_head()?;
        }
        Ok(())
    }

    /// `(path, blob_sha)` for every entry reachable from HEAD's tree.
    fn head_blob_paths(&self) -> Result<HashMap<String, String>, git2::Error> {
        let head = self.repo.head()?.peel_to_commit()?;
        let tree = head.tree()?;
        let mut paths = HashMap::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                let path = format!("{root}{}", entry.name().unwrap_or(""));
                paths.insert(path, entry.id().to_string());
            }
            git2::TreeWalkResult::Ok
        })?;
        Ok(paths)
    }

    fn diff_paths(&self, commit: &git2::Commit) -> Result<Vec<(String, String)>, git2::Error> {
        let tree = commit.tree()?;
        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut pairs = Vec::new();
        for delta in diff.deltas() {
            if delta.new_file().path().is_none() {
                continue;
            }
            let path = delta.new_file().path().unwrap().display().to_string();
            let blob_sha = delta.new_file().id().to_string();
            pairs.push((path, blob_sha));
        }
        Ok(pairs)
    }

    fn read_blob(&self, sha: &str) -> Result<Vec<u8>, git2::Error> {
        let oid = git2::Oid::from_str(sha)?;
        let blob = self.repo.find_blob(oid)?;
        Ok(blob.content().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn run(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("git invocation");
        assert!(status.success(), "git {:?} failed", args);
    }

    fn init_repo() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), &["init", "-q"]);
        run(tmp.path(), &["config", "user.email", "a@b.c"]);
        run(tmp.path(), &["config", "user.name", "tester"]);
        tmp
    }

    #[test]
    fn walk_dedupes_identical_blob_across_commits() {
        let tmp = init_repo();
        std::fs::write(tmp.path().join("a.txt"), "hello\n").unwrap();
        run(tmp.path(), &["add", "."]);
        run(tmp.path(), &["commit", "-q", "-m", "first"]);

        std::fs::write(tmp.path().join("b.txt"), "hello\n").unwrap();
        run(tmp.path(), &["add", "."]);
        run(tmp.path(), &["commit", "-q", "-m", "second"]);

        let walker = CommitWalker::discover(tmp.path()).unwrap();
        let (records, stats) = walker.walk_blobs(|_| {}).unwrap();

        let hello_blob = records.iter().find(|r| r.content == b"hello\n").unwrap();
        assert_eq!(hello_blob.locations.len(), 2);
        assert_eq!(stats.commits_seen, 2);
    }

    #[test]
    fn head_locations_are_marked_and_sorted_first() {
        let tmp = init_repo();
        std::fs::write(tmp.path().join("a.txt"), "v1\n").unwrap();
        run(tmp.path(), &["add", "."]);
        run(tmp.path(), &["commit", "-q", "-m", "first"]);

        std::fs::write(tmp.path().join("a.txt"), "v2\n").unwrap();
        run(tmp.path(), &["add", "."]);
        run(tmp.path(), &["commit", "-q", "-m", "second"]);

        let walker = CommitWalker::discover(tmp.path()).unwrap();
        let (records, _stats) = walker.walk_blobs(|_| {}).unwrap();

        let head_record = records.iter().find(|r| r.content == b"v2\n").unwrap();
        assert!(head_record.locations[0].is_head);

        let old_record = records.iter().find(|r| r.content == b"v1\n").unwrap();
        assert!(!old_record.locations[0].is_head);
    }

    #[test]
    fn no_head_repo_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), &["init", "-q"]);
        let walker = CommitWalker::discover(tmp.path()).unwrap();
        let err = walker.walk_blobs(|_| {}).unwrap_err();
        assert!(matches!(err, GitCtxError::Walker(WalkerError::NoHead)));
    }
}
