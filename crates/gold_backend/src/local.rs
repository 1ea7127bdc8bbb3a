//! Minimal in-process stand-ins for the collaborators spec §1 explicitly
//! treats as out of scope: the gitiles HTTP client, the raw trace store, the
//! diff-computation service, and the changelist/repo-tracking tables a real
//! deployment would back with its code-review system and a SQL table. This
//! binary is the single-process "run it locally" variant of the core, the
//! same role `local_backend` plays for the wider Convex backend — real
//! upstream integrations are swapped for local equivalents so the pipeline
//! is exercisable end to end without one.

use std::collections::HashMap;

use async_trait::async_trait;
use gitiles_follower::{
    CommitTable,
    GitilesClient,
};
use gold_types::{
    commit::COMMIT_ID_ANCHOR,
    Commit,
    CommitId,
    GitHash,
};
use imbl::Vector;
use indexer_core::{
    DiffCache,
    DiffWork,
    DiffWorkPublisher,
};
use parking_lot::Mutex;

/// Backs both `gitiles_follower::CommitTable` (the sink commit ids are
/// assigned into) and `tile_source::VcsSource` (the tile source's read of
/// "recent commits"), so commits the follower assigns are immediately
/// visible to the tile source without a separate sync step.
#[derive(Default)]
pub struct InMemoryCommitTable {
    by_hash: Mutex<HashMap<GitHash, Commit>>,
    ordered: Mutex<Vec<GitHash>>,
}

impl InMemoryCommitTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommitTable for InMemoryCommitTable {
    async fn latest(&self) -> anyhow::Result<Option<(GitHash, CommitId)>> {
        let ordered = self.ordered.lock();
        let by_hash = self.by_hash.lock();
        Ok(ordered.last().map(|hash| (hash.clone(), by_hash[hash].id)))
    }

    async fn upsert_batch(&self, commits: &[Commit]) -> anyhow::Result<()> {
        let mut by_hash = self.by_hash.lock();
        let mut ordered = self.ordered.lock();
        for commit in commits {
            if by_hash.insert(commit.hash.clone(), commit.clone()).is_none() {
                ordered.push(commit.hash.clone());
            }
        }
        ordered.sort_by_key(|hash| by_hash[hash].id);
        Ok(())
    }

    async fn all(&self) -> anyhow::Result<Vec<Commit>> {
        let ordered = self.ordered.lock();
        let by_hash = self.by_hash.lock();
        Ok(ordered.iter().map(|hash| by_hash[hash].clone()).collect())
    }
}

#[async_trait]
impl tile_source::VcsSource for InMemoryCommitTable {
    async fn recent_commits(&self, num_commits: usize) -> anyhow::Result<Vector<Commit>> {
        let ordered = self.ordered.lock();
        let by_hash = self.by_hash.lock();
        Ok(ordered
            .iter()
            .rev()
            .take(num_commits)
            .rev()
            .map(|hash| by_hash[hash].clone())
            .collect())
    }
}

/// No raw-trace ingestion pipeline is in scope (spec §1): this always
/// reports an empty trace set, so the tile source's output reflects only
/// the commit window until a real trace store is wired in.
pub struct EmptyTraceStore;

#[async_trait]
impl tile_source::RawTraceStore for EmptyTraceStore {
    async fn recent_traces(
        &self,
        _commits: &Vector<Commit>,
    ) -> anyhow::Result<imbl::HashMap<gold_types::TraceId, gold_types::Trace>> {
        Ok(imbl::HashMap::new())
    }
}

/// Stands in for a real gitiles HTTP client. Always reports `initial_hash`
/// as the latest commit on every branch and an empty log, so a poll cycle
/// is a genuine no-op rather than a fabricated history; a deployment with a
/// real upstream swaps in an actual `GitilesClient`.
pub struct NullGitilesClient {
    initial_hash: GitHash,
}

impl NullGitilesClient {
    pub fn new(initial_hash: GitHash) -> Self {
        Self { initial_hash }
    }
}

#[async_trait]
impl GitilesClient for NullGitilesClient {
    async fn latest_hash(&self, _branch: &str) -> anyhow::Result<GitHash> {
        Ok(self.initial_hash.clone())
    }

    async fn log_first_parent(
        &self,
        _since: Option<&GitHash>,
        _until: &GitHash,
    ) -> anyhow::Result<Vec<gitiles_follower::CommitMeta>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct InMemoryRepoTracker {
    last_hash: Mutex<HashMap<String, GitHash>>,
}

impl InMemoryRepoTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl gitiles_follower::RepoTracker for InMemoryRepoTracker {
    async fn last_git_hash(&self, repo: &str) -> anyhow::Result<Option<GitHash>> {
        Ok(self.last_hash.lock().get(repo).cloned())
    }

    async fn set_last_git_hash(&self, repo: &str, hash: GitHash) -> anyhow::Result<()> {
        self.last_hash.lock().insert(repo.to_owned(), hash);
        Ok(())
    }
}

/// The code-review system's changelist entity is out of scope; landing a CL
/// is logged rather than reflected anywhere a real CRS client would show it.
pub struct NullChangelistStore;

#[async_trait]
impl gitiles_follower::ChangelistStore for NullChangelistStore {
    async fn set_landed(&self, crs: gold_types::CrsId, cl: &gold_types::ChangelistId) -> anyhow::Result<()> {
        tracing::info!(%crs, %cl, "changelist landed");
        Ok(())
    }
}

/// The diff-metric cache is out of scope; nothing is ever reported cached,
/// so the warmer always enqueues work for untriaged digests.
pub struct NullDiffCache;

#[async_trait]
impl DiffCache for NullDiffCache {
    async fn is_cached(&self, _grouping: &gold_types::Grouping, _digest: &gold_types::Digest) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// The diff-computation pub/sub topic is out of scope; work items are logged
/// for local visibility and dropped rather than actually computed.
pub struct NullDiffWorkPublisher;

#[async_trait]
impl DiffWorkPublisher for NullDiffWorkPublisher {
    async fn publish(&self, work: DiffWork) -> anyhow::Result<()> {
        tracing::debug!(?work, "diff work (no diff service wired up)");
        Ok(())
    }
}

/// The genesis commit every repo's first `log_first_parent` call is anchored
/// from, and the seed `CommitId` the commit-id algorithm counts up from.
pub fn anchor_commit() -> (GitHash, CommitId) {
    (GitHash::new("0".repeat(40)), CommitId::new(COMMIT_ID_ANCHOR))
}
