//! Monotonic commit-id assignment and landed-CL expectation migration, per
//! spec §4.7. `GitilesClient` is the external gitiles HTTP client spec §1
//! treats as out of scope; only the shape this crate consumes is modeled.

mod metrics;

use std::{
    collections::BTreeMap,
    sync::Arc,
};

use async_trait::async_trait;
use backoff::RetryBudget;
use expectation_store::ExpectationStore;
use gold_types::{
    commit::COMMIT_ID_ANCHOR,
    Branch,
    ChangelistId,
    Commit,
    CommitId,
    CrsId,
    ExpectationDelta,
    GitHash,
    Timestamp,
};

/// Commit metadata as returned by the (out-of-scope) gitiles HTTP client,
/// before a commit id has been assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitMeta {
    pub hash: GitHash,
    pub timestamp: Timestamp,
    pub author: String,
    pub subject: String,
    pub message: String,
}

/// The gitiles HTTP client. Out of scope per spec §1; only the shape this
/// crate consumes is modeled here.
#[async_trait]
pub trait GitilesClient: Send + Sync {
    async fn latest_hash(&self, branch: &str) -> anyhow::Result<GitHash>;

    /// First-parent log strictly after `since` (or from the beginning of
    /// history if `None`) up to and including `until`, newest-first — the
    /// same order the real gitiles JSON log API returns.
    async fn log_first_parent(
        &self,
        since: Option<&GitHash>,
        until: &GitHash,
    ) -> anyhow::Result<Vec<CommitMeta>>;
}

/// The commit table of spec §6: `(git_hash, commit_id, ...)` keyed by
/// `git_hash`, queried by commit-id order.
#[async_trait]
pub trait CommitTable: Send + Sync {
    /// The `(git_hash, commit_id)` with the greatest `commit_id`, or `None`
    /// if the table is empty.
    async fn latest(&self) -> anyhow::Result<Option<(GitHash, CommitId)>>;

    async fn upsert_batch(&self, commits: &[Commit]) -> anyhow::Result<()>;

    async fn all(&self) -> anyhow::Result<Vec<Commit>>;
}

/// The tracking table of spec §6: `(repo, last_git_hash)`, one row per
/// configured repo used for landed-CL migration.
#[async_trait]
pub trait RepoTracker: Send + Sync {
    async fn last_git_hash(&self, repo: &str) -> anyhow::Result<Option<GitHash>>;
    async fn set_last_git_hash(&self, repo: &str, hash: GitHash) -> anyhow::Result<()>;
}

/// The changelist entity a real code-review-system client would expose. Out
/// of scope per spec §1; `set_landed` is the only mutation this crate needs.
#[async_trait]
pub trait ChangelistStore: Send + Sync {
    async fn set_landed(&self, crs: CrsId, cl: &ChangelistId) -> anyhow::Result<()>;
}

/// How a repo's commit messages encode the changelist id that landed them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClIdExtractor {
    /// `Reviewed-on: <url>/<id>` somewhere in the commit body.
    ReviewedLine,
    /// `(#<id>)` at the very end of the subject line.
    FromSubject,
}

impl ClIdExtractor {
    pub fn extract(&self, commit: &CommitMeta) -> Option<ChangelistId> {
        match self {
            ClIdExtractor::ReviewedLine => commit.message.lines().find_map(|line| {
                let line = line.trim();
                let rest = line.strip_prefix("Reviewed-on:")?.trim();
                let id = rest.rsplit('/').next()?.trim();
                (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| ChangelistId::new(id))
            }),
            ClIdExtractor::FromSubject => {
                let subject = commit.subject.trim();
                let suffix = subject.strip_suffix(')')?;
                let start = suffix.rfind("(#")?;
                let id = &suffix[start + 2..];
                (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| ChangelistId::new(id))
            },
        }
    }
}

/// One repo configured for landed-CL migration: which CRS its CLs live in,
/// how to extract a CL id from a landing commit, and whether to flip the
/// Changelist's status to `landed` once migrated.
#[derive(Clone, Debug)]
pub struct RepoConfig {
    pub name: String,
    pub crs: CrsId,
    pub extractor: ClIdExtractor,
    pub set_landed: bool,
}

pub struct GitilesFollower {
    vcs: Arc<dyn GitilesClient>,
    commits: Arc<dyn CommitTable>,
    repo_tracker: Arc<dyn RepoTracker>,
    changelists: Arc<dyn ChangelistStore>,
    expectations: Arc<dyn ExpectationStore>,
    tracked_branch: String,
    initial_commit: GitHash,
    repos: Vec<RepoConfig>,
    /// Wraps every gitiles RPC (`latest_hash`, `log_first_parent`) so a
    /// transient hiccup from the out-of-scope HTTP client is retried within
    /// the same poll cycle rather than deferred to the next one, per spec
    /// §5's "every storage operation uses a bounded deadline... retries use
    /// capped exponential backoff".
    retry_budget: RetryBudget,
}

/// Row-count cap for a single `upsert_batch` call, matching spec §4.7's
/// "bounded so the total placeholder count stays within backend limits".
const COMMIT_BATCH_SIZE: usize = 500;

impl GitilesFollower {
    pub fn new(
        vcs: Arc<dyn GitilesClient>,
        commits: Arc<dyn CommitTable>,
        repo_tracker: Arc<dyn RepoTracker>,
        changelists: Arc<dyn ChangelistStore>,
        expectations: Arc<dyn ExpectationStore>,
        tracked_branch: impl Into<String>,
        initial_commit: GitHash,
        repos: Vec<RepoConfig>,
        retry_budget: RetryBudget,
    ) -> Self {
        Self {
            vcs,
            commits,
            repo_tracker,
            changelists,
            expectations,
            tracked_branch: tracked_branch.into(),
            initial_commit,
            repos,
            retry_budget,
        }
    }

    /// One poll cycle: assigns commit ids to any new commits on the tracked
    /// branch (§4.7 "Commit-ID algorithm"), then runs landed-CL migration
    /// for every configured repo over whatever is new since that repo's own
    /// `last_git_hash` marker (§4.7 "Landed-CL migration"). Returns the
    /// newly assigned commits, oldest first.
    pub async fn poll(&self) -> anyhow::Result<Vec<Commit>> {
        metrics::GITILES_POLL_TOTAL.inc();
        let new_commits = self.assign_commit_ids().await?;
        for repo in &self.repos {
            self.migrate_repo(repo).await?;
        }
        Ok(new_commits)
    }

    async fn assign_commit_ids(&self) -> anyhow::Result<Vec<Commit>> {
        let latest_hash = backoff::retry_with_backoff("gitiles-latest-hash", &self.retry_budget, || {
            self.vcs.latest_hash(&self.tracked_branch)
        })
        .await?;
        let stored = self.commits.latest().await?;

        if stored.as_ref().map(|(hash, _)| hash) == Some(&latest_hash) {
            return Ok(Vec::new());
        }

        let since = stored.as_ref().map(|(hash, _)| hash.clone());
        let last_id = stored.map(|(_, id)| id).unwrap_or(CommitId::new(COMMIT_ID_ANCHOR));
        // The table being empty means there's no stored hash to log from;
        // fall back to the configured initial commit, per §4.7.
        let log_since = if since.is_some() { since.as_ref() } else { Some(&self.initial_commit) };
        let newest_first = backoff::retry_with_backoff("gitiles-log-first-parent", &self.retry_budget, || {
            self.vcs.log_first_parent(log_since, &latest_hash)
        })
        .await?;
        let mut oldest_first = newest_first;
        oldest_first.reverse();

        let mut next_id = last_id;
        let mut new_commits = Vec::with_capacity(oldest_first.len());
        for meta in oldest_first {
            next_id = next_id.next();
            new_commits.push(Commit {
                id: next_id,
                hash: meta.hash,
                timestamp: meta.timestamp,
                author: meta.author,
                subject: meta.subject,
                message: meta.message,
            });
        }

        for chunk in new_commits.chunks(COMMIT_BATCH_SIZE) {
            self.commits.upsert_batch(chunk).await?;
        }
        metrics::GITILES_COMMITS_ASSIGNED_TOTAL.inc_by(new_commits.len() as u64);
        ::metrics::log_distribution(&metrics::GITILES_COMMITS_PER_POLL, new_commits.len() as f64);
        Ok(new_commits)
    }

    /// Walks every commit strictly after `repo`'s own `last_git_hash`
    /// marker (spec §4.7's per-repo tracking table, spec §6), not merely
    /// the commits this poll happened to assign ids to: a repo configured
    /// after its commits already got ids on a prior poll must still see
    /// them as "new" for migration purposes. Commits from `CommitTable::all`
    /// come back in unspecified order, so they're sorted by commit id
    /// (spec §3's "commit_id is unique; lexicographic order equals
    /// chronological order") before slicing from the marker.
    async fn migrate_repo(&self, repo: &RepoConfig) -> anyhow::Result<()> {
        let last_hash = self.repo_tracker.last_git_hash(&repo.name).await?;
        let mut all_commits = self.commits.all().await?;
        all_commits.sort_by_key(|commit| commit.id);

        let start = match &last_hash {
            Some(hash) => all_commits.iter().position(|commit| &commit.hash == hash).map_or(0, |i| i + 1),
            None => 0,
        };

        for commit in &all_commits[start..] {
            let meta = CommitMeta {
                hash: commit.hash.clone(),
                timestamp: commit.timestamp,
                author: commit.author.clone(),
                subject: commit.subject.clone(),
                message: commit.message.clone(),
            };
            if let Some(cl_id) = repo.extractor.extract(&meta) {
                self.migrate_landed_cl(repo, cl_id, commit.timestamp).await?;
            }
            self.repo_tracker
                .set_last_git_hash(&repo.name, commit.hash.clone())
                .await?;
        }
        Ok(())
    }

    /// Collapses every delta recorded against `(crs, cl_id)` into its final
    /// per-`(grouping, digest)` state, drops no-ops, groups by user, and
    /// writes one primary-branch record per user at `landed_ts` — the
    /// collapse-then-replay described in spec §4.7 step 2.
    async fn migrate_landed_cl(
        &self,
        repo: &RepoConfig,
        cl_id: ChangelistId,
        landed_ts: Timestamp,
    ) -> anyhow::Result<()> {
        let branch = Branch::Changelist {
            crs: repo.crs,
            cl: cl_id.clone(),
        };
        let history = self.expectations.branch_history(&branch).await?;
        if history.is_empty() {
            return Ok(());
        }

        // key -> (first-seen label_before, last label_after, last user)
        let mut collapsed: BTreeMap<gold_types::ExpectationKey, (gold_types::Label, gold_types::Label, String)> =
            BTreeMap::new();
        for entry in &history {
            let key = gold_types::ExpectationKey {
                grouping: entry.delta.grouping.clone(),
                digest: entry.delta.digest.clone(),
            };
            collapsed
                .entry(key)
                .and_modify(|(_, after, user)| {
                    *after = entry.delta.label_after;
                    user.clone_from(&entry.user);
                })
                .or_insert((entry.delta.label_before, entry.delta.label_after, entry.user.clone()));
        }

        let mut by_user: BTreeMap<String, Vec<ExpectationDelta>> = BTreeMap::new();
        for (key, (before, after, user)) in collapsed {
            if before == after {
                continue;
            }
            by_user.entry(user).or_default().push(ExpectationDelta {
                grouping: key.grouping,
                digest: key.digest,
                label_before: before,
                label_after: after,
            });
        }

        if by_user.is_empty() {
            metrics::GITILES_NOOP_MIGRATIONS_TOTAL.inc();
            return Ok(());
        }

        for (user, deltas) in by_user {
            self.expectations
                .apply_deltas(Branch::Primary, &user, landed_ts, deltas)
                .await?;
        }
        metrics::GITILES_LANDED_CLS_MIGRATED_TOTAL.inc();

        if repo.set_landed {
            self.changelists.set_landed(repo.crs, &cl_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use expectation_store::{
        Change,
        InMemoryExpectationStore,
    };
    use gold_types::{
        Digest,
        Grouping,
        Label,
        Params,
    };

    use super::*;

    fn digest(hex32: &str) -> Digest {
        hex32.parse().unwrap()
    }

    fn grouping(name: &str) -> Grouping {
        let mut params = Params::new();
        params.insert("name".to_owned(), name.to_owned());
        Grouping::new(params)
    }

    struct FixedVcs {
        latest: GitHash,
        log: Vec<CommitMeta>,
    }

    #[async_trait]
    impl GitilesClient for FixedVcs {
        async fn latest_hash(&self, _branch: &str) -> anyhow::Result<GitHash> {
            Ok(self.latest.clone())
        }

        async fn log_first_parent(
            &self,
            _since: Option<&GitHash>,
            _until: &GitHash,
        ) -> anyhow::Result<Vec<CommitMeta>> {
            Ok(self.log.clone())
        }
    }

    #[derive(Default)]
    struct InMemoryCommitTable {
        rows: Mutex<Vec<Commit>>,
    }

    #[async_trait]
    impl CommitTable for InMemoryCommitTable {
        async fn latest(&self) -> anyhow::Result<Option<(GitHash, CommitId)>> {
            Ok(self.rows.lock().unwrap().last().map(|c| (c.hash.clone(), c.id)))
        }

        async fn upsert_batch(&self, commits: &[Commit]) -> anyhow::Result<()> {
            self.rows.lock().unwrap().extend_from_slice(commits);
            Ok(())
        }

        async fn all(&self) -> anyhow::Result<Vec<Commit>> {
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct InMemoryRepoTracker {
        last: Mutex<BTreeMap<String, GitHash>>,
    }

    #[async_trait]
    impl RepoTracker for InMemoryRepoTracker {
        async fn last_git_hash(&self, repo: &str) -> anyhow::Result<Option<GitHash>> {
            Ok(self.last.lock().unwrap().get(repo).cloned())
        }

        async fn set_last_git_hash(&self, repo: &str, hash: GitHash) -> anyhow::Result<()> {
            self.last.lock().unwrap().insert(repo.to_owned(), hash);
            Ok(())
        }
    }

    #[derive(Default)]
    struct InMemoryChangelistStore {
        landed: Mutex<Vec<(CrsId, ChangelistId)>>,
    }

    #[async_trait]
    impl ChangelistStore for InMemoryChangelistStore {
        async fn set_landed(&self, crs: CrsId, cl: &ChangelistId) -> anyhow::Result<()> {
            self.landed.lock().unwrap().push((crs, cl.clone()));
            Ok(())
        }
    }

    fn meta(hash: &str, ts: i64, subject: &str, message: &str) -> CommitMeta {
        CommitMeta {
            hash: GitHash::new(hash),
            timestamp: ts,
            author: "alice".to_owned(),
            subject: subject.to_owned(),
            message: message.to_owned(),
        }
    }

    #[tokio::test]
    async fn assigns_ids_from_anchor_in_ascending_order_scenario_5() {
        let vcs = Arc::new(FixedVcs {
            latest: GitHash::new("C5"),
            log: vec![
                meta("C5", 5, "s5", "m5"),
                meta("C4", 4, "s4", "m4"),
                meta("C3", 3, "s3", "m3"),
                meta("C2", 2, "s2", "m2"),
                meta("C1", 1, "s1", "m1"),
            ],
        });
        let commit_table = Arc::new(InMemoryCommitTable::default());
        let follower = GitilesFollower::new(
            vcs,
            commit_table.clone(),
            Arc::new(InMemoryRepoTracker::default()),
            Arc::new(InMemoryChangelistStore::default()),
            Arc::new(InMemoryExpectationStore::new()),
            "main",
            GitHash::new("INIT"),
            Vec::new(),
            RetryBudget::new(std::time::Duration::from_secs(60)),
        );

        let assigned = follower.poll().await.unwrap();
        assert_eq!(assigned.len(), 5);
        let ids: Vec<u64> = assigned.iter().map(|c| c.id.as_u64()).collect();
        assert_eq!(
            ids,
            vec![
                COMMIT_ID_ANCHOR + 1,
                COMMIT_ID_ANCHOR + 2,
                COMMIT_ID_ANCHOR + 3,
                COMMIT_ID_ANCHOR + 4,
                COMMIT_ID_ANCHOR + 5
            ]
        );
        let hashes: Vec<String> = assigned.iter().map(|c| c.hash.to_string()).collect();
        assert_eq!(hashes, vec!["C1", "C2", "C3", "C4", "C5"]);

        let all = commit_table.all().await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn repeated_poll_with_unchanged_latest_assigns_nothing() {
        let vcs = Arc::new(FixedVcs {
            latest: GitHash::new("C1"),
            log: vec![meta("C1", 1, "s1", "m1")],
        });
        let follower = GitilesFollower::new(
            vcs,
            Arc::new(InMemoryCommitTable::default()),
            Arc::new(InMemoryRepoTracker::default()),
            Arc::new(InMemoryChangelistStore::default()),
            Arc::new(InMemoryExpectationStore::new()),
            "main",
            GitHash::new("INIT"),
            Vec::new(),
            RetryBudget::new(std::time::Duration::from_secs(60)),
        );
        let first = follower.poll().await.unwrap();
        assert_eq!(first.len(), 1);
        let second = follower.poll().await.unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn reviewed_line_extracts_trailing_numeric_id() {
        let commit = meta(
            "h",
            1,
            "subject",
            "Do a thing.\n\nReviewed-on: https://cl.example.com/c/repo/+/1234\n",
        );
        assert_eq!(
            ClIdExtractor::ReviewedLine.extract(&commit),
            Some(ChangelistId::new("1234"))
        );
    }

    #[test]
    fn reviewed_line_returns_none_without_a_matching_line() {
        let commit = meta("h", 1, "subject", "no review marker here");
        assert_eq!(ClIdExtractor::ReviewedLine.extract(&commit), None);
    }

    #[test]
    fn from_subject_extracts_trailing_parenthesized_id() {
        let commit = meta("h", 1, "Fix the thing (#4321)", "body");
        assert_eq!(
            ClIdExtractor::FromSubject.extract(&commit),
            Some(ChangelistId::new("4321"))
        );
    }

    #[test]
    fn from_subject_returns_none_when_not_at_the_end() {
        let commit = meta("h", 1, "(#4321) leading, not trailing", "body");
        assert_eq!(ClIdExtractor::FromSubject.extract(&commit), None);
    }

    #[tokio::test]
    async fn landed_cl_migration_collapses_history_and_writes_once_per_user() {
        let expectations = Arc::new(InMemoryExpectationStore::new());
        let d = digest("0123456789abcdef0123456789abcdef");
        let g = grouping("my-test");
        let branch = Branch::Changelist {
            crs: CrsId::Github,
            cl: ChangelistId::new("4321"),
        };

        // alice triages untriaged -> positive, then bob flips it to negative.
        expectations
            .add_change(
                vec![Change {
                    grouping: g.clone(),
                    digest: d.clone(),
                    expected_before: None,
                    label: Label::Positive,
                }],
                "alice",
                branch.clone(),
                100,
            )
            .await
            .unwrap();
        expectations
            .add_change(
                vec![Change {
                    grouping: g.clone(),
                    digest: d.clone(),
                    expected_before: None,
                    label: Label::Negative,
                }],
                "bob",
                branch,
                200,
            )
            .await
            .unwrap();

        let vcs = Arc::new(FixedVcs {
            latest: GitHash::new("C1"),
            log: vec![meta("C1", 500, "Fix the thing (#4321)", "body")],
        });
        let changelists = Arc::new(InMemoryChangelistStore::default());
        let follower = GitilesFollower::new(
            vcs,
            Arc::new(InMemoryCommitTable::default()),
            Arc::new(InMemoryRepoTracker::default()),
            changelists.clone(),
            expectations.clone(),
            "main",
            GitHash::new("INIT"),
            vec![RepoConfig {
                name: "gold".to_owned(),
                crs: CrsId::Github,
                extractor: ClIdExtractor::FromSubject,
                set_landed: true,
            }],
            RetryBudget::new(std::time::Duration::from_secs(60)),
        );

        follower.poll().await.unwrap();

        let primary = expectations.get().await.unwrap();
        let key = gold_types::ExpectationKey { grouping: g, digest: d };
        // Collapsed before=untriaged (alice's first-seen before), after=negative (bob's last write).
        assert_eq!(primary[&key].label, Label::Negative);
        assert_eq!(changelists.landed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn landed_cl_with_only_noop_deltas_writes_no_record() {
        let expectations = Arc::new(InMemoryExpectationStore::new());
        let d = digest("0123456789abcdef0123456789abcdef");
        let g = grouping("my-test");
        let branch = Branch::Changelist {
            crs: CrsId::Github,
            cl: ChangelistId::new("4321"),
        };
        // Triaged then reverted, ending exactly where it started: untriaged.
        let record_id = expectations
            .add_change(
                vec![Change {
                    grouping: g.clone(),
                    digest: d.clone(),
                    expected_before: None,
                    label: Label::Positive,
                }],
                "alice",
                branch.clone(),
                100,
            )
            .await
            .unwrap();
        expectations.undo_change(record_id, "alice", 150).await.unwrap();

        let vcs = Arc::new(FixedVcs {
            latest: GitHash::new("C1"),
            log: vec![meta("C1", 500, "Fix the thing (#4321)", "body")],
        });
        let follower = GitilesFollower::new(
            vcs,
            Arc::new(InMemoryCommitTable::default()),
            Arc::new(InMemoryRepoTracker::default()),
            Arc::new(InMemoryChangelistStore::default()),
            expectations.clone(),
            "main",
            GitHash::new("INIT"),
            vec![RepoConfig {
                name: "gold".to_owned(),
                crs: CrsId::Github,
                extractor: ClIdExtractor::FromSubject,
                set_landed: false,
            }],
            RetryBudget::new(std::time::Duration::from_secs(60)),
        );
        follower.poll().await.unwrap();

        assert!(expectations.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrate_repo_catches_up_commits_assigned_before_the_repo_was_configured() {
        let expectations = Arc::new(InMemoryExpectationStore::new());
        let d = digest("fedcba9876543210fedcba9876543210");
        let g = grouping("my-test");
        let branch = Branch::Changelist {
            crs: CrsId::Github,
            cl: ChangelistId::new("555"),
        };
        expectations
            .add_change(
                vec![Change {
                    grouping: g.clone(),
                    digest: d.clone(),
                    expected_before: None,
                    label: Label::Positive,
                }],
                "alice",
                branch,
                100,
            )
            .await
            .unwrap();

        let commit_table = Arc::new(InMemoryCommitTable::default());
        let repo_tracker = Arc::new(InMemoryRepoTracker::default());

        // First poll: no repos configured yet, so C1's id is assigned but its
        // CL is not migrated.
        let bootstrap = GitilesFollower::new(
            Arc::new(FixedVcs {
                latest: GitHash::new("C1"),
                log: vec![meta("C1", 500, "Fix the thing (#555)", "body")],
            }),
            commit_table.clone(),
            repo_tracker.clone(),
            Arc::new(InMemoryChangelistStore::default()),
            expectations.clone(),
            "main",
            GitHash::new("INIT"),
            Vec::new(),
            RetryBudget::new(std::time::Duration::from_secs(60)),
        );
        bootstrap.poll().await.unwrap();
        assert!(expectations.get().await.unwrap().is_empty());

        // Second poll: the tracked branch hasn't moved (no new commits this
        // time), but the repo is configured now. `migrate_repo` must still
        // find C1 via `commits.all()` against its own (empty) `last_git_hash`
        // marker, not via this poll's empty `new_commits`.
        let follower = GitilesFollower::new(
            Arc::new(FixedVcs {
                latest: GitHash::new("C1"),
                log: vec![],
            }),
            commit_table,
            repo_tracker,
            Arc::new(InMemoryChangelistStore::default()),
            expectations.clone(),
            "main",
            GitHash::new("INIT"),
            vec![RepoConfig {
                name: "gold".to_owned(),
                crs: CrsId::Github,
                extractor: ClIdExtractor::FromSubject,
                set_landed: false,
            }],
            RetryBudget::new(std::time::Duration::from_secs(60)),
        );
        let assigned = follower.poll().await.unwrap();
        assert!(assigned.is_empty());

        let primary = expectations.get().await.unwrap();
        let key = gold_types::ExpectationKey { grouping: g, digest: d };
        assert_eq!(primary[&key].label, Label::Positive);
    }
}
