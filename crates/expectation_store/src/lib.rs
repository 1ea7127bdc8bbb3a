//! The triage ledger: the authoritative `(grouping, digest) -> Label` table,
//! its append-only change history, and the retention sweep that ages
//! entries out. See the `ExpectationStore` trait for the read/write
//! contract; `InMemoryExpectationStore` is the only implementation (the
//! on-disk backend this would talk to over the network is out of scope).

mod metrics;

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use gold_types::{
    Branch,
    ChangelistId,
    CrsId,
    Digest,
    ExpectationDelta,
    ExpectationEntry,
    ExpectationKey,
    ExpectationRecord,
    Expectations,
    Grouping,
    Label,
    Page,
    Paginated,
    RecordId,
    Timestamp,
};
use parking_lot::Mutex;

/// A single requested mutation. `expected_before`, when set, makes the write
/// optimistic: if the store's current label for `(grouping, digest)` doesn't
/// match, the whole `AddChange` call is rejected with `ErrorCode::Conflict`
/// and none of the batch's changes are applied. When `None`, the write is
/// unconditional (the ordinary triage-UI path, which always reads-then-writes
/// against whatever is current).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub grouping: Grouping,
    pub digest: Digest,
    pub expected_before: Option<Label>,
    pub label: Label,
}

pub type ChangeHandler = Box<dyn Fn(&ExpectationRecord) + Send + Sync>;

/// One entry of `QueryLog`'s history. `deltas` is empty unless the caller
/// asked for `details`; `num_changes` always reflects the true count so
/// callers can tell a truncated-for-brevity record from an actual no-op one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub id: RecordId,
    pub user: String,
    pub ts: Timestamp,
    pub branch: Branch,
    pub num_changes: usize,
    pub deltas: Vec<ExpectationDelta>,
}

/// `{positive_max_age, negative_max_age}` from spec §4.1; `None` means that
/// label never expires.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetentionPolicy {
    pub positive_max_age: Option<Duration>,
    pub negative_max_age: Option<Duration>,
}

const RETENTION_SWEEP_USER: &str = "retention-sweep";
/// Deltas are applied to the label table in ordered batches of this size so
/// a partial failure against a real backend is safely retryable: the record
/// is durable before any label is upserted, and the label upsert is the
/// last step, so a crash mid-batch leaves no label pointing at a
/// nonexistent delta.
const WRITE_BATCH_SIZE: usize = 500;

#[async_trait]
pub trait ExpectationStore: Send + Sync {
    async fn get(&self) -> anyhow::Result<Expectations>;

    async fn get_for_cl(&self, crs: CrsId, cl: ChangelistId) -> anyhow::Result<Expectations>;

    async fn add_change(
        &self,
        changes: Vec<Change>,
        user: &str,
        branch: Branch,
        now: Timestamp,
    ) -> anyhow::Result<RecordId>;

    async fn query_log(
        &self,
        offset: usize,
        size: usize,
        details: bool,
    ) -> anyhow::Result<Paginated<LogEntry>>;

    async fn undo_change(
        &self,
        record_id: RecordId,
        user: &str,
        now: Timestamp,
    ) -> anyhow::Result<ExpectationRecord>;

    fn subscribe(&self, handler: ChangeHandler);

    /// Refreshes `last_used` for every `(grouping, digest)` the indexer
    /// observed in the current tile, so the retention sweep doesn't age out
    /// entries still being exercised (spec §4.1).
    async fn refresh_last_used(&self, seen: Vec<(Grouping, Digest)>, now: Timestamp) -> anyhow::Result<()>;

    /// Every delta ever committed against `branch`, in commit order, each
    /// tagged with the user and timestamp of the record it came from. Used
    /// by the Gitiles Follower to collapse a landed CL's history into its
    /// final per-`(grouping, digest)` state (spec §4.7).
    async fn branch_history(&self, branch: &Branch) -> anyhow::Result<Vec<BranchHistoryEntry>>;

    /// Writes a record from deltas the caller has already computed,
    /// bypassing `add_change`'s `expected_before` conflict check. Used by
    /// the retention sweep and the Gitiles Follower's landed-CL migration,
    /// both of which derive deltas from data the store doesn't need to
    /// re-validate against the current label.
    async fn apply_deltas(
        &self,
        branch: Branch,
        user: &str,
        now: Timestamp,
        deltas: Vec<ExpectationDelta>,
    ) -> anyhow::Result<RecordId>;
}

/// One delta from `branch_history`, carrying the record it was committed
/// under so the landed-CL migrator can group by user and order by time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchHistoryEntry {
    pub ts: Timestamp,
    pub user: String,
    pub delta: ExpectationDelta,
}

#[derive(Default)]
struct State {
    next_record_id: u64,
    records: Vec<ExpectationRecord>,
    primary: BTreeMap<ExpectationKey, ExpectationEntry>,
    cl_overlays: BTreeMap<(CrsId, ChangelistId), BTreeMap<ExpectationKey, ExpectationEntry>>,
}

impl State {
    fn label_table(&self, branch: &Branch) -> Option<&BTreeMap<ExpectationKey, ExpectationEntry>> {
        match branch {
            Branch::Primary => Some(&self.primary),
            Branch::Changelist { crs, cl } => self.cl_overlays.get(&(*crs, cl.clone())),
        }
    }

    fn current_label(&self, branch: &Branch, key: &ExpectationKey) -> Label {
        self.label_table(branch)
            .and_then(|table| table.get(key))
            .map_or(Label::Untriaged, |entry| entry.label)
    }
}

pub struct InMemoryExpectationStore {
    state: Mutex<State>,
    subscribers: Mutex<Vec<ChangeHandler>>,
}

impl InMemoryExpectationStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Appends one `ExpectationRecord` carrying `deltas`, applies the deltas
    /// to the appropriate label table in ordered batches, and notifies
    /// subscribers. The single commit path every write (ordinary triage,
    /// undo, retention sweep, gitiles migration) goes through.
    fn commit(&self, branch: Branch, user: &str, now: Timestamp, deltas: Vec<ExpectationDelta>) -> RecordId {
        let record = {
            let mut state = self.state.lock();
            let id = RecordId::new(state.next_record_id);
            state.next_record_id += 1;
            let record = ExpectationRecord {
                id,
                user: user.to_owned(),
                ts: now,
                branch: branch.clone(),
                deltas: deltas.clone(),
            };
            state.records.push(record.clone());

            for chunk in deltas.chunks(WRITE_BATCH_SIZE) {
                let table = match &branch {
                    Branch::Primary => &mut state.primary,
                    Branch::Changelist { crs, cl } => {
                        state.cl_overlays.entry((*crs, cl.clone())).or_default()
                    },
                };
                for delta in chunk {
                    let key = ExpectationKey {
                        grouping: delta.grouping.clone(),
                        digest: delta.digest.clone(),
                    };
                    if delta.label_after == Label::Untriaged {
                        table.remove(&key);
                    } else {
                        table.insert(
                            key,
                            ExpectationEntry {
                                label: delta.label_after,
                                last_used: now,
                            },
                        );
                    }
                }
            }
            record
        };

        ::metrics::log_distribution(&metrics::TRIAGE_WRITE_BATCH_SIZE, record.deltas.len() as f64);
        for handler in self.subscribers.lock().iter() {
            handler(&record);
        }
        record.id
    }

    /// Refreshes `last_used` for every `(grouping, digest)` observed in the
    /// current tile, so the retention sweep doesn't age out entries that
    /// are still being exercised. Called by the indexer after building
    /// tallies, per spec §4.1: "`last_used` is refreshed whenever a digest
    /// is observed in the current tile... the retention sweep reads that
    /// signal from the current Index."
    pub fn touch_last_used(&self, seen: impl IntoIterator<Item = (Grouping, Digest)>, now: Timestamp) {
        let mut state = self.state.lock();
        for (grouping, digest) in seen {
            let key = ExpectationKey { grouping, digest };
            if let Some(entry) = state.primary.get_mut(&key) {
                entry.last_used = now;
            }
        }
    }

    /// Removes primary-branch entries older than their label's max age,
    /// writing a single "retention" record covering every removal. Returns
    /// `None` if nothing was old enough to remove.
    pub async fn run_retention_sweep(
        &self,
        policy: RetentionPolicy,
        now: Timestamp,
    ) -> anyhow::Result<Option<RecordId>> {
        let deltas: Vec<ExpectationDelta> = {
            let state = self.state.lock();
            state
                .primary
                .iter()
                .filter_map(|(key, entry)| {
                    let max_age = match entry.label {
                        Label::Positive => policy.positive_max_age,
                        Label::Negative => policy.negative_max_age,
                        Label::Untriaged => None,
                    }?;
                    let age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
                    if age_ms > 0 && now.saturating_sub(entry.last_used) >= age_ms {
                        Some(ExpectationDelta {
                            grouping: key.grouping.clone(),
                            digest: key.digest.clone(),
                            label_before: entry.label,
                            label_after: Label::Untriaged,
                        })
                    } else {
                        None
                    }
                })
                .collect()
        };
        if deltas.is_empty() {
            return Ok(None);
        }
        metrics::RETENTION_SWEEP_REMOVALS_TOTAL.inc_by(deltas.len() as u64);
        let id = self.commit(Branch::Primary, RETENTION_SWEEP_USER, now, deltas);
        Ok(Some(id))
    }
}

impl Default for InMemoryExpectationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpectationStore for InMemoryExpectationStore {
    async fn get(&self) -> anyhow::Result<Expectations> {
        Ok(self.state.lock().primary.clone())
    }

    async fn get_for_cl(&self, crs: CrsId, cl: ChangelistId) -> anyhow::Result<Expectations> {
        let state = self.state.lock();
        let mut merged = state.primary.clone();
        if let Some(overlay) = state.cl_overlays.get(&(crs, cl)) {
            for (key, entry) in overlay {
                merged.insert(key.clone(), entry.clone());
            }
        }
        Ok(merged)
    }

    async fn add_change(
        &self,
        changes: Vec<Change>,
        user: &str,
        branch: Branch,
        now: Timestamp,
    ) -> anyhow::Result<RecordId> {
        let deltas = {
            let state = self.state.lock();
            let mut deltas = Vec::with_capacity(changes.len());
            for change in &changes {
                let key = ExpectationKey {
                    grouping: change.grouping.clone(),
                    digest: change.digest.clone(),
                };
                let observed = state.current_label(&branch, &key);
                if let Some(expected) = change.expected_before {
                    if expected != observed {
                        metrics::TRIAGE_CONFLICTS_TOTAL.inc();
                        anyhow::bail!(errors::ErrorMetadata::conflict(
                            "TriageConflict",
                            format!(
                                "expected {expected} for this digest but the server has {observed}"
                            ),
                        ));
                    }
                }
                deltas.push(ExpectationDelta {
                    grouping: change.grouping.clone(),
                    digest: change.digest.clone(),
                    label_before: observed,
                    label_after: change.label,
                });
            }
            deltas
        };
        metrics::TRIAGE_WRITES_TOTAL.inc();
        Ok(self.commit(branch, user, now, deltas))
    }

    async fn query_log(
        &self,
        offset: usize,
        size: usize,
        details: bool,
    ) -> anyhow::Result<Paginated<LogEntry>> {
        let state = self.state.lock();
        let total = state.records.len();
        let page: Vec<LogEntry> = state
            .records
            .iter()
            .rev()
            .skip(offset)
            .take(size)
            .map(|record| LogEntry {
                id: record.id,
                user: record.user.clone(),
                ts: record.ts,
                branch: record.branch.clone(),
                num_changes: record.num_changes(),
                deltas: if details {
                    record.deltas.clone()
                } else {
                    Vec::new()
                },
            })
            .collect();
        let size = page.len();
        Ok(Paginated {
            data: page,
            pagination: Page { offset, size, total },
        })
    }

    async fn undo_change(
        &self,
        record_id: RecordId,
        user: &str,
        now: Timestamp,
    ) -> anyhow::Result<ExpectationRecord> {
        let (branch, inverted) = {
            let state = self.state.lock();
            let original = state
                .records
                .iter()
                .find(|r| r.id == record_id)
                .ok_or_else(|| {
                    errors::ErrorMetadata::not_found(
                        "NoSuchRecord",
                        format!("no expectation record with id {record_id}"),
                    )
                })?;
            (
                original.branch.clone(),
                original.deltas.iter().map(ExpectationDelta::inverted).collect::<Vec<_>>(),
            )
        };
        metrics::TRIAGE_UNDOS_TOTAL.inc();
        let id = self.commit(branch.clone(), user, now, inverted.clone());
        Ok(ExpectationRecord {
            id,
            user: user.to_owned(),
            ts: now,
            branch,
            deltas: inverted,
        })
    }

    fn subscribe(&self, handler: ChangeHandler) {
        self.subscribers.lock().push(handler);
    }

    async fn branch_history(&self, branch: &Branch) -> anyhow::Result<Vec<BranchHistoryEntry>> {
        let state = self.state.lock();
        let mut entries: Vec<BranchHistoryEntry> = state
            .records
            .iter()
            .filter(|record| &record.branch == branch)
            .flat_map(|record| {
                record.deltas.iter().map(move |delta| BranchHistoryEntry {
                    ts: record.ts,
                    user: record.user.clone(),
                    delta: delta.clone(),
                })
            })
            .collect();
        entries.sort_by_key(|entry| entry.ts);
        Ok(entries)
    }

    async fn apply_deltas(
        &self,
        branch: Branch,
        user: &str,
        now: Timestamp,
        deltas: Vec<ExpectationDelta>,
    ) -> anyhow::Result<RecordId> {
        Ok(self.commit(branch, user, now, deltas))
    }

    async fn refresh_last_used(&self, seen: Vec<(Grouping, Digest)>, now: Timestamp) -> anyhow::Result<()> {
        self.touch_last_used(seen, now);
        Ok(())
    }
}

/// Convenience constructor for sharing one store across the indexer,
/// gitiles follower, and (eventually) the façade without cloning its state.
pub fn new_shared() -> Arc<InMemoryExpectationStore> {
    Arc::new(InMemoryExpectationStore::new())
}
