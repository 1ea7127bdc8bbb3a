//! Maintains an atomically-swappable [`Index`] built from the current tile,
//! ignore rules, and expectations, and recomputes it on three trigger kinds:
//! a periodic timer, a tile refresh, and an expectation change. Tallies and
//! the paramset are the tile-and-ignores-only layers and are the most
//! expensive to recompute; an expectation-only trigger reuses them by
//! reference and only redoes summaries, blame, and the warmer.
//!
//! Concurrency model: at most one pipeline run is in flight. Triggers that
//! arrive while a run is in progress coalesce into a single pending run that
//! starts as soon as the current one finishes, rather than queuing one run
//! per trigger.

mod blamer;
mod metrics;
mod summaries;
mod tallies;
pub mod warmer;

use std::sync::Arc;

use expectation_store::ExpectationStore;
use gold_types::{
    expectation::Expectations,
    Digest,
    Grouping,
    ParamSet,
    Tile,
    Timestamp,
};
use ignore_store::IgnoreStore;
use tile_source::TileSourceApi;
use tokio::sync::{
    mpsc,
    watch,
};

pub use blamer::{
    BlameDistribution,
    Blamer,
};
pub use summaries::{
    Summaries,
    TestSummary,
};
pub use tallies::{
    DigestCounts,
    Tallies,
};
pub use warmer::{
    DiffCache,
    DiffWork,
    DiffWorkPublisher,
};

/// The published, fully-computed view every read query serves from. Built
/// bottom-up by exactly one pipeline run and swapped in as a single value —
/// a reader who dereferences once never observes a partially constructed
/// index (spec §4.5's "Index snapshot consistency").
#[derive(Clone)]
pub struct Index {
    /// The ignore-filtered tile every other layer is computed from.
    pub tile: Tile,
    /// The unfiltered tile, kept alongside `tile` so Search can serve
    /// `include_ignored=true` without re-fetching from the tile source.
    pub raw_tile: Tile,
    pub paramset: ParamSet,
    pub tallies: Arc<Tallies>,
    pub expectations: Arc<Expectations>,
    pub summaries: Arc<Summaries>,
    pub blamer: Arc<Blamer>,
    pub grouping_keys: Arc<Vec<String>>,
}

/// What triggered a pipeline run, and therefore how much of the pipeline it
/// needs to redo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    TileRefreshed,
    ExpectationsChanged,
}

/// The layers one run recomputes. `Full` redoes everything; `ExpectationsOnly`
/// reuses the previous run's tallies and paramset by reference, since those
/// depend only on the tile and ignore rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Full,
    ExpectationsOnly,
}

impl Scope {
    fn for_trigger(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Timer | Trigger::TileRefreshed => Scope::Full,
            Trigger::ExpectationsChanged => Scope::ExpectationsOnly,
        }
    }

    /// Merging two pending triggers' scopes: `Full` wins, since it's a
    /// superset of the work `ExpectationsOnly` would do.
    fn merge(self, other: Scope) -> Self {
        match (self, other) {
            (Scope::Full, _) | (_, Scope::Full) => Scope::Full,
            (Scope::ExpectationsOnly, Scope::ExpectationsOnly) => Scope::ExpectationsOnly,
        }
    }
}

pub struct IndexerCore {
    tile_source: Arc<dyn TileSourceApi>,
    ignores: Arc<dyn IgnoreStore>,
    expectations: Arc<dyn ExpectationStore>,
    diff_cache: Arc<dyn DiffCache>,
    diff_publisher: Arc<dyn DiffWorkPublisher>,
    grouping_keys: Arc<Vec<String>>,
    current: watch::Sender<Option<Arc<Index>>>,
}

impl IndexerCore {
    pub fn new(
        tile_source: Arc<dyn TileSourceApi>,
        ignores: Arc<dyn IgnoreStore>,
        expectations: Arc<dyn ExpectationStore>,
        diff_cache: Arc<dyn DiffCache>,
        diff_publisher: Arc<dyn DiffWorkPublisher>,
        grouping_keys: Vec<String>,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            tile_source,
            ignores,
            expectations,
            diff_cache,
            diff_publisher,
            grouping_keys: Arc::new(grouping_keys),
            current,
        }
    }

    /// The current index, if at least one pipeline run has ever succeeded.
    /// Never blocks on a recomputation in progress (spec §4.6).
    pub fn current(&self) -> Option<Arc<Index>> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Index>>> {
        self.current.subscribe()
    }

    /// Runs one pipeline pass. On success the new index is published and
    /// `true` is returned; on failure the previous index (if any) is left in
    /// place, the error is logged and metered, and `false` is returned so
    /// the caller can schedule a retry at the next trigger.
    pub async fn run_pipeline(&self, scope_trigger: Trigger, now: Timestamp) -> bool {
        let timer = std::time::Instant::now();
        metrics::INDEXER_PIPELINE_RUNS_TOTAL.inc();
        let scope = Scope::for_trigger(scope_trigger);
        match scope {
            Scope::Full => metrics::INDEXER_FULL_RUNS_TOTAL.inc(),
            Scope::ExpectationsOnly => metrics::INDEXER_PARTIAL_RUNS_TOTAL.inc(),
        }

        let result = self.run_pipeline_inner(scope, now).await;
        ::metrics::log_distribution(&metrics::INDEXER_PIPELINE_RUN_SECONDS, timer.elapsed().as_secs_f64());
        match result {
            Ok(index) => {
                self.current.send_replace(Some(Arc::new(index)));
                metrics::INDEXER_PIPELINE_SUCCESSES_TOTAL.inc();
                true
            },
            Err(e) => {
                tracing::error!("indexer pipeline run failed, retaining previous index: {e:#}");
                metrics::INDEXER_PIPELINE_FAILURES_TOTAL.inc();
                false
            },
        }
    }

    /// Builds the ignore-filtered tile from scratch: fetches the raw tile
    /// (spec §4.5's first layer input) and applies the current matcher
    /// itself, rather than relying on the tile source's own default
    /// filtering, since ignore rules are the indexer's own dependency.
    /// Returns `(raw, filtered)`.
    async fn filtered_tile(&self, now: Timestamp) -> anyhow::Result<(Tile, Tile)> {
        let raw = self.tile_source.get_tile(true).await?;
        let matcher = self.ignores.matcher(now).await?;
        let filtered = raw.filter_traces(|trace| !matcher.matches(&trace.params))?;
        Ok((raw, filtered))
    }

    async fn run_pipeline_inner(&self, scope: Scope, now: Timestamp) -> anyhow::Result<Index> {
        let expectations = Arc::new(self.expectations.get().await?);

        let (tile, raw_tile, paramset, tallies) = match (scope, self.current()) {
            (Scope::ExpectationsOnly, Some(previous)) => (
                previous.tile.clone(),
                previous.raw_tile.clone(),
                previous.paramset.clone(),
                previous.tallies.clone(),
            ),
            _ => {
                let (raw_tile, tile) = self.filtered_tile(now).await?;
                let paramset = tile.paramset.clone();
                let tallies = Arc::new(tallies::compute_tallies(&tile, &self.grouping_keys));
                (tile, raw_tile, paramset, tallies)
            },
        };

        let summaries = Arc::new(summaries::compute_summaries(&tallies, &expectations));
        let blamer = Arc::new(blamer::compute_blamer(&tile, &self.grouping_keys, &expectations));

        // Spec §4.1: "`last_used` is refreshed whenever a digest is observed
        // in the current tile for that grouping; the retention sweep reads
        // that signal from the current Index." `by_test` already holds,
        // per grouping, every digest at least one trace is currently
        // showing — exactly the observation set retention cares about.
        // Best-effort like the warmer: a failure here shouldn't block
        // publishing an otherwise-good index.
        let observed: Vec<(Grouping, Digest)> = tallies
            .by_test
            .iter()
            .flat_map(|(grouping, counts)| counts.0.keys().map(move |digest| (grouping.clone(), digest.clone())))
            .collect();
        if let Err(e) = self.expectations.refresh_last_used(observed, now).await {
            tracing::warn!("failed to refresh expectation last_used signal: {e:#}");
        }

        warmer::run_warmer(&summaries, self.diff_cache.as_ref(), self.diff_publisher.as_ref()).await;

        Ok(Index {
            tile,
            raw_tile,
            paramset,
            tallies,
            expectations,
            summaries,
            blamer,
            grouping_keys: self.grouping_keys.clone(),
        })
    }

    /// The background task: drains `triggers` one at a time, running the
    /// pipeline for each, and coalescing any triggers that queued up while a
    /// run was in progress into a single extra run rather than one run per
    /// trigger. Exits when the channel is closed (shutdown).
    pub async fn run_loop(
        self: Arc<Self>,
        mut triggers: mpsc::UnboundedReceiver<Trigger>,
        now_fn: impl Fn() -> Timestamp + Send + Sync + 'static,
    ) {
        while let Some(first) = triggers.recv().await {
            let mut scope = Scope::for_trigger(first);
            self.run_pipeline(trigger_for_scope(scope), now_fn()).await;

            // Coalesce anything that arrived during the run above into a
            // single pending run, rather than replaying them individually.
            let mut pending = false;
            while let Ok(next) = triggers.try_recv() {
                scope = scope.merge(Scope::for_trigger(next));
                pending = true;
            }
            if pending {
                self.run_pipeline(trigger_for_scope(scope), now_fn()).await;
            }
        }
    }
}

/// `run_pipeline` takes a `Trigger` rather than a `Scope` so its public
/// signature stays in terms of the event that caused it; this maps a merged
/// `Scope` back to a representative trigger for that call.
fn trigger_for_scope(scope: Scope) -> Trigger {
    match scope {
        Scope::Full => Trigger::TileRefreshed,
        Scope::ExpectationsOnly => Trigger::ExpectationsChanged,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    use async_trait::async_trait;
    use gold_types::{
        commit::{
            CommitId,
            GitHash,
        },
        expectation::{
            Branch,
            ExpectationKey,
            Label,
        },
        tile::{
            Trace,
            TraceId,
        },
        Commit,
        Digest,
        Grouping,
        Params,
    };
    use imbl::{
        HashMap,
        Vector,
    };
    use ignore_store::InMemoryIgnoreStore;
    use tile_source::TileUpdatedHandler;

    use super::*;

    struct FixedTileSource {
        tile: Tile,
    }

    #[async_trait]
    impl TileSourceApi for FixedTileSource {
        async fn get_tile(&self, _include_ignored: bool) -> anyhow::Result<Tile> {
            Ok(self.tile.clone())
        }

        fn subscribe(&self, _handler: TileUpdatedHandler) {}
    }

    struct NeverCached;

    #[async_trait]
    impl DiffCache for NeverCached {
        async fn is_cached(&self, _grouping: &Grouping, _digest: &Digest) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[derive(Default)]
    struct CountingPublisher {
        count: AtomicUsize,
    }

    #[async_trait]
    impl DiffWorkPublisher for CountingPublisher {
        async fn publish(&self, _work: warmer::DiffWork) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn params(name: &str) -> Params {
        let mut p = Params::new();
        p.insert("name".to_owned(), name.to_owned());
        p
    }

    fn digest(hex32: &str) -> Digest {
        hex32.parse().unwrap()
    }

    fn one_commit_tile(digest_val: Digest) -> Tile {
        let mut traces = HashMap::new();
        traces.insert(
            TraceId::from_params(&params("foo")),
            Trace::new(params("foo"), Vector::from(vec![Some(digest_val)])),
        );
        let commits = Vector::from(vec![Commit {
            id: CommitId::new(1_000_000_000),
            hash: GitHash::new("c0"),
            timestamp: 0,
            author: "alice".to_owned(),
            subject: "s".to_owned(),
            message: "m".to_owned(),
        }]);
        Tile::new(commits, traces).unwrap()
    }

    fn make_indexer(tile: Tile, expectations: Arc<dyn ExpectationStore>) -> Arc<IndexerCore> {
        Arc::new(IndexerCore::new(
            Arc::new(FixedTileSource { tile }),
            Arc::new(InMemoryIgnoreStore::new()),
            expectations,
            Arc::new(NeverCached),
            Arc::new(CountingPublisher::default()),
            vec!["name".to_owned()],
        ))
    }

    #[tokio::test]
    async fn full_run_publishes_an_index_with_one_untriaged_digest() {
        let d = digest("11111111111111111111111111111111");
        let tile = one_commit_tile(d.clone());
        let expectations = Arc::new(expectation_store::InMemoryExpectationStore::new());
        let indexer = make_indexer(tile, expectations);

        assert!(indexer.current().is_none());
        let ok = indexer.run_pipeline(Trigger::Timer, 0).await;
        assert!(ok);

        let index = indexer.current().unwrap();
        let grouping = Grouping::from_params(&params("foo"), &["name"]);
        assert_eq!(index.summaries[&grouping].unt, 1);
    }

    #[tokio::test]
    async fn expectations_only_run_reuses_tallies_by_reference() {
        let d = digest("22222222222222222222222222222222");
        let tile = one_commit_tile(d.clone());
        let expectations = Arc::new(expectation_store::InMemoryExpectationStore::new());
        let indexer = make_indexer(tile, expectations.clone());

        indexer.run_pipeline(Trigger::Timer, 0).await;
        let first = indexer.current().unwrap();

        let grouping = Grouping::from_params(&params("foo"), &["name"]);
        expectations
            .add_change(
                vec![expectation_store::Change {
                    grouping,
                    digest: d,
                    expected_before: Some(Label::Untriaged),
                    label: Label::Positive,
                }],
                "someone",
                Branch::Primary,
                1,
            )
            .await
            .unwrap();

        indexer.run_pipeline(Trigger::ExpectationsChanged, 1).await;
        let second = indexer.current().unwrap();

        assert!(Arc::ptr_eq(&first.tallies, &second.tallies));
        let grouping = Grouping::from_params(&params("foo"), &["name"]);
        assert_eq!(second.summaries[&grouping].pos, 1);
    }

    #[tokio::test]
    async fn run_loop_coalesces_triggers_queued_during_a_run() {
        let d = digest("33333333333333333333333333333333");
        let tile = one_commit_tile(d);
        let expectations = Arc::new(expectation_store::InMemoryExpectationStore::new());
        let indexer = make_indexer(tile, expectations);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Trigger::Timer).unwrap();
        tx.send(Trigger::ExpectationsChanged).unwrap();
        tx.send(Trigger::ExpectationsChanged).unwrap();
        drop(tx);

        indexer.run_loop(rx, || 0).await;
        assert!(indexer.current().is_some());
    }

    #[tokio::test]
    async fn run_pipeline_refreshes_last_used_for_digests_currently_shown() {
        let d = digest("44444444444444444444444444444444");
        let tile = one_commit_tile(d.clone());
        let expectations = Arc::new(expectation_store::InMemoryExpectationStore::new());
        let grouping = Grouping::from_params(&params("foo"), &["name"]);
        expectations
            .add_change(
                vec![expectation_store::Change {
                    grouping: grouping.clone(),
                    digest: d.clone(),
                    expected_before: None,
                    label: Label::Positive,
                }],
                "someone",
                Branch::Primary,
                0,
            )
            .await
            .unwrap();

        let indexer = make_indexer(tile, expectations.clone());
        assert!(indexer.run_pipeline(Trigger::Timer, 500).await);

        let after = expectations.get().await.unwrap();
        let key = ExpectationKey { grouping, digest: d };
        assert_eq!(after[&key].last_used, 500);
    }
}
