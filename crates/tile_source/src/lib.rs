//! Produces the current sliding-window `Tile`: merges recent commit
//! metadata from the VCS layer with recent trace data from the raw trace
//! store, refreshing on an interval and publishing a `tile-updated` event
//! on success (spec §4.4). `RawTraceStore`/`VcsSource` are the external
//! collaborators spec.md treats as out of scope; only their consumed shape
//! is modeled here.

mod metrics;

use std::{
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use backoff::RetryBudget;
use gold_types::{
    tile::{
        Trace,
        TraceId,
    },
    Commit,
    Timestamp,
    Tile,
};
use ignore_store::IgnoreStore;
use imbl::Vector;
use parking_lot::Mutex;
use tokio::sync::watch;

/// The raw per-commit trace data a real backend reads from its trace store.
/// Out of scope per spec §1; only the shape `tile_source` consumes is
/// modeled.
#[async_trait]
pub trait RawTraceStore: Send + Sync {
    async fn recent_traces(
        &self,
        commits: &Vector<Commit>,
    ) -> anyhow::Result<imbl::HashMap<TraceId, Trace>>;
}

/// The VCS layer (gitiles, in the real system) the tile source reads commit
/// metadata from. Returning fewer than `num_commits` signals the VCS layer
/// hasn't caught up yet with the trace store's data — the refresh treats
/// this as transient and retries at the next interval rather than
/// publishing a tile whose commit boundary is stale.
#[async_trait]
pub trait VcsSource: Send + Sync {
    async fn recent_commits(&self, num_commits: usize) -> anyhow::Result<Vector<Commit>>;
}

pub type TileUpdatedHandler = Box<dyn Fn(&Tile) + Send + Sync>;

#[async_trait]
pub trait TileSourceApi: Send + Sync {
    async fn get_tile(&self, include_ignored: bool) -> anyhow::Result<Tile>;
    fn subscribe(&self, handler: TileUpdatedHandler);
}

struct Snapshot {
    full: Tile,
    filtered: Tile,
    last_refresh_ts: Timestamp,
}

pub struct RefreshingTileSource {
    trace_store: Arc<dyn RawTraceStore>,
    vcs: Arc<dyn VcsSource>,
    ignores: Arc<dyn IgnoreStore>,
    num_commits: usize,
    current: watch::Sender<Option<Arc<Snapshot>>>,
    subscribers: Mutex<Vec<TileUpdatedHandler>>,
    /// Wraps the VCS/trace-store RPCs within one `refresh_once` so a
    /// transient backend hiccup retries inside the same cycle instead of
    /// surfacing immediately; `VcsBehind` (§4.4's "wait one refresh period")
    /// is deliberately NOT retried through this budget — it isn't a hiccup,
    /// it's an expected lag the outer `start_updater` loop already handles
    /// by waiting a full `interval`.
    retry_budget: RetryBudget,
}

impl RefreshingTileSource {
    pub fn new(
        trace_store: Arc<dyn RawTraceStore>,
        vcs: Arc<dyn VcsSource>,
        ignores: Arc<dyn IgnoreStore>,
        num_commits: usize,
        retry_budget: RetryBudget,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            trace_store,
            vcs,
            ignores,
            num_commits,
            current,
            subscribers: Mutex::new(Vec::new()),
            retry_budget,
        }
    }

    /// Blocks until the first successful refresh, then refreshes every
    /// `interval` until `cancel` fires. Matches spec §4.4's
    /// `StartUpdater(ctx, interval)` and §5's cooperative-cancellation model.
    pub async fn start_updater(self: &Arc<Self>, interval: Duration, now_fn: impl Fn() -> Timestamp + Send + Sync + 'static, mut cancel: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
        loop {
            match self.refresh_once(now_fn()).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!("initial tile fetch failed, retrying: {e:#}");
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {},
                        _ = cancel.changed() => return Ok(()),
                    }
                },
            }
        }
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = cancel.changed() => return Ok(()),
            }
            if let Err(e) = self.refresh_once(now_fn()).await {
                tracing::error!("tile refresh failed: {e:#}");
            }
        }
    }

    async fn refresh_once(&self, now: Timestamp) -> anyhow::Result<()> {
        let timer = std::time::Instant::now();
        let commits = backoff::retry_with_backoff("tile-source-recent-commits", &self.retry_budget, || {
            self.vcs.recent_commits(self.num_commits)
        })
        .await?;
        if commits.len() < self.num_commits {
            metrics::TILE_REFRESH_VCS_BEHIND_TOTAL.inc();
            anyhow::bail!(errors::ErrorMetadata::transient(
                "VcsBehind",
                "VCS layer has not caught up to the requested commit window yet",
            ));
        }
        let traces = backoff::retry_with_backoff("tile-source-recent-traces", &self.retry_budget, || {
            self.trace_store.recent_traces(&commits)
        })
        .await?;
        let full = Tile::new(commits, traces)?;

        let matcher = self.ignores.matcher(now).await?;
        let filtered = full.filter_traces(|trace| !matcher.matches(&trace.params))?;

        metrics::TILE_NUM_COMMITS.set(full.num_commits() as f64);
        metrics::TILE_NUM_TRACES.set(full.traces.len() as f64);
        ::metrics::log_distribution(&metrics::TILE_REFRESH_SECONDS, timer.elapsed().as_secs_f64());
        metrics::TILE_REFRESH_TOTAL.inc();

        let snapshot = Arc::new(Snapshot { filtered: filtered.clone(), full: full.clone(), last_refresh_ts: now });
        self.current.send_replace(Some(snapshot));
        for handler in self.subscribers.lock().iter() {
            handler(&full);
        }
        Ok(())
    }
}

#[async_trait]
impl TileSourceApi for RefreshingTileSource {
    async fn get_tile(&self, include_ignored: bool) -> anyhow::Result<Tile> {
        let snapshot = self
            .current
            .borrow()
            .clone()
            .ok_or_else(|| errors::ErrorMetadata::precondition("NoTileYet", "no tile has been fetched yet"))?;
        Ok(if include_ignored {
            snapshot.full.clone()
        } else {
            snapshot.filtered.clone()
        })
    }

    fn subscribe(&self, handler: TileUpdatedHandler) {
        self.subscribers.lock().push(handler);
    }
}

impl RefreshingTileSource {
    pub fn last_refresh_ts(&self) -> Option<Timestamp> {
        self.current.borrow().as_ref().map(|s| s.last_refresh_ts)
    }
}
