//! The sixth, best-effort layer: enqueue diff work for untriaged digests
//! whose metrics against a reference aren't cached yet. Never aborts a
//! pipeline run — a warmer failure is logged and metered, the index
//! publishes regardless (spec §4.5's failure semantics).

use async_trait::async_trait;
use gold_types::{
    Digest,
    Grouping,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    metrics,
    summaries::Summaries,
};

/// One unit of requested diff work, matching the pub/sub message shape the
/// diff service out-of-scope consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffWork {
    pub version: u32,
    pub grouping: Grouping,
    pub additional_left: Vec<Digest>,
    pub additional_right: Vec<Digest>,
}

pub const DIFF_WORK_VERSION: u32 = 1;

/// Out-of-scope collaborators: the diff metric cache and the pub/sub
/// publisher the warmer drives. Only the shape the indexer consumes is
/// modeled here.
#[async_trait]
pub trait DiffCache: Send + Sync {
    /// Whether a diff metric between `digest` and some reference digest for
    /// `grouping` is already cached.
    async fn is_cached(&self, grouping: &Grouping, digest: &Digest) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait DiffWorkPublisher: Send + Sync {
    async fn publish(&self, work: DiffWork) -> anyhow::Result<()>;
}

/// Enqueues one `DiffWork` message per grouping that has untriaged digests
/// not yet cached. Each grouping's failure is independent: one publish
/// error doesn't stop the rest from being attempted.
pub async fn run_warmer(summaries: &Summaries, cache: &dyn DiffCache, publisher: &dyn DiffWorkPublisher) -> usize {
    let mut enqueued = 0usize;
    for (grouping, summary) in summaries {
        if summary.unt_hashes.is_empty() {
            continue;
        }
        let mut uncached = Vec::new();
        for digest in &summary.unt_hashes {
            match cache.is_cached(grouping, digest).await {
                Ok(true) => {},
                Ok(false) => uncached.push(digest.clone()),
                Err(e) => {
                    tracing::warn!("diff cache lookup failed for {grouping:?}: {e:#}");
                    metrics::INDEXER_WARMER_FAILURES_TOTAL.inc();
                },
            }
        }
        if uncached.is_empty() {
            continue;
        }
        let work = DiffWork {
            version: DIFF_WORK_VERSION,
            grouping: grouping.clone(),
            additional_left: uncached,
            additional_right: Vec::new(),
        };
        match publisher.publish(work).await {
            Ok(()) => enqueued += 1,
            Err(e) => {
                tracing::warn!("diff work publish failed for {grouping:?}: {e:#}");
                metrics::INDEXER_WARMER_FAILURES_TOTAL.inc();
            },
        }
    }
    ::metrics::log_distribution(&metrics::INDEXER_WARMER_QUEUE_SIZE, enqueued as f64);
    enqueued
}
