//! Boots the indexing/triage core as a single long-running process: the
//! tile source's refresher, the indexer pipeline's trigger loop, the gitiles
//! follower's poller, the expectation store's retention sweep, and the
//! ignore store's expiry gauge all run as tasks on one Tokio runtime, wired
//! together the way
//! `examples/get-convex-convex-backend/crates/local_backend/src/main.rs`
//! wires its own server loop, minus the HTTP façade, which is out of scope.

mod config;
mod local;
mod metrics;

use std::{
    sync::Arc,
    time::{
        Duration,
        SystemTime,
        UNIX_EPOCH,
    },
};

use clap::Parser;
use config::GoldConfig;
use expectation_store::ExpectationStore;
use gitiles_follower::{
    ClIdExtractor,
    GitilesFollower,
    RepoConfig,
};
use gold_types::{
    CrsId,
    Timestamp,
};
use ignore_store::InMemoryIgnoreStore;
use indexer_core::{
    IndexerCore,
    Trigger,
};
use tile_source::{
    RefreshingTileSource,
    TileSourceApi,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinSet,
};

fn now_ms() -> Timestamp {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as Timestamp).unwrap_or(0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = cmd_util::env::config_service();
    let config = GoldConfig::parse();
    tracing::info!(?config, "starting gold_backend");

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let commits = Arc::new(local::InMemoryCommitTable::new());
    let (initial_hash, _) = local::anchor_commit();
    let gitiles_client = Arc::new(local::NullGitilesClient::new(initial_hash.clone()));
    let repo_tracker = Arc::new(local::InMemoryRepoTracker::new());
    let changelists = Arc::new(local::NullChangelistStore);

    let expectations = expectation_store::new_shared();
    let ignores = Arc::new(InMemoryIgnoreStore::new());

    let tile_source = Arc::new(RefreshingTileSource::new(
        Arc::new(local::EmptyTraceStore),
        commits.clone(),
        ignores.clone(),
        config.tile_size,
        config.retry_budget(),
    ));

    let diff_cache = Arc::new(local::NullDiffCache);
    let diff_publisher = Arc::new(local::NullDiffWorkPublisher);

    let indexer = Arc::new(IndexerCore::new(
        tile_source.clone(),
        ignores.clone(),
        expectations.clone(),
        diff_cache,
        diff_publisher,
        config.grouping_keys.clone(),
    ));

    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel::<Trigger>();

    {
        let trigger_tx = trigger_tx.clone();
        tile_source.subscribe(Box::new(move |_tile| {
            let _ = trigger_tx.send(Trigger::TileRefreshed);
        }));
    }
    {
        let trigger_tx = trigger_tx.clone();
        expectations.subscribe(Box::new(move |_record| {
            let _ = trigger_tx.send(Trigger::ExpectationsChanged);
        }));
    }

    let follower = Arc::new(GitilesFollower::new(
        gitiles_client,
        commits.clone(),
        repo_tracker,
        changelists,
        expectations.clone(),
        config.gitiles_branch.clone(),
        initial_hash,
        vec![RepoConfig {
            name: config.gitiles_branch.clone(),
            crs: CrsId::Gerrit,
            extractor: ClIdExtractor::ReviewedLine,
            set_landed: true,
        }],
        config.retry_budget(),
    ));

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let tile_source = tile_source.clone();
        let interval = config.tile_refresh_interval();
        let cancel_rx = cancel_rx.clone();
        async move {
            if let Err(e) = tile_source.start_updater(interval, now_ms, cancel_rx).await {
                tracing::error!("tile source updater exited: {e:#}");
            }
        }
    });

    // Runs until `trigger_rx`'s senders all drop. The tile source and
    // expectation store subscriptions above each hold one for the process's
    // lifetime, so this task (unlike the others here) shuts down with the
    // process rather than observing `cancel_tx` itself.
    tasks.spawn(indexer.clone().run_loop(trigger_rx, now_ms));

    tasks.spawn({
        let interval = config.indexer_timer_interval();
        let mut cancel_rx = cancel_rx.clone();
        let trigger_tx = trigger_tx.clone();
        async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = cancel_rx.changed() => return,
                }
                let _ = trigger_tx.send(Trigger::Timer);
            }
        }
    });

    tasks.spawn({
        let expectations = expectations.clone();
        let policy = config.retention_policy();
        let interval = config.retention_sweep_interval();
        let mut cancel_rx = cancel_rx.clone();
        async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = cancel_rx.changed() => return,
                }
                match expectations.run_retention_sweep(policy, now_ms()).await {
                    Ok(Some(record_id)) => tracing::info!(?record_id, "retention sweep removed stale expectations"),
                    Ok(None) => {},
                    Err(e) => tracing::error!("retention sweep failed: {e:#}"),
                }
            }
        }
    });

    tasks.spawn({
        let ignores = ignores.clone();
        let interval = config.ignore_expiry_check_interval();
        let mut cancel_rx = cancel_rx.clone();
        async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = cancel_rx.changed() => return,
                }
                ignores.report_expired_count(now_ms());
            }
        }
    });

    tasks.spawn({
        let follower = follower.clone();
        let interval = config.gitiles_poll_interval();
        let mut cancel_rx = cancel_rx.clone();
        async move {
            loop {
                match follower.poll().await {
                    Ok(commits) if !commits.is_empty() => {
                        tracing::info!(count = commits.len(), "gitiles follower assigned new commits");
                    },
                    Ok(_) => {},
                    Err(e) => tracing::error!("gitiles poll failed: {e:#}"),
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = cancel_rx.changed() => return,
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl-C, shutting down");
    let _ = cancel_tx.send(true);
    drop(trigger_tx);

    let grace = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(grace);
    loop {
        tokio::select! {
            _ = &mut grace => break,
            next = tasks.join_next() => match next {
                None => break,
                Some(Err(e)) => {
                    metrics::BACKGROUND_TASK_PANICS_TOTAL.inc();
                    tracing::error!("background task panicked: {e}");
                },
                Some(Ok(())) => {},
            },
        }
    }

    Ok(())
}
