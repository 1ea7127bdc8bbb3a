use std::time::Duration;

use clap::Parser;

/// Background-loop knobs for the indexing/triage core. No HTTP server
/// configuration here: the façade that would serve spec §6's JSON API is out
/// of scope, so this binary only has loops to run, not a port to bind.
#[derive(Parser, Clone, Debug)]
#[clap(author = "Gold Authors")]
pub struct GoldConfig {
    /// Number of trailing commits the sliding-window tile covers.
    #[clap(long, env = "GOLD_TILE_SIZE", default_value = "256")]
    pub tile_size: usize,

    /// How often the tile source refreshes from the VCS/trace-store layer.
    #[clap(long, env = "GOLD_TILE_REFRESH_SECS", default_value = "60")]
    pub tile_refresh_secs: u64,

    /// How often the indexer pipeline re-runs even with no other trigger.
    #[clap(long, env = "GOLD_INDEXER_TIMER_SECS", default_value = "300")]
    pub indexer_timer_secs: u64,

    /// Age after which a Positive expectation is swept out, in days. Unset
    /// means Positive entries never expire.
    #[clap(long, env = "GOLD_RETENTION_POSITIVE_DAYS")]
    pub retention_positive_days: Option<u64>,

    /// Age after which a Negative expectation is swept out, in days. Unset
    /// means Negative entries never expire.
    #[clap(long, env = "GOLD_RETENTION_NEGATIVE_DAYS")]
    pub retention_negative_days: Option<u64>,

    /// How often the retention sweep runs over the expectation store.
    #[clap(long, env = "GOLD_RETENTION_SWEEP_SECS", default_value = "3600")]
    pub retention_sweep_secs: u64,

    /// How often the ignore store's expired-rule gauge is refreshed.
    #[clap(long, env = "GOLD_IGNORE_EXPIRY_CHECK_SECS", default_value = "300")]
    pub ignore_expiry_check_secs: u64,

    /// How often the gitiles follower polls for new commits.
    #[clap(long, env = "GOLD_GITILES_POLL_SECS", default_value = "30")]
    pub gitiles_poll_secs: u64,

    /// Branch the gitiles follower assigns commit ids against.
    #[clap(long, env = "GOLD_GITILES_BRANCH", default_value = "main")]
    pub gitiles_branch: String,

    /// Comma-separated trace param keys the indexer groups traces by.
    #[clap(long, env = "GOLD_GROUPING_KEYS", default_value = "name", value_delimiter = ',')]
    pub grouping_keys: Vec<String>,

    /// Upper bound on a single retried RPC's wall-clock budget, shared by
    /// every store/poller's `backoff::RetryBudget`.
    #[clap(long, env = "GOLD_RETRY_DEADLINE_SECS", default_value = "30")]
    pub retry_deadline_secs: u64,
}

impl GoldConfig {
    pub fn tile_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.tile_refresh_secs)
    }

    pub fn indexer_timer_interval(&self) -> Duration {
        Duration::from_secs(self.indexer_timer_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_secs)
    }

    pub fn ignore_expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.ignore_expiry_check_secs)
    }

    pub fn gitiles_poll_interval(&self) -> Duration {
        Duration::from_secs(self.gitiles_poll_secs)
    }

    pub fn retention_policy(&self) -> expectation_store::RetentionPolicy {
        expectation_store::RetentionPolicy {
            positive_max_age: self.retention_positive_days.map(|d| Duration::from_secs(d * 86_400)),
            negative_max_age: self.retention_negative_days.map(|d| Duration::from_secs(d * 86_400)),
        }
    }

    pub fn retry_budget(&self) -> backoff::RetryBudget {
        backoff::RetryBudget::new(Duration::from_secs(self.retry_deadline_secs))
    }
}
