use metrics::{
    register_convex_counter,
    register_convex_histogram,
};

register_convex_counter!(
    pub INDEXER_PIPELINE_RUNS_TOTAL,
    "Count of indexer pipeline runs started"
);
register_convex_counter!(
    pub INDEXER_PIPELINE_SUCCESSES_TOTAL,
    "Count of indexer pipeline runs that published a new index"
);
register_convex_counter!(
    pub INDEXER_PIPELINE_FAILURES_TOTAL,
    "Count of indexer pipeline runs that failed and left the previous index in place"
);
register_convex_counter!(
    pub INDEXER_FULL_RUNS_TOTAL,
    "Count of pipeline runs that recomputed every layer (timer or tile refresh)"
);
register_convex_counter!(
    pub INDEXER_PARTIAL_RUNS_TOTAL,
    "Count of pipeline runs that reused tallies/paramset (expectation change only)"
);
register_convex_counter!(
    pub INDEXER_WARMER_FAILURES_TOTAL,
    "Count of warmer enqueue failures (advisory only, never aborts a run)"
);
register_convex_histogram!(
    pub INDEXER_PIPELINE_RUN_SECONDS,
    "Wall-clock duration of one indexer pipeline run"
);
register_convex_histogram!(
    pub INDEXER_WARMER_QUEUE_SIZE,
    "Number of (grouping, digest) pairs enqueued by the warmer per run"
);
