use metrics::{
    register_convex_counter,
    register_convex_histogram,
};

register_convex_counter!(
    pub TRYJOB_RESULTS_WRITTEN_TOTAL,
    "Count of try-job result rows written"
);
register_convex_counter!(
    pub TRYJOB_PARAM_MAPS_DEDUPED_TOTAL,
    "Count of param-map writes skipped because the hash already existed"
);
register_convex_counter!(
    pub TRYJOB_BAD_RESULTS_TOTAL,
    "Count of try-job results dropped on read because a referenced param map was missing"
);
register_convex_histogram!(
    pub TRYJOB_GET_RESULTS_SHARD_FANOUT,
    "Number of shards scanned in parallel by a single GetResults call"
);
