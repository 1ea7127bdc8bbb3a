use metrics::{
    register_convex_counter,
    register_convex_histogram,
};

register_convex_counter!(
    pub GITILES_POLL_TOTAL,
    "Count of Gitiles poll cycles run"
);
register_convex_counter!(
    pub GITILES_COMMITS_ASSIGNED_TOTAL,
    "Count of commits assigned a new monotonic commit id"
);
register_convex_counter!(
    pub GITILES_LANDED_CLS_MIGRATED_TOTAL,
    "Count of changelists whose expectations were migrated onto the primary branch on landing"
);
register_convex_counter!(
    pub GITILES_NOOP_MIGRATIONS_TOTAL,
    "Count of landed-CL migrations that produced zero non-noop deltas"
);
register_convex_histogram!(
    pub GITILES_COMMITS_PER_POLL,
    "Number of commits assigned a commit id in a single poll cycle"
);
