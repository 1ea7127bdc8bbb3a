use metrics::{
    register_convex_counter,
    register_convex_histogram,
};

register_convex_counter!(
    pub TRIAGE_WRITES_TOTAL,
    "Count of committed expectation records (ordinary triage writes)"
);
register_convex_counter!(
    pub TRIAGE_UNDOS_TOTAL,
    "Count of committed undo records"
);
register_convex_counter!(
    pub TRIAGE_CONFLICTS_TOTAL,
    "Count of AddChange calls rejected because the expected prior label didn't match"
);
register_convex_counter!(
    pub RETENTION_SWEEP_REMOVALS_TOTAL,
    "Count of expectation entries removed by a retention sweep"
);
register_convex_histogram!(
    pub TRIAGE_WRITE_BATCH_SIZE,
    "Number of deltas committed per AddChange/UndoChange call"
);
