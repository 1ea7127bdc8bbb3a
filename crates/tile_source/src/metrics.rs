use metrics::{
    register_convex_counter,
    register_convex_gauge,
    register_convex_histogram,
};

register_convex_counter!(pub TILE_REFRESH_TOTAL, "Count of successful tile refreshes");
register_convex_counter!(
    pub TILE_REFRESH_VCS_BEHIND_TOTAL,
    "Count of refreshes skipped because the VCS layer hadn't caught up yet"
);
register_convex_counter!(pub TILE_REFRESH_FAILURE_TOTAL, "Count of failed tile refreshes");
register_convex_gauge!(pub TILE_NUM_COMMITS, "Number of commits in the current tile");
register_convex_gauge!(pub TILE_NUM_TRACES, "Number of traces in the current tile");
register_convex_histogram!(pub TILE_REFRESH_SECONDS, "Wall time to build one tile refresh");
