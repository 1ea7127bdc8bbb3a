use metrics::register_convex_counter;

register_convex_counter!(pub BACKGROUND_TASK_PANICS_TOTAL, "Count of background loops that panicked");
