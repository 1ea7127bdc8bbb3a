use metrics::register_convex_counter;

register_convex_counter!(pub NOT_FOUND_ERROR_TOTAL, "Count of not-found errors");
register_convex_counter!(pub TRIAGE_CONFLICT_TOTAL, "Count of triage write conflicts");
register_convex_counter!(pub PRECONDITION_ERROR_TOTAL, "Count of precondition errors");
register_convex_counter!(pub TRANSIENT_ERROR_TOTAL, "Count of transient backend errors");
register_convex_counter!(pub PERMISSION_DENIED_ERROR_TOTAL, "Count of permission-denied errors");
register_convex_counter!(pub FATAL_ERROR_TOTAL, "Count of fatal errors");
