use metrics::{
    register_convex_counter,
    register_convex_gauge,
};

register_convex_counter!(pub IGNORE_RULE_CREATED_TOTAL, "Count of ignore rules created");
register_convex_counter!(pub IGNORE_RULE_DELETED_TOTAL, "Count of ignore rules deleted");
register_convex_gauge!(
    pub IGNORE_EXPIRED_UNDELETED_RULES,
    "Number of expired ignore rules that have not yet been deleted"
);
