use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    paramset::ParamSet,
    Timestamp,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IgnoreRuleId(u64);

impl IgnoreRuleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for IgnoreRuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A time-expiring selector that hides matching traces from the index and
/// from most queries. `expires = None` means the rule never expires.
/// Expired rules stop filtering data but are kept around (and returned from
/// `List`) for audit until explicitly deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub id: IgnoreRuleId,
    pub creator: String,
    pub expires: Option<Timestamp>,
    pub query: ParamSet,
    pub note: String,
}

impl IgnoreRule {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}
