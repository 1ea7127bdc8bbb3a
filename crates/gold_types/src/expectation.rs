use std::{
    collections::BTreeMap,
    fmt,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    paramset::Grouping,
    tile::Digest,
    Timestamp,
};

/// The triage status of a `(grouping, digest)` pair. Default is `Untriaged`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    #[default]
    Untriaged,
    Positive,
    Negative,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Untriaged => "untriaged",
            Label::Positive => "positive",
            Label::Negative => "negative",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Label {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untriaged" => Ok(Label::Untriaged),
            "positive" => Ok(Label::Positive),
            "negative" => Ok(Label::Negative),
            other => anyhow::bail!("unknown label {other:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExpectationKey {
    pub grouping: Grouping,
    pub digest: Digest,
}

/// One entry in the consolidated label table: a label plus the retention
/// sweeper's freshness signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationEntry {
    pub label: Label,
    pub last_used: Timestamp,
}

/// The consolidated `(grouping, digest) -> Label` view returned by
/// `Get`/`GetForCL`. A plain map rather than a trait: consumers that need CL
/// overlay semantics ask the store for the merged view directly instead of
/// layering two of these themselves.
pub type Expectations = BTreeMap<ExpectationKey, ExpectationEntry>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One triage mutation against a single `(grouping, digest)`. Immutable once
/// written; `UndoChange` produces a fresh delta with `label_before` and
/// `label_after` swapped rather than editing this one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationDelta {
    pub grouping: Grouping,
    pub digest: Digest,
    pub label_before: Label,
    pub label_after: Label,
}

impl ExpectationDelta {
    pub fn inverted(&self) -> Self {
        Self {
            grouping: self.grouping.clone(),
            digest: self.digest.clone(),
            label_before: self.label_after,
            label_after: self.label_before,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.label_before == self.label_after
    }
}

/// A branch an `ExpectationRecord` was written against: the primary branch,
/// or a changelist overlay scoped to `(CRS, CL)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Branch {
    Primary,
    Changelist {
        crs: crate::tryjob::CrsId,
        cl: crate::tryjob::ChangelistId,
    },
}

/// The append-only unit of undo: every write to the expectation store
/// produces exactly one of these, carrying the deltas it applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationRecord {
    pub id: RecordId,
    pub user: String,
    pub ts: Timestamp,
    pub branch: Branch,
    pub deltas: Vec<ExpectationDelta>,
}

impl ExpectationRecord {
    pub fn num_changes(&self) -> usize {
        self.deltas.len()
    }
}
