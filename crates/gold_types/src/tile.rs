use std::{
    fmt,
    str::FromStr,
};

use anyhow::Context;
use imbl::{
    HashMap,
    Vector,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    commit::Commit,
    paramset::{
        union_params_into,
        ParamSet,
        Params,
    },
};

/// A 32-character hex content hash of an image. Opaque outside of the diff
/// service.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.0)
    }
}

impl FromStr for Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        anyhow::ensure!(
            s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit()),
            "digest {s:?} must be 32 hex characters"
        );
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Digest {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// The canonical key under which a trace lives in a [`Tile`]: the fully
/// qualified parameter set rendered as `key=value,key=value,...` in sorted
/// key order, matching how the frontend and the ignore-rule matcher both
/// refer to a trace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display)]
pub struct TraceId(String);

impl TraceId {
    pub fn from_params(params: &Params) -> Self {
        let rendered = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        Self(rendered)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.0)
    }
}

/// One test configuration's time-ordered sequence of digests, one slot per
/// commit in the owning tile. `None` marks a commit where this trace didn't
/// produce a result ("missing"), which is distinct from an untriaged digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub params: Params,
    pub digests: Vector<Option<Digest>>,
    pub comment_indices: Vector<usize>,
}

impl Trace {
    pub fn new(params: Params, digests: Vector<Option<Digest>>) -> Self {
        Self {
            params,
            digests,
            comment_indices: Vector::new(),
        }
    }

    /// The set of distinct non-missing digests this trace has shown across
    /// the tile, used by the flaky-trace threshold in Search.
    pub fn unique_digests(&self) -> std::collections::BTreeSet<&Digest> {
        self.digests.iter().flatten().collect()
    }

    pub fn most_recent_digest(&self) -> Option<&Digest> {
        self.digests.iter().rev().find_map(|d| d.as_ref())
    }

    pub fn at(&self, commit_index: usize) -> Option<&Digest> {
        self.digests.get(commit_index).and_then(|d| d.as_ref())
    }
}

/// The bounded sliding window of recent commits and their trace data that
/// every index layer is computed from. Immutable once built: a refresh
/// produces a new `Tile` rather than mutating this one, so concurrent
/// readers holding a clone never observe a half-updated window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub commits: Vector<Commit>,
    pub traces: HashMap<TraceId, Trace>,
    pub paramset: ParamSet,
}

impl Tile {
    pub fn new(commits: Vector<Commit>, traces: HashMap<TraceId, Trace>) -> anyhow::Result<Self> {
        let mut paramset = ParamSet::new();
        for trace in traces.values() {
            anyhow::ensure!(
                trace.digests.len() == commits.len(),
                "trace has {} digests but tile has {} commits",
                trace.digests.len(),
                commits.len()
            );
            union_params_into(&mut paramset, &trace.params);
        }
        Ok(Self {
            commits,
            traces,
            paramset,
        })
    }

    pub fn num_commits(&self) -> usize {
        self.commits.len()
    }

    pub fn commit_index(&self, id: crate::commit::CommitId) -> Option<usize> {
        self.commits.iter().position(|c| c.id == id)
    }

    /// A tile containing only the traces for which `keep` returns true,
    /// commits and paramset untouched. Used to build the ignore-filtered
    /// view without mutating the source tile.
    pub fn filter_traces(&self, mut keep: impl FnMut(&Trace) -> bool) -> anyhow::Result<Self> {
        let traces: HashMap<TraceId, Trace> = self
            .traces
            .iter()
            .filter(|(_, trace)| keep(trace))
            .map(|(id, trace)| (id.clone(), trace.clone()))
            .collect();
        Self::new(self.commits.clone(), traces).context("filtering traces broke tile invariant")
    }
}
