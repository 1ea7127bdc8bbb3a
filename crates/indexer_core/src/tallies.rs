//! The most expensive layer: digest-frequency tallies over the
//! ignore-filtered tile, keyed by trace and by test. Depends only on the
//! tile and ignore rules, so it's reused by reference across an
//! expectation-only refresh (spec §4.5).

use std::collections::BTreeMap;

use gold_types::{
    Digest,
    Grouping,
    Tile,
    TraceId,
};

/// A digest -> occurrence-count histogram.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DigestCounts(pub BTreeMap<Digest, usize>);

impl DigestCounts {
    fn bump(&mut self, digest: &Digest) {
        *self.0.entry(digest.clone()).or_insert(0) += 1;
    }
}

/// `tallies{by_trace, by_test, by_query}` from spec §4.5. `by_query` is
/// served directly off `by_test`: a query selector picks out a subset of
/// groupings, and those groupings' tallies already answer "how many traces
/// currently show each digest" — there's no separate aggregate to maintain.
#[derive(Clone, Debug, Default)]
pub struct Tallies {
    /// Every digest a trace has shown across the tile's commit window, used
    /// by the flaky-trace threshold.
    pub by_trace: BTreeMap<TraceId, DigestCounts>,
    /// For each test, how many traces currently (most recent commit) show
    /// each digest.
    pub by_test: BTreeMap<Grouping, DigestCounts>,
}

pub fn compute_tallies(tile: &Tile, grouping_keys: &[String]) -> Tallies {
    let keys: Vec<&str> = grouping_keys.iter().map(String::as_str).collect();
    let mut tallies = Tallies::default();
    for (trace_id, trace) in &tile.traces {
        let mut by_trace = DigestCounts::default();
        for digest in trace.digests.iter().flatten() {
            by_trace.bump(digest);
        }
        tallies.by_trace.insert(trace_id.clone(), by_trace);

        if let Some(current) = trace.most_recent_digest() {
            let grouping = Grouping::from_params(&trace.params, &keys);
            tallies.by_test.entry(grouping).or_default().bump(current);
        }
    }
    tallies
}
