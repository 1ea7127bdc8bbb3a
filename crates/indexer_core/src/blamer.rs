//! `blamer{(test, digest) -> commit frequency distribution}`: for every
//! untriaged digest currently showing on some trace, a histogram over commit
//! indices of where that digest's run of occurrences began. A trace casts
//! one vote, at the first commit of the run that produced its current
//! digest; traces that agree on the same commit reinforce each other,
//! letting Details pick the most likely culprit without ranking full diffs.

use std::collections::BTreeMap;

use gold_types::{
    expectation::{
        Expectations,
        ExpectationKey,
        Label,
    },
    Digest,
    Grouping,
    Tile,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlameDistribution(pub BTreeMap<usize, usize>);

pub type Blamer = BTreeMap<(Grouping, Digest), BlameDistribution>;

/// The first index of the trailing run of `digest` in `digests`, i.e. the
/// earliest commit that could have introduced it. Missing slots within the
/// run don't break it; a differing digest does.
fn run_start(digests: &imbl::Vector<Option<Digest>>, digest: &Digest) -> usize {
    let mut start = digests.len().saturating_sub(1);
    for i in (0..digests.len()).rev() {
        match digests.get(i).and_then(|d| d.as_ref()) {
            Some(d) if d == digest => start = i,
            Some(_) => break,
            None => {},
        }
    }
    start
}

pub fn compute_blamer(tile: &Tile, grouping_keys: &[String], expectations: &Expectations) -> Blamer {
    let keys: Vec<&str> = grouping_keys.iter().map(String::as_str).collect();
    let mut blamer = Blamer::new();
    for trace in tile.traces.values() {
        let Some(digest) = trace.most_recent_digest() else {
            continue;
        };
        let grouping = Grouping::from_params(&trace.params, &keys);
        let key = ExpectationKey { grouping: grouping.clone(), digest: digest.clone() };
        let label = expectations.get(&key).map(|entry| entry.label).unwrap_or_default();
        if label != Label::Untriaged {
            continue;
        }
        let start = run_start(&trace.digests, digest);
        blamer
            .entry((grouping, digest.clone()))
            .or_default()
            .0
            .entry(start)
            .and_modify(|n| *n += 1)
            .or_insert(1);
    }
    blamer
}
