//! `summaries{per_test: {pos, neg, unt, unt_hashes}}` from tallies plus the
//! current expectations. Cheap enough to redo on every expectation change —
//! it's the layer triage actions actually invalidate.

use std::collections::BTreeMap;

use gold_types::{
    expectation::{
        Expectations,
        Label,
    },
    Digest,
    Grouping,
};

use crate::tallies::Tallies;

/// Per-test digest counts broken out by current label, plus the set of
/// digests still untriaged (what Search/Detail need to flag for review).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub pos: usize,
    pub neg: usize,
    pub unt: usize,
    pub unt_hashes: Vec<Digest>,
}

pub type Summaries = BTreeMap<Grouping, TestSummary>;

pub fn compute_summaries(tallies: &Tallies, expectations: &Expectations) -> Summaries {
    let mut summaries = Summaries::new();
    for (grouping, counts) in &tallies.by_test {
        let summary = summaries.entry(grouping.clone()).or_default();
        for digest in counts.0.keys() {
            let key = gold_types::expectation::ExpectationKey {
                grouping: grouping.clone(),
                digest: digest.clone(),
            };
            match expectations.get(&key).map(|entry| entry.label) {
                Some(Label::Positive) => summary.pos += 1,
                Some(Label::Negative) => summary.neg += 1,
                Some(Label::Untriaged) | None => {
                    summary.unt += 1;
                    summary.unt_hashes.push(digest.clone());
                },
            }
        }
    }
    summaries
}
