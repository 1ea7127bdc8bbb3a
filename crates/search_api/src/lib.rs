//! Read-only Search, Details, and Cluster queries over the indexer's current
//! [`Index`] (spec §4.6). None of these ever block on a recomputation: they
//! take a `&Index` the caller already dereferenced from
//! [`indexer_core::IndexerCore::current`].

use std::collections::{
    BTreeMap,
    BTreeSet,
};

use async_trait::async_trait;
use gold_types::{
    expectation::{
        ExpectationKey,
        Expectations,
        Label,
    },
    paramset::{
        matches_query,
        union_params_into,
    },
    tile::TraceId,
    tryjob::TryJobResult,
    Digest,
    Grouping,
    Paginated,
    ParamSet,
};
use indexer_core::{
    BlameDistribution,
    Index,
};

/// Closest reference digests a Search/Details entry carries. Both fields
/// degrade to `None` when the diff service is unavailable rather than
/// failing the query (spec §4.5's failure semantics).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefDiffs {
    pub positive: Option<Digest>,
    pub negative: Option<Digest>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchEntry {
    pub test: Grouping,
    pub digest: Digest,
    pub status: Label,
    pub paramset: ParamSet,
    pub traces: Vec<TraceId>,
    pub ref_diffs: RefDiffs,
    pub closest_ref: Option<Digest>,
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub selector: ParamSet,
    pub include_ignored: bool,
    pub include_positive: bool,
    pub include_negative: bool,
    pub include_untriaged: bool,
    /// Traces with more unique digests than this are excluded from results
    /// (spec §9's open question (a); the observable behavior implemented
    /// here is "hidden", not "demoted" — see `DESIGN.md`).
    pub flaky_trace_threshold: Option<usize>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            selector: ParamSet::new(),
            include_ignored: false,
            include_positive: false,
            include_negative: false,
            include_untriaged: true,
            flaky_trace_threshold: None,
            limit: 50,
            offset: 0,
        }
    }
}

fn label_matches(status: Label, query: &SearchQuery) -> bool {
    match status {
        Label::Positive => query.include_positive,
        Label::Negative => query.include_negative,
        Label::Untriaged => query.include_untriaged,
    }
}

/// Ranks every `(test, digest)` pair shown by at least one trace matching
/// `query.selector`, matching on the paramset summary and tallying
/// candidates the same way the indexer's own `by_test` tally does.
pub fn search(index: &Index, query: &SearchQuery) -> Paginated<SearchEntry> {
    let entries = primary_entries(index, query, &index.expectations);
    paginate(entries, query)
}

fn paginate(mut entries: Vec<SearchEntry>, query: &SearchQuery) -> Paginated<SearchEntry> {
    entries.sort_by(|a, b| (&a.test, &a.digest).cmp(&(&b.test, &b.digest)));
    let total = entries.len();
    let page: Vec<_> = entries.into_iter().skip(query.offset).take(query.limit).collect();
    Paginated::new(page, query.offset, total)
}

/// `search`'s implementation, parameterized on the expectation snapshot to
/// apply labels from, returned unpaginated so `search_cl` can join in a
/// changelist's own results before paging the combined set once. The
/// primary-branch entry point passes `index.expectations` directly;
/// `search_cl` passes a CL-merged view instead (spec §4.6: "For CL scope,
/// the primary tile is joined with the CL's TryJob results and CL-scoped
/// expectation overlay").
fn primary_entries(index: &Index, query: &SearchQuery, expectations: &Expectations) -> Vec<SearchEntry> {
    let tile = if query.include_ignored { &index.raw_tile } else { &index.tile };
    let keys: Vec<&str> = index.grouping_keys.iter().map(String::as_str).collect();

    let mut by_key: BTreeMap<(Grouping, Digest), (ParamSet, BTreeSet<TraceId>)> = BTreeMap::new();
    for (trace_id, trace) in &tile.traces {
        if !matches_query(&trace.params, &query.selector) {
            continue;
        }
        if let Some(threshold) = query.flaky_trace_threshold {
            if trace.unique_digests().len() > threshold {
                continue;
            }
        }
        let Some(digest) = trace.most_recent_digest() else {
            continue;
        };
        let grouping = Grouping::from_params(&trace.params, &keys);
        let entry = by_key.entry((grouping, digest.clone())).or_default();
        union_params_into(&mut entry.0, &trace.params);
        entry.1.insert(trace_id.clone());
    }

    by_key
        .into_iter()
        .filter_map(|((test, digest), (paramset, traces))| {
            let key = ExpectationKey { grouping: test.clone(), digest: digest.clone() };
            let status = expectations.get(&key).map(|e| e.label).unwrap_or_default();
            if !label_matches(status, query) {
                return None;
            }
            Some(SearchEntry {
                test,
                digest,
                status,
                paramset,
                traces: traces.into_iter().collect(),
                ref_diffs: RefDiffs::default(),
                closest_ref: None,
            })
        })
        .collect()
}

/// CL-scoped Search (spec §4.6): the primary tile's matches, joined with the
/// changelist's own TryJob results that aren't already represented on the
/// primary tile, all labeled from `cl_expectations` (the CL's expectation
/// overlay merged over the primary branch — see
/// `ExpectationStore::get_for_cl`). A try-job result's grouping is derived
/// from its combined `group_params`/`result_params`, the same way the
/// primary tile derives a trace's grouping from its full `Params`.
pub fn search_cl(index: &Index, query: &SearchQuery, cl_results: &[TryJobResult], cl_expectations: &Expectations) -> Paginated<SearchEntry> {
    let mut entries = primary_entries(index, query, cl_expectations);
    let mut seen: BTreeSet<(Grouping, Digest)> = entries.iter().map(|e| (e.test.clone(), e.digest.clone())).collect();
    let keys: Vec<&str> = index.grouping_keys.iter().map(String::as_str).collect();

    for result in cl_results {
        let mut full_params = result.group_params.clone();
        for (k, v) in &result.result_params {
            full_params.insert(k.clone(), v.clone());
        }
        if !matches_query(&full_params, &query.selector) {
            continue;
        }
        let grouping = Grouping::from_params(&full_params, &keys);
        let dedup_key = (grouping.clone(), result.digest.clone());
        if seen.contains(&dedup_key) {
            continue;
        }

        let expectation_key = ExpectationKey { grouping: grouping.clone(), digest: result.digest.clone() };
        let status = cl_expectations.get(&expectation_key).map(|e| e.label).unwrap_or_default();
        if !label_matches(status, query) {
            continue;
        }

        let mut paramset = ParamSet::new();
        union_params_into(&mut paramset, &full_params);
        entries.push(SearchEntry {
            test: grouping,
            digest: result.digest.clone(),
            status,
            paramset,
            traces: Vec::new(),
            ref_diffs: RefDiffs::default(),
            closest_ref: None,
        });
        seen.insert(dedup_key);
    }

    paginate(entries, query)
}

/// The `{test, digest}` detail view: the same shape as one Search entry,
/// plus the commit blame distribution. `top == left` is the caller's
/// responsibility to special-case into a no-diff response; this just
/// reports blame and reference digests.
#[derive(Clone, Debug)]
pub struct DetailEntry {
    pub entry: SearchEntry,
    pub blame: BlameDistribution,
}

fn grouping_selector(test: &Grouping) -> ParamSet {
    let mut selector = ParamSet::new();
    union_params_into(&mut selector, test.as_params());
    selector
}

pub fn details(index: &Index, test: &Grouping, digest: &Digest, include_ignored: bool) -> Option<DetailEntry> {
    let query = SearchQuery {
        selector: grouping_selector(test),
        include_ignored,
        include_positive: true,
        include_negative: true,
        include_untriaged: true,
        limit: usize::MAX,
        ..SearchQuery::default()
    };
    let results = search(index, &query);
    let entry = results.data.into_iter().find(|e| &e.test == test && &e.digest == digest)?;
    let blame = index.blamer.get(&(test.clone(), digest.clone())).cloned().unwrap_or_default();
    Some(DetailEntry { entry, blame })
}

/// One node (digest) in an NxN cluster diagram for a single test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterNode {
    pub digest: Digest,
    pub status: Label,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterLink {
    pub left: Digest,
    pub right: Digest,
    pub value: f64,
}

#[derive(Clone, Debug)]
pub struct ClusterResult {
    pub nodes: Vec<ClusterNode>,
    pub links: Vec<ClusterLink>,
    pub paramsets_by_digest: BTreeMap<Digest, ParamSet>,
    pub paramsets_union: ParamSet,
}

/// The out-of-scope diff computation service: only the pairwise percent
/// shape Cluster consumes is modeled here.
#[async_trait]
pub trait ClusterDiffSource: Send + Sync {
    async fn pixel_diff_percent(&self, left: &Digest, right: &Digest) -> anyhow::Result<f64>;
}

/// Builds the NxN cluster for one test. A link that the diff service fails
/// to produce is dropped rather than failing the whole query, same
/// resilience as Search's reference-digest degradation.
pub async fn cluster(index: &Index, test: &Grouping, query: &SearchQuery, diff_source: &dyn ClusterDiffSource) -> ClusterResult {
    let mut test_query = query.clone();
    test_query.selector = grouping_selector(test);
    test_query.limit = usize::MAX;
    let results = search(index, &test_query);

    let mut paramsets_by_digest = BTreeMap::new();
    let mut paramsets_union = ParamSet::new();
    let mut nodes = Vec::new();
    for entry in &results.data {
        paramsets_by_digest.insert(entry.digest.clone(), entry.paramset.clone());
        nodes.push(ClusterNode { digest: entry.digest.clone(), status: entry.status });
    }
    for paramset in paramsets_by_digest.values() {
        for (key, values) in paramset {
            paramsets_union.entry(key.clone()).or_default().extend(values.iter().cloned());
        }
    }

    let mut links = Vec::new();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let left = &nodes[i].digest;
            let right = &nodes[j].digest;
            match diff_source.pixel_diff_percent(left, right).await {
                Ok(value) => links.push(ClusterLink { left: left.clone(), right: right.clone(), value }),
                Err(e) => tracing::warn!("cluster diff lookup failed for {left}/{right}: {e:#}"),
            }
        }
    }

    ClusterResult { nodes, links, paramsets_by_digest, paramsets_union }
}
