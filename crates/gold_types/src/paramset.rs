use std::collections::{
    BTreeMap,
    BTreeSet,
};

use serde::{
    Deserialize,
    Serialize,
};

/// A fully-qualified assignment of trace parameters, e.g.
/// `{os: Linux, name: foo, source_type: svg}`. This is what a [`Trace`] and
/// a try-job result's `result_params` carry.
///
/// [`Trace`]: crate::tile::Trace
pub type Params = BTreeMap<String, String>;

/// The minimal key set that identifies a test, e.g. `{name, source_type}`
/// paired with their values for one particular test — the subject of
/// triage alongside a digest. Newtype over `Params` so it can't be confused
/// with a full trace's parameter set at the API boundary, even though the
/// representation is the same.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grouping(Params);

impl Grouping {
    pub fn new(params: Params) -> Self {
        Self(params)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_params(&self) -> &Params {
        &self.0
    }

    /// Project a full trace's params down to a grouping given the set of
    /// key names that identify a test in this instance.
    pub fn from_params(params: &Params, grouping_keys: &[&str]) -> Self {
        let mut grouping = BTreeMap::new();
        for key in grouping_keys {
            if let Some(value) = params.get(*key) {
                grouping.insert((*key).to_owned(), value.clone());
            }
        }
        Self(grouping)
    }
}

/// The set of values observed for each parameter key across a tile (or an
/// ignore rule's selector, which is query-shaped the same way). Unlike
/// [`Params`], each key maps to every value seen rather than a single one.
pub type ParamSet = BTreeMap<String, BTreeSet<String>>;

/// Fold a single trace's concrete params into a running paramset summary.
pub fn union_params_into(paramset: &mut ParamSet, params: &Params) {
    for (key, value) in params {
        paramset
            .entry(key.clone())
            .or_default()
            .insert(value.clone());
    }
}

/// A query selector: for each key present, the trace's value for that key
/// must be one of the listed values (AND across keys, OR within a key's
/// value list). An absent key imposes no constraint.
pub fn matches_query(params: &Params, query: &ParamSet) -> bool {
    query.iter().all(|(key, allowed_values)| {
        params
            .get(key)
            .is_some_and(|value| allowed_values.contains(value))
    })
}
