//! Typed, time-expiring ignore rules: CRUD plus a compiled `Matcher` the
//! indexer filters traces through. Expired rules stop filtering but stay
//! visible via `list()` until explicitly deleted (spec §4.2).

mod metrics;

use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use async_trait::async_trait;
use gold_types::{
    IgnoreRule,
    IgnoreRuleId,
    ParamSet,
    Params,
    Timestamp,
};
use parking_lot::RwLock;

#[async_trait]
pub trait IgnoreStore: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<IgnoreRule>>;
    async fn create(
        &self,
        creator: &str,
        expires: Option<Timestamp>,
        query: ParamSet,
        note: &str,
    ) -> anyhow::Result<IgnoreRule>;
    async fn update(
        &self,
        id: IgnoreRuleId,
        expires: Option<Timestamp>,
        query: ParamSet,
        note: &str,
    ) -> anyhow::Result<IgnoreRule>;
    /// Returns whether a rule with `id` was present to delete.
    async fn delete(&self, id: IgnoreRuleId) -> anyhow::Result<bool>;
    /// A snapshot `Matcher` built from every currently-active (non-expired)
    /// rule as of `now`.
    async fn matcher(&self, now: Timestamp) -> anyhow::Result<Matcher>;
}

/// The union of every active rule's selector: a trace matches if *any* rule
/// matches it. Built once per snapshot rather than re-walking the rule list
/// per trace.
#[derive(Clone, Debug, Default)]
pub struct Matcher {
    queries: Vec<ParamSet>,
}

impl Matcher {
    pub fn matches(&self, params: &Params) -> bool {
        self.queries
            .iter()
            .any(|query| gold_types::paramset::matches_query(params, query))
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

pub struct InMemoryIgnoreStore {
    rules: RwLock<Vec<IgnoreRule>>,
    next_id: AtomicU64,
}

impl InMemoryIgnoreStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Count of rules whose `expires` has passed but that are still in the
    /// table. Observability only — per spec §4.2 this never triggers a
    /// deletion; a caller (e.g. `gold_backend`'s background loop) polls this
    /// and publishes it as a gauge.
    pub fn report_expired_count(&self, now: Timestamp) -> usize {
        let count = self
            .rules
            .read()
            .iter()
            .filter(|rule| rule.is_expired(now))
            .count();
        metrics::IGNORE_EXPIRED_UNDELETED_RULES.set(count as f64);
        count
    }
}

impl Default for InMemoryIgnoreStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IgnoreStore for InMemoryIgnoreStore {
    async fn list(&self) -> anyhow::Result<Vec<IgnoreRule>> {
        Ok(self.rules.read().clone())
    }

    async fn create(
        &self,
        creator: &str,
        expires: Option<Timestamp>,
        query: ParamSet,
        note: &str,
    ) -> anyhow::Result<IgnoreRule> {
        if query.is_empty() {
            anyhow::bail!(errors::ErrorMetadata::precondition(
                "EmptyIgnoreFilter",
                "an ignore rule must have a non-empty filter",
            ));
        }
        let id = IgnoreRuleId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let rule = IgnoreRule {
            id,
            creator: creator.to_owned(),
            expires,
            query,
            note: note.to_owned(),
        };
        self.rules.write().push(rule.clone());
        metrics::IGNORE_RULE_CREATED_TOTAL.inc();
        Ok(rule)
    }

    async fn update(
        &self,
        id: IgnoreRuleId,
        expires: Option<Timestamp>,
        query: ParamSet,
        note: &str,
    ) -> anyhow::Result<IgnoreRule> {
        if query.is_empty() {
            anyhow::bail!(errors::ErrorMetadata::precondition(
                "EmptyIgnoreFilter",
                "an ignore rule must have a non-empty filter",
            ));
        }
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|rule| rule.id == id)
            .ok_or_else(|| {
                errors::ErrorMetadata::not_found(
                    "NoSuchIgnoreRule",
                    format!("no ignore rule with id {id}"),
                )
            })?;
        rule.expires = expires;
        rule.query = query;
        rule.note = note.to_owned();
        Ok(rule.clone())
    }

    async fn delete(&self, id: IgnoreRuleId) -> anyhow::Result<bool> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        let deleted = rules.len() < before;
        if deleted {
            metrics::IGNORE_RULE_DELETED_TOTAL.inc();
        }
        Ok(deleted)
    }

    async fn matcher(&self, now: Timestamp) -> anyhow::Result<Matcher> {
        let queries = self
            .rules
            .read()
            .iter()
            .filter(|rule| !rule.is_expired(now))
            .map(|rule| rule.query.clone())
            .collect();
        Ok(Matcher { queries })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn query(key: &str, value: &str) -> ParamSet {
        let mut query = ParamSet::new();
        query.insert(key.to_owned(), BTreeSet::from([value.to_owned()]));
        query
    }

    #[tokio::test]
    async fn create_rejects_empty_filter() {
        let store = InMemoryIgnoreStore::new();
        let err = store
            .create("alice", None, ParamSet::new(), "note")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<errors::ErrorMetadata>().unwrap().is_precondition());
    }

    #[tokio::test]
    async fn expired_rules_are_excluded_from_matcher_but_kept_in_list() {
        let store = InMemoryIgnoreStore::new();
        let active = store
            .create("alice", None, query("os", "Linux"), "always on")
            .await
            .unwrap();
        let expired = store
            .create("alice", Some(100), query("os", "Mac"), "old")
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|r| r.id == expired.id));

        let matcher = store.matcher(200).await.unwrap();
        let mut mac_params = Params::new();
        mac_params.insert("os".to_owned(), "Mac".to_owned());
        assert!(!matcher.matches(&mac_params));

        let mut linux_params = Params::new();
        linux_params.insert("os".to_owned(), "Linux".to_owned());
        assert!(matcher.matches(&linux_params));
        let _ = active;
    }

    #[tokio::test]
    async fn delete_reports_whether_rule_was_present() {
        let store = InMemoryIgnoreStore::new();
        let rule = store
            .create("alice", None, query("os", "Linux"), "note")
            .await
            .unwrap();
        assert!(store.delete(rule.id).await.unwrap());
        assert!(!store.delete(rule.id).await.unwrap());
    }

    #[tokio::test]
    async fn update_unknown_rule_is_not_found() {
        let store = InMemoryIgnoreStore::new();
        let err = store
            .update(IgnoreRuleId::new(999), None, query("os", "Linux"), "note")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<errors::ErrorMetadata>().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn report_expired_count_counts_only_expired() {
        let store = InMemoryIgnoreStore::new();
        store
            .create("alice", None, query("os", "Linux"), "active")
            .await
            .unwrap();
        store
            .create("alice", Some(100), query("os", "Mac"), "expired")
            .await
            .unwrap();
        assert_eq!(store.report_expired_count(200), 1);
    }
}
