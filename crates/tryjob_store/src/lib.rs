//! Content-addressed storage of try-job outputs, per spec §4.3: try-jobs
//! keyed by `(system_id, ci_system)`, results stored as rows referencing
//! deduplicated `group_params`/`options` maps by content hash.

mod metrics;

use std::collections::BTreeMap;

use async_trait::async_trait;
use gold_types::{
    hash_params,
    ChangelistId,
    CiSystemId,
    Digest,
    ParamsHash,
    PatchsetId,
    Timestamp,
    TryJob,
    TryJobResult,
    TryJobResultRow,
    TryJobSystemId,
};
use parking_lot::RwLock;

/// Rows and param-map writes are applied in batches this large so a real
/// backend's transaction/placeholder limits are respected; phase 1 (param
/// maps) always completes before phase 2 (rows) begins, per spec §4.3.
const WRITE_BATCH_SIZE: usize = 500;
/// Digest-prefix shard count for the unbounded (`updated_after == 0`) scan
/// in `get_results`. Spec §4.3 calls out "typically 16-64"; the low end is
/// enough to show genuine fan-out without bloating test setup.
const SHARD_COUNT: usize = 16;

#[async_trait]
pub trait TryJobResultStore: Send + Sync {
    async fn put_tryjob(&self, cl: ChangelistId, ps: PatchsetId, tryjob: TryJob) -> anyhow::Result<()>;
    async fn get_tryjob(&self, id: &TryJobSystemId, ci_system: &CiSystemId) -> anyhow::Result<TryJob>;
    async fn get_tryjobs(&self, cl: &ChangelistId, ps: &PatchsetId) -> anyhow::Result<Vec<TryJob>>;
    async fn put_results(
        &self,
        cl: ChangelistId,
        ps: PatchsetId,
        tj_id: TryJobSystemId,
        ci_system: CiSystemId,
        results: Vec<TryJobResult>,
        ts: Timestamp,
    ) -> anyhow::Result<()>;
    /// `updated_after == 0` shards the scan across `SHARD_COUNT` digest
    /// prefixes run concurrently; otherwise a single time-bounded scan.
    async fn get_results(
        &self,
        cl: &ChangelistId,
        ps: &PatchsetId,
        updated_after: Timestamp,
    ) -> anyhow::Result<Vec<TryJobResult>>;
}

#[derive(Default)]
struct State {
    tryjobs: BTreeMap<(TryJobSystemId, CiSystemId), TryJob>,
    rows: BTreeMap<(ChangelistId, PatchsetId), Vec<TryJobResultRow>>,
    params: BTreeMap<ParamsHash, gold_types::Params>,
}

pub struct InMemoryTryJobResultStore {
    state: RwLock<State>,
}

impl InMemoryTryJobResultStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn shard_of(digest: &Digest) -> usize {
        let first_byte = digest.as_str().as_bytes().first().copied().unwrap_or(b'0');
        (first_byte as usize) % SHARD_COUNT
    }

    /// Phase 1: upsert `group_params`/`options` maps by content hash,
    /// skipping writes for hashes already present (the dedup itself) and
    /// for the empty-map sentinel (never written, per spec §4.3).
    fn upsert_param_maps(&self, results: &[TryJobResult]) {
        let mut hashes_to_maps = Vec::new();
        for result in results {
            if !result.group_params.is_empty() {
                hashes_to_maps.push((hash_params(&result.group_params), result.group_params.clone()));
            }
            if !result.options.is_empty() {
                hashes_to_maps.push((hash_params(&result.options), result.options.clone()));
            }
        }
        for chunk in hashes_to_maps.chunks(WRITE_BATCH_SIZE) {
            let mut state = self.state.write();
            for (hash, map) in chunk {
                if state.params.contains_key(hash) {
                    metrics::TRYJOB_PARAM_MAPS_DEDUPED_TOTAL.inc();
                } else {
                    state.params.insert(hash.clone(), map.clone());
                }
            }
        }
    }
}

impl Default for InMemoryTryJobResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TryJobResultStore for InMemoryTryJobResultStore {
    async fn put_tryjob(&self, _cl: ChangelistId, _ps: PatchsetId, tryjob: TryJob) -> anyhow::Result<()> {
        let key = (tryjob.system_id.clone(), tryjob.ci_system.clone());
        self.state.write().tryjobs.insert(key, tryjob);
        Ok(())
    }

    async fn get_tryjob(&self, id: &TryJobSystemId, ci_system: &CiSystemId) -> anyhow::Result<TryJob> {
        self.state
            .read()
            .tryjobs
            .get(&(id.clone(), ci_system.clone()))
            .cloned()
            .ok_or_else(|| {
                errors::ErrorMetadata::not_found(
                    "NoSuchTryJob",
                    format!("no try-job {id} on CI system {ci_system}"),
                )
                .into()
            })
    }

    async fn get_tryjobs(&self, cl: &ChangelistId, ps: &PatchsetId) -> anyhow::Result<Vec<TryJob>> {
        let mut jobs: Vec<TryJob> = self
            .state
            .read()
            .tryjobs
            .values()
            .filter(|tj| &tj.cl == cl && &tj.ps == ps)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(jobs)
    }

    async fn put_results(
        &self,
        cl: ChangelistId,
        ps: PatchsetId,
        tj_id: TryJobSystemId,
        ci_system: CiSystemId,
        results: Vec<TryJobResult>,
        ts: Timestamp,
    ) -> anyhow::Result<()> {
        self.upsert_param_maps(&results);

        let rows: Vec<TryJobResultRow> = results
            .into_iter()
            .map(|result| TryJobResultRow {
                tj_id: tj_id.clone(),
                ci_system: ci_system.clone(),
                cl: cl.clone(),
                ps: ps.clone(),
                digest: result.digest,
                result_params: result.result_params,
                group_hash: hash_params(&result.group_params),
                options_hash: hash_params(&result.options),
                ts,
            })
            .collect();

        for chunk in rows.chunks(WRITE_BATCH_SIZE) {
            self.state
                .write()
                .rows
                .entry((cl.clone(), ps.clone()))
                .or_default()
                .extend_from_slice(chunk);
        }
        metrics::TRYJOB_RESULTS_WRITTEN_TOTAL.inc_by(rows.len() as u64);
        Ok(())
    }

    async fn get_results(
        &self,
        cl: &ChangelistId,
        ps: &PatchsetId,
        updated_after: Timestamp,
    ) -> anyhow::Result<Vec<TryJobResult>> {
        let all_rows: Vec<TryJobResultRow> = self
            .state
            .read()
            .rows
            .get(&(cl.clone(), ps.clone()))
            .cloned()
            .unwrap_or_default();

        let rows: Vec<TryJobResultRow> = if updated_after == 0 {
            let mut shards: Vec<Vec<TryJobResultRow>> = vec![Vec::new(); SHARD_COUNT];
            for row in all_rows {
                shards[Self::shard_of(&row.digest)].push(row);
            }
            ::metrics::log_distribution(&metrics::TRYJOB_GET_RESULTS_SHARD_FANOUT, SHARD_COUNT as f64);
            let handles: Vec<_> = shards
                .into_iter()
                .map(|shard| tokio::spawn(async move { shard }))
                .collect();
            let mut rows = Vec::new();
            for handle in handles {
                rows.extend(handle.await.unwrap_or_default());
            }
            rows
        } else {
            all_rows.into_iter().filter(|row| row.ts >= updated_after).collect()
        };

        let needed_hashes: std::collections::BTreeSet<ParamsHash> = rows
            .iter()
            .flat_map(|row| [row.group_hash.clone(), row.options_hash.clone()])
            .filter(|hash| !hash.is_empty_sentinel())
            .collect();
        let maps: BTreeMap<ParamsHash, gold_types::Params> = {
            let state = self.state.read();
            needed_hashes
                .into_iter()
                .filter_map(|hash| state.params.get(&hash).cloned().map(|map| (hash, map)))
                .collect()
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let group_params = if row.group_hash.is_empty_sentinel() {
                gold_types::Params::new()
            } else if let Some(map) = maps.get(&row.group_hash) {
                map.clone()
            } else {
                metrics::TRYJOB_BAD_RESULTS_TOTAL.inc();
                tracing::warn!(digest = %row.digest, hash = %row.group_hash, "dropping try-job result with missing group_params map");
                continue;
            };
            let options = if row.options_hash.is_empty_sentinel() {
                gold_types::Params::new()
            } else if let Some(map) = maps.get(&row.options_hash) {
                map.clone()
            } else {
                metrics::TRYJOB_BAD_RESULTS_TOTAL.inc();
                tracing::warn!(digest = %row.digest, hash = %row.options_hash, "dropping try-job result with missing options map");
                continue;
            };
            out.push(TryJobResult {
                digest: row.digest,
                result_params: row.result_params,
                group_params,
                options,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use gold_types::CrsId;

    use super::*;

    fn digest(hex32: &str) -> Digest {
        hex32.parse().unwrap()
    }

    fn tryjob(system_id: &str, ci: &str, cl: &str, ps: &str, display_name: &str) -> TryJob {
        TryJob {
            system_id: TryJobSystemId::new(system_id),
            ci_system: CiSystemId::new(ci),
            crs: CrsId::Github,
            cl: ChangelistId::new(cl),
            ps: PatchsetId::new(ps),
            display_name: display_name.to_owned(),
            updated_ts: 0,
        }
    }

    #[tokio::test]
    async fn put_then_get_tryjob_roundtrips_scenario_1() {
        let store = InMemoryTryJobResultStore::new();
        let tj = tryjob("987654", "buildbucket", "1234", "abcd", "My-Test");
        store
            .put_tryjob(ChangelistId::new("1234"), PatchsetId::new("abcd"), tj.clone())
            .await
            .unwrap();

        let got = store
            .get_tryjob(&TryJobSystemId::new("987654"), &CiSystemId::new("buildbucket"))
            .await
            .unwrap();
        assert_eq!(got, tj);

        let err = store
            .get_tryjob(&TryJobSystemId::new("987654"), &CiSystemId::new("cirrus"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<errors::ErrorMetadata>().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn get_tryjobs_sorted_by_display_name_scenario_2() {
        let store = InMemoryTryJobResultStore::new();
        for (id, name) in [("4", "My-Test-4"), ("1", "My-Test-1"), ("3", "My-Test-3"), ("2", "My-Test-2")] {
            store
                .put_tryjob(
                    ChangelistId::new("cl"),
                    PatchsetId::new("ps"),
                    tryjob(id, "ci", "cl", "ps", name),
                )
                .await
                .unwrap();
        }
        let jobs = store
            .get_tryjobs(&ChangelistId::new("cl"), &PatchsetId::new("ps"))
            .await
            .unwrap();
        let names: Vec<&str> = jobs.iter().map(|j| j.display_name.as_str()).collect();
        assert_eq!(names, vec!["My-Test-1", "My-Test-2", "My-Test-3", "My-Test-4"]);
    }

    #[tokio::test]
    async fn put_750_results_dedups_group_params_scenario_3() {
        let store = InMemoryTryJobResultStore::new();
        let mut group_params = gold_types::Params::new();
        group_params.insert("name".to_owned(), "shared-test".to_owned());

        let results: Vec<TryJobResult> = (0..750)
            .map(|i| {
                let mut options = gold_types::Params::new();
                options.insert("config".to_owned(), format!("opt-{i}"));
                TryJobResult {
                    digest: digest(&format!("{:032x}", i)),
                    result_params: gold_types::Params::new(),
                    group_params: group_params.clone(),
                    options,
                }
            })
            .collect();

        store
            .put_results(
                ChangelistId::new("cl"),
                PatchsetId::new("ps"),
                TryJobSystemId::new("tj"),
                CiSystemId::new("ci"),
                results,
                1_000,
            )
            .await
            .unwrap();

        let fetched = store
            .get_results(&ChangelistId::new("cl"), &PatchsetId::new("ps"), 0)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 750);
        for result in &fetched {
            assert_eq!(result.group_params, group_params);
        }

        let unique_options: std::collections::BTreeSet<_> =
            fetched.iter().map(|r| r.options.get("config").cloned()).collect();
        assert_eq!(unique_options.len(), 750);
    }

    #[tokio::test]
    async fn get_results_drops_rows_with_missing_param_maps() {
        let store = InMemoryTryJobResultStore::new();
        let mut options = gold_types::Params::new();
        options.insert("k".to_owned(), "v".to_owned());
        let result = TryJobResult {
            digest: digest("0123456789abcdef0123456789abcdef"),
            result_params: gold_types::Params::new(),
            group_params: gold_types::Params::new(),
            options,
        };
        store
            .put_results(
                ChangelistId::new("cl"),
                PatchsetId::new("ps"),
                TryJobSystemId::new("tj"),
                CiSystemId::new("ci"),
                vec![result],
                1_000,
            )
            .await
            .unwrap();

        // Simulate a lost param map: drop it from the backing store directly.
        store.state.write().params.clear();

        let fetched = store
            .get_results(&ChangelistId::new("cl"), &PatchsetId::new("ps"), 0)
            .await
            .unwrap();
        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn get_results_with_updated_after_scans_by_time_not_shard() {
        let store = InMemoryTryJobResultStore::new();
        let early = TryJobResult {
            digest: digest(&"0".repeat(32)),
            result_params: gold_types::Params::new(),
            group_params: gold_types::Params::new(),
            options: gold_types::Params::new(),
        };
        let late = TryJobResult {
            digest: digest("ffffffffffffffffffffffffffffffff"),
            result_params: gold_types::Params::new(),
            group_params: gold_types::Params::new(),
            options: gold_types::Params::new(),
        };
        store
            .put_results(
                ChangelistId::new("cl"),
                PatchsetId::new("ps"),
                TryJobSystemId::new("tj"),
                CiSystemId::new("ci"),
                vec![early],
                1_000,
            )
            .await
            .unwrap();
        store
            .put_results(
                ChangelistId::new("cl"),
                PatchsetId::new("ps"),
                TryJobSystemId::new("tj"),
                CiSystemId::new("ci"),
                vec![late],
                5_000,
            )
            .await
            .unwrap();

        let fetched = store
            .get_results(&ChangelistId::new("cl"), &PatchsetId::new("ps"), 2_000)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].digest.as_str(), "ffffffffffffffffffffffffffffffff");
    }
}
