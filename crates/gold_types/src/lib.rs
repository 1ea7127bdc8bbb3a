//! Value types shared by every layer of the indexing/triage core: commits,
//! digests, labels, groupings, traces, tiles, expectations, ignore rules and
//! try-job results. Nothing in here talks to storage; it's the vocabulary
//! the stores and the indexer pipeline are built out of.

pub mod commit;
pub mod expectation;
pub mod hashing;
pub mod ignore;
pub mod pagination;
pub mod paramset;
pub mod tile;
pub mod tryjob;

pub use commit::{
    Commit,
    CommitId,
    GitHash,
};
pub use expectation::{
    Branch,
    ExpectationDelta,
    ExpectationEntry,
    ExpectationKey,
    ExpectationRecord,
    Expectations,
    Label,
    RecordId,
};
pub use hashing::{
    hash_params,
    ParamsHash,
};
pub use ignore::{
    IgnoreRule,
    IgnoreRuleId,
};
pub use pagination::{
    Page,
    Paginated,
};
pub use paramset::{
    Grouping,
    ParamSet,
    Params,
};
pub use tile::{
    Digest,
    Tile,
    Trace,
    TraceId,
};
pub use tryjob::{
    ChangelistId,
    CiSystemId,
    CrsId,
    PatchsetId,
    TryJob,
    TryJobResult,
    TryJobResultRow,
    TryJobSystemId,
};

/// Milliseconds since the Unix epoch. A plain integer rather than
/// `SystemTime` so every type here stays `Copy`, `Ord`, and trivially
/// serializable across the store boundary.
pub type Timestamp = i64;
