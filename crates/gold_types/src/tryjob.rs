use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    hashing::ParamsHash,
    paramset::Params,
    tile::Digest,
    Timestamp,
};

/// Code review system a changelist lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CrsId {
    Gerrit,
    Github,
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrsId::Gerrit => "gerrit",
            CrsId::Github => "github",
        };
        write!(f, "{s}")
    }
}

macro_rules! string_id {
    ($name:ident) => {
        #[derive(
            Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
        )]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(ChangelistId);
string_id!(PatchsetId);
string_id!(CiSystemId);
string_id!(TryJobSystemId);

/// A try-job run against one `(CRS, CL, PS)` triple. Upserted by the
/// composite key `(system_id, ci_system)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryJob {
    pub system_id: TryJobSystemId,
    pub ci_system: CiSystemId,
    pub crs: CrsId,
    pub cl: ChangelistId,
    pub ps: PatchsetId,
    pub display_name: String,
    pub updated_ts: Timestamp,
}

/// A single test result produced by a try-job, with its `group_params` and
/// `options` already resolved from the content-addressed param store (see
/// `tryjob_store`). `group_params`/`options` are large and highly repeated
/// across results from the same job, which is why the store keeps them
/// separate from this row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryJobResult {
    pub digest: Digest,
    pub result_params: Params,
    pub group_params: Params,
    pub options: Params,
}

/// The on-disk shape of a try-job result row before its maps are resolved:
/// references into the param store by content hash rather than the maps
/// themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryJobResultRow {
    pub tj_id: TryJobSystemId,
    pub ci_system: CiSystemId,
    pub cl: ChangelistId,
    pub ps: PatchsetId,
    pub digest: Digest,
    pub result_params: Params,
    pub group_hash: ParamsHash,
    pub options_hash: ParamsHash,
    pub ts: Timestamp,
}
