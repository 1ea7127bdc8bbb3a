use std::{
    fmt,
    ops::Deref,
    str::FromStr,
};

use anyhow::Context;
use serde::{
    Deserialize,
    Serialize,
};

use crate::Timestamp;

/// Commit ids are assigned strictly in history order starting at this
/// anchor, leaving room below it for commits from before the tracked
/// history began. See the Gitiles Follower.
pub const COMMIT_ID_ANCHOR: u64 = 1_000_000_000;

/// A 12-digit, zero-padded, monotonically increasing commit id. Lexicographic
/// order on the zero-padded string equals numeric order, which is what lets
/// every other layer compare commit ids with a plain string/byte comparison.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitId(u64);

impl CommitId {
    pub const ANCHOR: CommitId = CommitId(COMMIT_ID_ANCHOR);

    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012}", self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self)
    }
}

impl FromStr for CommitId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        anyhow::ensure!(
            s.len() == 12 && s.bytes().all(|b| b.is_ascii_digit()),
            "commit id {s:?} must be 12 ASCII digits"
        );
        Ok(Self(s.parse().context("commit id didn't fit in a u64")?))
    }
}

/// A git commit hash, opaque outside of the gitiles follower and the commit
/// table's primary key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display)]
pub struct GitHash(String);

impl GitHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }
}

impl fmt::Debug for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitHash({})", self.0)
    }
}

impl Deref for GitHash {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<GitHash> for String {
    fn from(h: GitHash) -> Self {
        h.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub hash: GitHash,
    pub timestamp: Timestamp,
    pub author: String,
    pub subject: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_id_roundtrips_through_display() {
        let id = CommitId::new(COMMIT_ID_ANCHOR + 41);
        let rendered = id.to_string();
        assert_eq!(rendered.len(), 12);
        assert_eq!(rendered.parse::<CommitId>().unwrap(), id);
    }

    #[test]
    fn lexicographic_order_matches_numeric_order() {
        let a = CommitId::new(COMMIT_ID_ANCHOR + 1);
        let b = CommitId::new(COMMIT_ID_ANCHOR + 2);
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn rejects_wrong_width() {
        assert!("123".parse::<CommitId>().is_err());
        assert!("12345678901234".parse::<CommitId>().is_err());
    }
}
