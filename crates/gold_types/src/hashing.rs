use std::fmt;

use sha2::{
    Digest as _,
    Sha256,
};

use crate::paramset::Params;

/// The hex SHA-256 of a canonical flattening of a `group_params`/`options`
/// map, used as the content-addressed key for the try-job param store.
/// Stable across runs and independent of map insertion order. The empty map
/// hashes to the empty string sentinel rather than a real digest so that
/// "no options" never allocates a row.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ParamsHash(String);

impl ParamsHash {
    pub const EMPTY: &'static str = "";

    pub fn is_empty_sentinel(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ParamsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParamsHash({})", self.0)
    }
}

/// Canonically flatten `key1=value1,key2=value2,...` in sorted key order and
/// hash it. Maps with identical contents hash identically regardless of
/// insertion order, since `Params` is already key-sorted; empty maps hash to
/// the empty string rather than `sha256("")`.
pub fn hash_params(params: &Params) -> ParamsHash {
    if params.is_empty() {
        return ParamsHash(String::new());
    }
    let mut hasher = Sha256::new();
    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b",");
    }
    ParamsHash(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_map_hashes_to_empty_sentinel() {
        assert!(hash_params(&Params::new()).is_empty_sentinel());
    }

    #[test]
    fn hash_is_stable_and_order_independent() {
        let a = params(&[("a", "b"), ("e", "f"), ("0", "98"), ("c", "d")]);
        let b = params(&[("c", "d"), ("0", "98"), ("e", "f"), ("a", "b")]);
        let hash_a = hash_params(&a);
        let hash_b = hash_params(&b);
        assert_eq!(hash_a, hash_b);
        // Repeated calls are deterministic.
        for _ in 0..1000 {
            assert_eq!(hash_params(&a), hash_a);
        }
    }

    #[test]
    fn different_contents_hash_differently() {
        let a = params(&[("a", "b")]);
        let b = params(&[("a", "c")]);
        assert_ne!(hash_params(&a), hash_params(&b));
    }
}
