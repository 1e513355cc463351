//! # Partitioning
//!
//! Deterministic routing of destination keys to partitions. Every event for a
//! given key lands on the same partition worker, which is what allows each
//! worker to own its accumulator map and watermark without any locking.
//!
//! ## Usage
//!
//! ```rust
//! use hopcount::partitioning::{partition_for_key, PartitionKey};
//!
//! let key = PartitionKey::from("161");
//! let partition = partition_for_key(&key, 4);
//! assert!(partition < 4);
//! assert_eq!(partition, partition_for_key(&key, 4));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key that determines which partition handles a record.
///
/// For trip events this is the destination location id.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(pub String);

impl PartitionKey {
  /// Creates a new partition key from a string.
  pub fn new(s: String) -> Self {
    Self(s)
  }

  /// Returns the key as a string slice.
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Returns true if the key is the empty string.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<String> for PartitionKey {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for PartitionKey {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl fmt::Display for PartitionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// 64-bit FNV-1a hash of the key bytes.
///
/// Stable across processes and toolchains, unlike `DefaultHasher`.
pub fn hash_partition_key(key: impl AsRef<[u8]>) -> u64 {
  const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
  const PRIME: u64 = 0x100000001b3;
  key
    .as_ref()
    .iter()
    .fold(OFFSET_BASIS, |hash, byte| {
      (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Maps a key to a partition index in `0..partition_count`.
///
/// `partition_count` must be at least 1; configuration validation guarantees
/// this for the engine.
pub fn partition_for_key(key: &PartitionKey, partition_count: usize) -> usize {
  debug_assert!(partition_count > 0, "partition_count must be >= 1");
  let count = partition_count.max(1) as u64;
  (hash_partition_key(key.as_str()) % count) as usize
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partition_key_conversions() {
    let a = PartitionKey::from("42");
    let b = PartitionKey::from("42".to_string());
    assert_eq!(a, b);
    assert_eq!(a.as_str(), "42");
    assert_eq!(a.to_string(), "42");
    assert!(PartitionKey::new(String::new()).is_empty());
  }

  #[test]
  fn test_fnv1a_known_vectors() {
    // Reference values for 64-bit FNV-1a.
    assert_eq!(hash_partition_key(""), 0xcbf29ce484222325);
    assert_eq!(hash_partition_key("a"), 0xaf63dc4c8601ec8c);
  }

  #[test]
  fn test_partition_for_key_is_stable_and_in_range() {
    for i in 0..200 {
      let key = PartitionKey::from(i.to_string());
      let p = partition_for_key(&key, 7);
      assert!(p < 7);
      assert_eq!(p, partition_for_key(&key, 7));
    }
  }

  #[test]
  fn test_single_partition_owns_everything() {
    for key in ["a", "b", "zzz", ""] {
      assert_eq!(partition_for_key(&PartitionKey::from(key), 1), 0);
    }
  }

  #[test]
  fn test_keys_spread_over_partitions() {
    let mut seen = [false; 4];
    for i in 0..100 {
      seen[partition_for_key(&PartitionKey::from(i.to_string()), 4)] = true;
    }
    assert!(seen.iter().all(|s| *s));
  }
}
