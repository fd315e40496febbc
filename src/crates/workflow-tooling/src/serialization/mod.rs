//! Stable hashing for deterministic sampling.
//!
//! `workflow_core::correlation::SamplingPolicy` buckets a run by hashing its
//! `RunId` and comparing the bucket against the configured sample rate — the
//! same run must always land in the same bucket, so the hash has to be
//! stable across calls (unlike `RandomState`-seeded `HashMap` hashing, which
//! varies per process).

use std::hash::{Hash, Hasher};

/// Generate a stable hash for a value, suitable for deterministic bucketing.
///
/// # Example
///
/// ```rust
/// use workflow_tooling::serialization::generate_hash;
///
/// let hash1 = generate_hash(&"run-123");
/// let hash2 = generate_hash(&"run-123");
/// assert_eq!(hash1, hash2);
/// ```
pub fn generate_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
