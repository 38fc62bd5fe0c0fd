//! Deterministic user bucketing.
//!
//! Percentage rollouts and A/B assignment both rely on the promise that the
//! same user always lands in the same 0-99 bucket. The bucket is derived
//! from an FNV-1a hash of the decimal form of the user id, so assignment is
//! reproducible across processes and platforms.

use featuregate_domain::constants::BUCKET_COUNT;

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// FNV-1a hash function for deterministic rollout
/// Returns a 64-bit hash value with good distribution properties
fn fnv1a_hash(s: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Map a user id to its rollout bucket (0..=99).
pub fn user_bucket(user_id: i64) -> u8 {
    (fnv1a_hash(&user_id.to_string()) % BUCKET_COUNT) as u8
}
