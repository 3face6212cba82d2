use std::hash::Hasher;

use twox_hash::XxHash64;

use super::Storable;

/// Maps a key to the 32-bit hash the extendible hash table routes on.
pub trait KeyHasher<K>: Send + Sync {
    fn hash(&self, key: &K) -> u32;
}

/// xxHash64 (seed 0) of the key's encoded bytes, truncated to the low 32 bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct XxKeyHasher;

impl<K: Storable> KeyHasher<K> for XxKeyHasher {
    fn hash(&self, key: &K) -> u32 {
        let mut h = XxHash64::with_seed(0);
        h.write(&key.to_bytes());
        h.finish() as u32
    }
}
