//! A hash map split into independently locked shards.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hash, Hasher};

use parking_lot::RwLock;
use xxhash_rust::xxh3::Xxh3;

type Shard<K, V> = RwLock<HashMap<K, V, BuildHasherDefault<Xxh3>>>;

/// A concurrent hash map made of `2^BITS` shards, each protected by its own reader/writer lock.
///
/// Operations on keys which land in different shards never contend. Values are cloned out of the
/// map so no lock is ever held once a function returns.
pub struct ConcurrentMap<K, V, const BITS: u32 = 6> {
    shards: Box<[Shard<K, V>]>,
}

impl<K: Eq + Hash, V, const BITS: u32> ConcurrentMap<K, V, BITS> {
    const SHARD_COUNT: usize = 1usize << BITS;

    pub fn new() -> Self {
        let shards: Vec<_> = (0..Self::SHARD_COUNT).map(|_| RwLock::new(HashMap::default())).collect();

        Self {
            shards: shards.into_boxed_slice(),
        }
    }

    fn shard(&self, key: &K) -> &Shard<K, V> {
        let mut hasher = Xxh3::new();
        key.hash(&mut hasher);
        // The inner maps consume the low bits of the same hash so pick the shard from the high bits
        let index = (hasher.finish() >> (64 - BITS.max(1))) as usize & (Self::SHARD_COUNT - 1);
        &self.shards[index]
    }

    /// Inserts a value, replacing and returning any previous value stored for the key.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.shard(&key).write().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Returns the number of entries. The result is only a snapshot if other threads are
    /// modifying the map.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Retains only the entries for which `f` returns true. Each shard is locked in turn.
    pub fn retain<F: FnMut(&K, &mut V) -> bool>(&self, mut f: F) {
        for shard in self.shards.iter() {
            shard.write().retain(|key, value| f(key, value));
        }
    }
}

impl<K: Eq + Hash, V: Clone, const BITS: u32> ConcurrentMap<K, V, BITS> {
    /// Returns a clone of the value stored for the key.
    pub fn get(&self, key: &K) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }
}

impl<K: Eq + Hash, V, const BITS: u32> Default for ConcurrentMap<K, V, BITS> {
    fn default() -> Self {
        Self::new()
    }
}
