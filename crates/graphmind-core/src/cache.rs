//! Pair-verification cache (C3)
//!
//! Bounded map from a canonicalized pair hash to the LLM's verdict on
//! that pair. Canonicalization is order-independent so `(a, b)` and
//! `(b, a)` land on the same entry.

use crate::dedup::Verdict;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// `lru::LruCache` is not `Send + Sync` on its own interior mutability;
/// wrap it the way the teacher guards its SQLite connection — a
/// `Mutex` around the single mutable resource, shared via `Arc`.
pub struct PairCache {
    entries: Mutex<LruCache<u64, Verdict>>,
}

impl PairCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, text_a: &str, text_b: &str) -> Option<Verdict> {
        let key = pair_hash(text_a, text_b);
        self.entries.lock().ok()?.get(&key).copied()
    }

    pub fn put(&self, text_a: &str, text_b: &str, verdict: Verdict) {
        let key = pair_hash(text_a, text_b);
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, verdict);
        }
    }
}

fn canonicalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Order-independent pair hash: canonicalize both texts, always
/// concatenate the lexicographically smaller one first so `(a, b)`
/// and `(b, a)` hash identically.
fn pair_hash(text_a: &str, text_b: &str) -> u64 {
    use std::hash::{Hash, Hasher};

    let a = canonicalize(text_a);
    let b = canonicalize(text_b);
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    first.hash(&mut hasher);
    0u8.hash(&mut hasher); // separator so "ab"+"c" != "a"+"bc"
    second.hash(&mut hasher);
    hasher.finish()
}
