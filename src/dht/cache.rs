//! The relay-side result cache.
//!
//! A relay that sees a `success` reply pass through may keep the
//! (key,value) pair and answer later gets for the same key without
//! another trip around the ring. The cache holds at most `CACHE_SIZE`
//! pairs; the least recently touched pair is evicted.

use std::collections::{BTreeMap, HashMap};

use crate::CACHE_SIZE;

#[derive(Default)]
pub struct Cache {
    items: HashMap<String, (String, u64)>,
    recency: BTreeMap<u64, String>,
    clock: u64,
}

impl Cache {
    pub fn new() -> Cache {
        Cache {
            items: HashMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Insert a pair, evicting the least recently used pair when full.
    pub fn insert(&mut self, key: String, value: String) {
        self.clock += 1;
        if let Some(old) = self.items.insert(key.clone(), (value, self.clock)) {
            self.recency.remove(&old.1);
        }
        self.recency.insert(self.clock, key);

        if self.items.len() > CACHE_SIZE {
            let oldest = *self.recency.keys().next().unwrap();
            if let Some(key) = self.recency.remove(&oldest) {
                debug!("cache evicted {:?}", key);
                self.items.remove(&key);
            }
        }
    }

    /// Look up a key, refreshing its recency on a hit.
    pub fn get(&mut self, key: &str) -> Option<String> {
        self.clock += 1;
        let clock = self.clock;
        match self.items.get_mut(key) {
            Some(entry) => {
                self.recency.remove(&entry.1);
                entry.1 = clock;
                self.recency.insert(clock, key.to_string());
                Some(entry.0.clone())
            }
            None => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
