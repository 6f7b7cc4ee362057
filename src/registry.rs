//! Best-score-per-pair bookkeeping shared by both pipeline stages.

use std::collections::HashMap;

use crate::pairs::{PairKey, Scored};

/// Keeps at most one entry per [`PairKey`], the highest scoring one seen.
///
/// Entries keep the position of their first discovery, so iteration order
/// is deterministic for a deterministic scan.
#[derive(Debug, Clone)]
pub struct PairRegistry<T> {
    slots: HashMap<PairKey, usize>,
    entries: Vec<T>,
}

impl<T: Scored> PairRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Store `candidate` under `key` if the key is new or the candidate
    /// scores strictly higher than the stored entry.
    ///
    /// Returns `true` when the registry changed.
    pub fn upsert(&mut self, key: PairKey, candidate: T) -> bool {
        match self.slots.get(&key) {
            Some(&slot) => {
                if candidate.score() > self.entries[slot].score() {
                    self.entries[slot] = candidate;
                    true
                } else {
                    false
                }
            }
            None => {
                self.slots.insert(key, self.entries.len());
                self.entries.push(candidate);
                true
            }
        }
    }

    pub fn contains(&self, key: &PairKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained entries in discovery order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn into_values(self) -> Vec<T> {
        self.entries
    }
}

impl<T: Scored> Default for PairRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(&'static str, f64);

    impl Scored for Entry {
        fn score(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_upsert_new_key() {
        let mut registry = PairRegistry::new();
        assert!(registry.upsert(PairKey::new(1, 2), Entry("a", 0.4)));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&PairKey::new(2, 1)));
    }

    #[test]
    fn test_lower_score_never_replaces() {
        let mut registry = PairRegistry::new();
        registry.upsert(PairKey::new(1, 2), Entry("first", 0.8));

        assert!(!registry.upsert(PairKey::new(2, 1), Entry("lower", 0.3)));
        assert!(!registry.upsert(PairKey::new(1, 2), Entry("equal", 0.8)));

        assert_eq!(registry.len(), 1);
        let values: Vec<_> = registry.values().cloned().collect();
        assert_eq!(values, vec![Entry("first", 0.8)]);
    }

    #[test]
    fn test_higher_score_replaces_in_place() {
        let mut registry = PairRegistry::new();
        registry.upsert(PairKey::new(1, 2), Entry("a", 0.5));
        registry.upsert(PairKey::new(3, 4), Entry("b", 0.5));

        assert!(registry.upsert(PairKey::new(2, 1), Entry("a2", 0.9)));

        let values: Vec<_> = registry.values().cloned().collect();
        assert_eq!(values, vec![Entry("a2", 0.9), Entry("b", 0.5)]);
    }

    #[test]
    fn test_never_two_entries_per_key() {
        let mut registry = PairRegistry::new();
        for step in 0..50 {
            let score = (step % 7) as f64 / 10.0;
            registry.upsert(PairKey::new(step % 3, 10), Entry("x", score));
        }
        assert_eq!(registry.len(), 3);
        for value in registry.values() {
            assert!((value.1 - 0.6).abs() < f64::EPSILON);
        }
    }
}
