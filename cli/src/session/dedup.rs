//! Rolling set of recently seen notification ids.

use std::collections::{HashSet, VecDeque};

use crate::constants::DEDUP_CAPACITY;

/// Remembers the last `capacity` ids; older ids are forgotten.
#[derive(Debug, Clone)]
pub struct SeenIds {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl Default for SeenIds {
    fn default() -> Self {
        Self::new(DEDUP_CAPACITY)
    }
}

impl SeenIds {
    /// Create an empty set holding at most `capacity` ids (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id`. Returns `true` if it was not already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }

        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }

    /// Whether `id` is currently remembered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }

    /// Number of remembered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.order.clear();
        self.set.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_is_rejected() {
        let mut seen = SeenIds::default();
        assert!(seen.insert("n1"));
        assert!(!seen.insert("n1"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_oldest_is_forgotten_past_capacity() {
        let mut seen = SeenIds::new(100);
        for i in 0..101 {
            assert!(seen.insert(&format!("n{i}")));
        }
        assert_eq!(seen.len(), 100);
        assert!(!seen.contains("n0"));
        assert!(seen.contains("n1"));
        assert!(seen.contains("n100"));

        // n0 was trimmed, so it is new again
        assert!(seen.insert("n0"));
    }

    #[test]
    fn test_clear() {
        let mut seen = SeenIds::new(3);
        seen.insert("a");
        seen.clear();
        assert!(seen.is_empty());
        assert!(seen.insert("a"));
    }
}
