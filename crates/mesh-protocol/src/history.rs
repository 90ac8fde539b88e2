use std::collections::VecDeque;

use serde_json::Value;

/// Fixed-capacity audit log of parsed payloads, oldest evicted first.
///
/// Diagnostics only. Nothing reads it to make a routing decision.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<Value>,
    capacity: usize,
}

impl HistoryBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, entry: Value) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter()
    }

    /// The last `n` entries, newest last.
    pub fn recent(&self, n: usize) -> Vec<Value> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn evicts_oldest() {
        let mut history = HistoryBuffer::new(3);
        for i in 0..5 {
            history.push(json!({ "n": i }));
        }
        assert_eq!(history.len(), 3);
        let ns: Vec<_> = history.iter().map(|v| v["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4]);
    }

    #[test]
    fn zero_capacity_clamped() {
        let mut history = HistoryBuffer::new(0);
        assert_eq!(history.capacity(), 1);
        history.push(json!(1));
        history.push(json!(2));
        assert_eq!(history.recent(10), vec![json!(2)]);
    }

    #[test]
    fn recent_returns_tail() {
        let mut history = HistoryBuffer::new(10);
        for i in 0..4 {
            history.push(json!(i));
        }
        assert_eq!(history.recent(2), vec![json!(2), json!(3)]);
        assert_eq!(history.recent(0), Vec::<Value>::new());
        assert_eq!(history.recent(100).len(), 4);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_and_keeps_latest(capacity in 1usize..64, pushes in 0usize..200) {
            let mut history = HistoryBuffer::new(capacity);
            for i in 0..pushes {
                history.push(json!(i));
            }
            prop_assert_eq!(history.len(), pushes.min(capacity));
            if pushes > 0 {
                let newest = history.iter().last().and_then(Value::as_u64);
                prop_assert_eq!(newest, Some(pushes as u64 - 1));
                let oldest = history.iter().next().and_then(Value::as_u64);
                prop_assert_eq!(oldest, Some(pushes.saturating_sub(capacity) as u64));
            }
        }
    }
}
