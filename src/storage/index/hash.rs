//! Hash index: O(1) equality lookups, no range support.

use std::collections::HashMap;

use super::Index;
use crate::storage::page::RowId;
use crate::storage::Value;

#[derive(Default)]
pub struct HashIndex {
    buckets: HashMap<Value, Vec<RowId>>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self { buckets: HashMap::new() }
    }
}

impl Index for HashIndex {
    fn insert(&mut self, key: Value, row: RowId) {
        self.buckets.entry(key).or_default().push(row);
    }

    fn remove(&mut self, key: &Value, row: RowId) {
        if let Some(rows) = self.buckets.get_mut(key) {
            rows.retain(|r| *r != row);
        }
    }

    fn lookup(&self, key: &Value) -> Vec<RowId> {
        self.buckets.get(key).cloned().unwrap_or_default()
    }

    fn range(&self, _low: Option<&Value>, _high: Option<&Value>) -> Vec<RowId> {
        // No ordering among buckets; a range scan degrades to visiting
        // every row, which the caller re-filters against the predicate.
        self.buckets.values().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::{PageId, SlotId};

    fn rid(n: u32) -> RowId {
        RowId { page: PageId(0), slot: SlotId(n) }
    }

    #[test]
    fn lookup_finds_inserted_rows_and_ignores_removed_ones() {
        let mut idx = HashIndex::new();
        idx.insert(Value::Integer(5), rid(0));
        idx.insert(Value::Integer(5), rid(1));
        idx.remove(&Value::Integer(5), rid(0));
        assert_eq!(idx.lookup(&Value::Integer(5)), vec![rid(1)]);
    }
}
