//! B-tree-shaped index: backed by `BTreeMap` for ordered range scans.
//! `IndexKey` gives `Value` a total order for this purpose only — the
//! predicate evaluator still uses `Value`'s partial order, which treats
//! cross-type comparisons as non-matches rather than ordering them.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::Index;
use crate::storage::page::RowId;
use crate::storage::Value;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexKey {
    rank: u8,
    int: i64,
    text: String,
    boolean: bool,
    date: chrono::NaiveDate,
}

impl IndexKey {
    fn from_value(v: &Value) -> Self {
        let base = Self { rank: 0, int: 0, text: String::new(), boolean: false, date: chrono::NaiveDate::MIN };
        match v {
            Value::Integer(i) => Self { rank: 0, int: *i, ..base },
            Value::Text(s) => Self { rank: 1, text: s.clone(), ..base },
            Value::Boolean(b) => Self { rank: 2, boolean: *b, ..base },
            Value::Date(d) => Self { rank: 3, date: *d, ..base },
            Value::Null => Self { rank: 4, ..base },
        }
    }
}

#[derive(Default)]
pub struct BTreeIndex {
    entries: BTreeMap<IndexKey, Vec<RowId>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl Index for BTreeIndex {
    fn insert(&mut self, key: Value, row: RowId) {
        self.entries.entry(IndexKey::from_value(&key)).or_default().push(row);
    }

    fn remove(&mut self, key: &Value, row: RowId) {
        if let Some(rows) = self.entries.get_mut(&IndexKey::from_value(key)) {
            rows.retain(|r| *r != row);
        }
    }

    fn lookup(&self, key: &Value) -> Vec<RowId> {
        self.entries.get(&IndexKey::from_value(key)).cloned().unwrap_or_default()
    }

    fn range(&self, low: Option<&Value>, high: Option<&Value>) -> Vec<RowId> {
        let lo = low.map(IndexKey::from_value).map(Bound::Included).unwrap_or(Bound::Unbounded);
        let hi = high.map(IndexKey::from_value).map(Bound::Included).unwrap_or(Bound::Unbounded);
        self.entries.range((lo, hi)).flat_map(|(_, rows)| rows.iter().copied()).collect()
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
    fn range_returns_keys_within_bounds_in_order() {
        let mut idx = BTreeIndex::new();
        idx.insert(Value::Integer(1), rid(0));
        idx.insert(Value::Integer(5), rid(1));
        idx.insert(Value::Integer(10), rid(2));
        let result = idx.range(Some(&Value::Integer(2)), Some(&Value::Integer(10)));
        assert_eq!(result, vec![rid(1), rid(2)]);
    }
}
