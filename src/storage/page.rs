//! Fixed-size on-disk page: a length-prefixed bincode blob of row slots,
//! zero-padded to `page_size`. Deleted rows leave a `None` slot behind so
//! slot ids stay stable until the page is rewritten.

use crate::error::{DbError, DbResult};
use crate::storage::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page: PageId,
    pub slot: SlotId,
}

const LEN_PREFIX_BYTES: usize = 8;

#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    rows: Vec<Option<Row>>,
}

impl Page {
    pub fn new(id: PageId) -> Self {
        Self { id, rows: Vec::new() }
    }

    pub fn insert(&mut self, row: Row) -> SlotId {
        if let Some(idx) = self.rows.iter().position(Option::is_none) {
            self.rows[idx] = Some(row);
            SlotId(idx as u32)
        } else {
            self.rows.push(Some(row));
            SlotId((self.rows.len() - 1) as u32)
        }
    }

    pub fn get(&self, slot: SlotId) -> Option<&Row> {
        self.rows.get(slot.0 as usize).and_then(Option::as_ref)
    }

    pub fn update(&mut self, slot: SlotId, row: Row) -> bool {
        match self.rows.get_mut(slot.0 as usize) {
            Some(existing @ Some(_)) => {
                *existing = Some(row);
                true
            }
            _ => false,
        }
    }

    pub fn delete(&mut self, slot: SlotId) -> bool {
        match self.rows.get_mut(slot.0 as usize) {
            Some(existing @ Some(_)) => {
                *existing = None;
                true
            }
            _ => false,
        }
    }

    pub fn occupied(&self) -> impl Iterator<Item = (SlotId, &Row)> {
        self.rows.iter().enumerate().filter_map(|(i, r)| r.as_ref().map(|row| (SlotId(i as u32), row)))
    }

    pub fn row_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    pub fn to_bytes(&self, page_size: usize) -> DbResult<Vec<u8>> {
        let payload = bincode::serialize(&self.rows)?;
        if payload.len() + LEN_PREFIX_BYTES > page_size {
            return Err(DbError::Storage(format!(
                "page {} overflow: {} bytes exceeds page_size {page_size}",
                self.id.0,
                payload.len() + LEN_PREFIX_BYTES
            )));
        }
        let mut buf = vec![0u8; page_size];
        buf[..LEN_PREFIX_BYTES].copy_from_slice(&(payload.len() as u64).to_le_bytes());
        buf[LEN_PREFIX_BYTES..LEN_PREFIX_BYTES + payload.len()].copy_from_slice(&payload);
        Ok(buf)
    }

    pub fn from_bytes(id: PageId, buf: &[u8]) -> DbResult<Self> {
        if buf.len() < LEN_PREFIX_BYTES {
            return Err(DbError::Storage(format!("page {} buffer too small", id.0)));
        }
        let len = u64::from_le_bytes(buf[..LEN_PREFIX_BYTES].try_into().unwrap()) as usize;
        let end = LEN_PREFIX_BYTES + len;
        if end > buf.len() {
            return Err(DbError::Storage(format!("page {} length prefix out of bounds", id.0)));
        }
        let rows: Vec<Option<Row>> = bincode::deserialize(&buf[LEN_PREFIX_BYTES..end])?;
        Ok(Self { id, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    fn row(n: i64) -> Row {
        vec![("n".to_string(), Value::Integer(n))]
    }

    #[test]
    fn insert_get_delete_reuses_slot() {
        let mut page = Page::new(PageId(0));
        let s0 = page.insert(row(1));
        let s1 = page.insert(row(2));
        assert_eq!(page.row_count(), 2);
        assert!(page.delete(s0));
        assert_eq!(page.row_count(), 1);
        let s2 = page.insert(row(3));
        assert_eq!(s2, s0);
        assert_eq!(page.get(s1).unwrap()[0].1, Value::Integer(2));
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut page = Page::new(PageId(7));
        page.insert(row(42));
        let bytes = page.to_bytes(4096).unwrap();
        assert_eq!(bytes.len(), 4096);
        let restored = Page::from_bytes(PageId(7), &bytes).unwrap();
        assert_eq!(restored.row_count(), 1);
    }

    #[test]
    fn overflow_is_rejected() {
        let mut page = Page::new(PageId(0));
        for i in 0..10_000 {
            page.insert(vec![("n".to_string(), Value::Text("x".repeat(100) + &i.to_string()))]);
        }
        assert!(page.to_bytes(4096).is_err());
    }
}
