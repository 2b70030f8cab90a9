//! Column-keyed store over `kvdb`, used by both the trie (§4.1) and the
//! typed block/state layers (§4.2). One `Db` instance backs one fork's
//! namespace (spec.md §4.2 "each fork owns a dedicated trie namespace").

pub mod columns;

pub use columns::{Column, NUM_COLUMNS, PREFIX_EXT_KV, PREFIX_TRIE_NODE};

use chain_types::Result as ChainResult;
use kvdb::{DBTransaction, KeyValueDB};
use std::path::Path;
use std::sync::Arc;

/// A batch of column writes, applied atomically by [`Db::write`].
pub type Batch = DBTransaction;

/// Thin, column-aware wrapper over a `kvdb::KeyValueDB` backend.
#[derive(Clone)]
pub struct Db {
    backing: Arc<dyn KeyValueDB>,
}

impl Db {
    fn new(backing: Arc<dyn KeyValueDB>) -> Self {
        Db { backing }
    }

    /// In-memory backend, used for trial-run execution and tests
    /// (spec.md §4.1 "staged" caching mode).
    pub fn in_memory() -> Self {
        Db::new(Arc::new(kvdb_memorydb::create(NUM_COLUMNS)))
    }

    /// Disk-backed backend for a fork's namespace (spec.md §4.2).
    pub fn open_rocksdb(path: &Path) -> ChainResult<Self> {
        let config = kvdb_rocksdb::DatabaseConfig::with_columns(NUM_COLUMNS);
        let database = kvdb_rocksdb::Database::open(&config, path.to_string_lossy().as_ref())
            .map_err(|e| chain_types::Error::IoError(e.to_string()))?;
        Ok(Db::new(Arc::new(database)))
    }

    pub fn get(&self, col: Column, key: &[u8]) -> ChainResult<Option<Vec<u8>>> {
        self.backing
            .get(col.id(), key)
            .map(|v| v.map(|v| v.into_vec()))
            .map_err(|e| chain_types::Error::IoError(e.to_string()))
    }

    pub fn get_by_prefix(&self, col: Column, prefix: &[u8]) -> ChainResult<Option<Vec<u8>>> {
        Ok(self
            .backing
            .get_by_prefix(col.id(), prefix)
            .map(|v| v.into_vec()))
    }

    pub fn new_batch(&self) -> Batch {
        self.backing.transaction()
    }

    pub fn write(&self, batch: Batch) -> ChainResult<()> {
        self.backing
            .write(batch)
            .map_err(|e| chain_types::Error::IoError(e.to_string()))
    }

    /// Iterates every `(key, value)` pair in a column, in key order
    /// (backs the trie's `walk` operation, spec.md §4.1).
    pub fn iter(&self, col: Column) -> impl Iterator<Item = (Box<[u8]>, Box<[u8]>)> + '_ {
        self.backing.iter(col.id())
    }

    pub fn iter_with_prefix<'a>(
        &'a self,
        col: Column,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (Box<[u8]>, Box<[u8]>)> + 'a {
        self.backing.iter_with_prefix(col.id(), prefix)
    }

    pub fn flush(&self) -> ChainResult<()> {
        self.backing
            .flush()
            .map_err(|e| chain_types::Error::IoError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value_through_a_batch() {
        let db = Db::in_memory();
        let mut batch = db.new_batch();
        batch.put(Column::State.id(), b"k", b"v");
        db.write(batch).unwrap();
        assert_eq!(db.get(Column::State, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn columns_are_isolated() {
        let db = Db::in_memory();
        let mut batch = db.new_batch();
        batch.put(Column::State.id(), b"k", b"state-value");
        db.write(batch).unwrap();
        assert_eq!(db.get(Column::Code, b"k").unwrap(), None);
    }
}
