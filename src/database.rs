use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;

use crate::buffer::buffer_pool::BufferPool;
use crate::catalog::Catalog;
use crate::common::{DbConfig, TableId};
use crate::concurrency::{TransactionId, TransactionIds};
use crate::error::Result;
use crate::storage::heap::file::HeapFileIterator;
use crate::tuple::schema::Schema;

/// A database instance: the catalog, the buffer pool in front of it and the transaction counter.
/// Everything that would otherwise be process-wide state lives here.
pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
    transaction_ids: TransactionIds,
}

impl Database {
    pub fn new(config: DbConfig) -> Self {
        let catalog = Arc::new(Catalog::new(config.page_size));
        let buffer_pool = BufferPool::new(Arc::clone(&catalog), &config);
        Self {
            config,
            catalog,
            buffer_pool,
            transaction_ids: TransactionIds::new(),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn create_table(
        &self,
        name: &str,
        schema: Schema,
        path: impl Into<PathBuf>,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        self.replacing_tables(|catalog| catalog.add_table(name, schema, path, primary_key))
    }

    /// Adds every table of a schema file, see [`Catalog::load_schema`]
    pub fn load_schema(&self, path: impl AsRef<Path>) -> Result<Vec<TableId>> {
        self.replacing_tables(|catalog| catalog.load_schema(path))
    }

    /// Runs a catalog change and drops the cached pages of tables it replaced
    fn replacing_tables<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&Catalog) -> Result<T>,
    {
        let before = self.catalog.table_ids();
        let result = change(&self.catalog);
        let after = self.catalog.table_ids().into_iter().collect::<HashSet<_>>();
        for table_id in before.into_iter().filter(|id| !after.contains(id)) {
            self.buffer_pool.discard_table(table_id);
        }
        result
    }

    pub fn begin(&self) -> TransactionId {
        self.transaction_ids.next()
    }

    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, true)
    }

    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, false)
    }

    pub fn scan(&self, tid: TransactionId, table_id: TableId) -> Result<HeapFileIterator<'_>> {
        self.buffer_pool.scan(tid, table_id)
    }

    /// Runs `f` in a fresh transaction. Commits if it succeeds, aborts and passes the error on otherwise.
    pub fn run_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(TransactionId) -> Result<T>,
    {
        let tid = self.begin();
        match f(tid) {
            Ok(value) => {
                self.commit(tid)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_error) = self.abort(tid) {
                    warn!("Aborting transaction {} failed: {}", tid, abort_error);
                }
                Err(e)
            }
        }
    }
}
