use std::io;

use thiserror::Error;

use crate::common::{PageId, PageNo, RecordId, TableId};
use crate::concurrency::TransactionId;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Transaction {tid} aborted: timed out waiting for a lock on page {page_id}")]
    TransactionAborted { tid: TransactionId, page_id: PageId },

    #[error("Page {0} has no empty slot")]
    PageFull(PageId),

    #[error("Tuple does not match the schema of page {0}")]
    SchemaMismatch(PageId),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Tuple at {0} is not stored on its page")]
    TupleNotOnPage(RecordId),

    #[error("Slot of {0} is out of range")]
    SlotOutOfRange(RecordId),

    #[error("Tuple belongs to table {actual}, expected table {expected}")]
    WrongTable { expected: TableId, actual: TableId },

    #[error("Page {page_id} is out of range, file has {num_pages} pages")]
    PageOutOfRange { page_id: PageId, num_pages: PageNo },

    #[error("Cannot evict a page: all resident pages are dirty or being written")]
    NoEvictablePage,

    #[error("Page {0} was fetched read-only")]
    ReadOnlyPage(PageId),

    #[error("Page {page_id} is corrupted: {reason}")]
    CorruptedPage { page_id: PageId, reason: String },

    #[error("File of table {table_id} has {size} bytes, which is not a multiple of the page size {page_size}")]
    InvalidFileSize {
        table_id: TableId,
        size: u64,
        page_size: usize,
    },

    #[error("No table with id {0}")]
    NoSuchTable(TableId),

    #[error("No table named {0}")]
    NoSuchTableName(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DbError {
    /// The caller's transaction lost a lock race and has to be rolled back and retried.
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, DbError::TransactionAborted { .. })
    }

    /// Structural or logical violation, surfaced as is and never retried internally.
    pub fn is_storage_error(&self) -> bool {
        !matches!(
            self,
            DbError::TransactionAborted { .. } | DbError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
