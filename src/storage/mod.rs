use crate::common::PageId;
use crate::concurrency::TransactionId;

pub(crate) mod codec;
pub mod heap;

/// What the buffer pool needs from a cached page, whatever its on-disk representation is.
pub trait Page {
    fn id(&self) -> PageId;

    /// Returns the transaction that last dirtied this page, or None if the page is clean
    fn is_dirty(&self) -> Option<TransactionId>;

    fn mark_dirty(&mut self, tid: TransactionId);

    fn mark_clean(&mut self);

    /// Serializes the page to exactly one page worth of bytes
    fn page_data(&self) -> Vec<u8>;
}
