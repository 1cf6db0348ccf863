use std::sync::atomic::{AtomicU64, Ordering};

pub mod lock_manager;

pub type TransactionId = u64;

/// What a transaction intends to do with a page it requests
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

/// Hands out unique, increasing transaction ids
pub struct TransactionIds {
    next_tid: AtomicU64,
}

impl TransactionIds {
    pub fn new() -> Self {
        Self {
            next_tid: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> TransactionId {
        self.next_tid.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for TransactionIds {
    fn default() -> Self {
        Self::new()
    }
}
