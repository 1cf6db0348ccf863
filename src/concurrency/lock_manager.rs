use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::{Permission, TransactionId};
use crate::common::PageId;
use crate::error::{DbError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl From<Permission> for LockMode {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// The locks currently granted on one page
type Holders = HashMap<TransactionId, LockMode>;

/// Grants shared and exclusive page locks to transactions.
///
/// A page is either unlocked, exclusively locked by one transaction or shared locked by
/// any number of transactions. A transaction which is the only holder of a shared lock
/// can upgrade it in place. Locks are not queued, waiting transactions are woken up whenever
/// a lock is released and retry until their timeout expires.
pub struct LockManager {
    lock_table: Mutex<HashMap<PageId, Holders>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            lock_table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Tries to grant the lock without waiting. Returns true if the lock is held afterwards.
    pub fn acquire(&self, page_id: PageId, tid: TransactionId, mode: LockMode) -> bool {
        let mut lock_table = self.lock_table.lock().unwrap();
        try_grant(&mut lock_table, page_id, tid, mode)
    }

    /// Acquires the lock, waiting at most `timeout` for conflicting locks to be released.
    /// If the lock cannot be granted in time, the transaction has to be aborted.
    pub fn lock(
        &self,
        page_id: PageId,
        tid: TransactionId,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut lock_table = self.lock_table.lock().unwrap();
        loop {
            if try_grant(&mut lock_table, page_id, tid, mode) {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Transaction {} timed out waiting for {:?} lock on page {}",
                    tid, mode, page_id
                );
                return Err(DbError::TransactionAborted { tid, page_id });
            }
            lock_table = self.wait(lock_table, deadline - now);
        }
    }

    fn wait<'a>(
        &self,
        lock_table: MutexGuard<'a, HashMap<PageId, Holders>>,
        timeout: Duration,
    ) -> MutexGuard<'a, HashMap<PageId, Holders>> {
        let (lock_table, _) = self.released.wait_timeout(lock_table, timeout).unwrap();
        lock_table
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    /// Returns the mode in which `tid` holds a lock on the page, if it holds one at all
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        let lock_table = self.lock_table.lock().unwrap();
        lock_table
            .get(&page_id)
            .and_then(|holders| holders.get(&tid).copied())
    }

    /// Releases the lock `tid` holds on a page. Returns false if there was none.
    pub fn release(&self, tid: TransactionId, page_id: PageId) -> bool {
        let mut lock_table = self.lock_table.lock().unwrap();
        let released = remove_holder(&mut lock_table, tid, page_id);
        drop(lock_table);

        if released {
            self.released.notify_all();
        }
        released
    }

    /// Releases every lock held by `tid`, used when a transaction ends.
    pub fn release_all(&self, tid: TransactionId) {
        let mut lock_table = self.lock_table.lock().unwrap();
        let page_ids = lock_table.keys().copied().collect::<Vec<_>>();
        let mut released = 0;
        for page_id in page_ids {
            if remove_holder(&mut lock_table, tid, page_id) {
                released += 1;
            }
        }
        drop(lock_table);

        debug!("Released {} locks of transaction {}", released, tid);
        if released > 0 {
            self.released.notify_all();
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

fn try_grant(
    lock_table: &mut HashMap<PageId, Holders>,
    page_id: PageId,
    tid: TransactionId,
    mode: LockMode,
) -> bool {
    let holders = lock_table.entry(page_id).or_default();
    let granted = match (holders.get(&tid).copied(), mode) {
        // already at the strongest mode
        (Some(LockMode::Exclusive), _) => true,
        (Some(LockMode::Shared), LockMode::Shared) => true,
        // upgrade in place, only possible as the sole holder
        (Some(LockMode::Shared), LockMode::Exclusive) => {
            if holders.len() == 1 {
                holders.insert(tid, LockMode::Exclusive);
                true
            } else {
                false
            }
        }
        (None, LockMode::Exclusive) => {
            if holders.is_empty() {
                holders.insert(tid, LockMode::Exclusive);
                true
            } else {
                false
            }
        }
        (None, LockMode::Shared) => {
            if holders.values().all(|held| *held == LockMode::Shared) {
                holders.insert(tid, LockMode::Shared);
                true
            } else {
                false
            }
        }
    };
    if holders.is_empty() {
        lock_table.remove(&page_id);
    }

    debug!(
        "{:?} lock on page {} for transaction {}: {}",
        mode,
        page_id,
        tid,
        if granted { "granted" } else { "denied" }
    );
    granted
}

fn remove_holder(
    lock_table: &mut HashMap<PageId, Holders>,
    tid: TransactionId,
    page_id: PageId,
) -> bool {
    match lock_table.get_mut(&page_id) {
        Some(holders) => {
            let removed = holders.remove(&tid).is_some();
            if holders.is_empty() {
                lock_table.remove(&page_id);
            }
            removed
        }
        None => false,
    }
}
