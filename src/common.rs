use std::fmt::Display;
use std::time::Duration;

pub type TableId = u32;
pub type PageNo = u32;
pub type Slot = u16;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_POOL_SIZE: usize = 50;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

pub const USER_DATA_TABLE_ID_START: TableId = 1;

/// Identifies a page by the table it belongs to and its position inside the table's file.
/// Page numbers start at 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: PageNo) -> Self {
        Self { table_id, page_no }
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.table_id, self.page_no)
    }
}

/// Stable location of a tuple: the page holding it and the slot inside that page.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: Slot,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: Slot) -> Self {
        Self { page_id, slot }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.page_id.table_id, self.page_id.page_no, self.slot
        )
    }
}

/// Tunables of a database instance.
#[derive(Clone, Debug, PartialEq)]
pub struct DbConfig {
    /// bytes per page, header included
    pub page_size: usize,
    /// how many pages the buffer pool caches at most
    pub pool_size: usize,
    /// how long a transaction waits for a page lock before it is aborted
    pub lock_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl DbConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}
