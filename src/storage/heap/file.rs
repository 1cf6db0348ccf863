use std::fs::{File, OpenOptions};
use std::os::unix::prelude::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use super::page::{num_slots, HeapPage};
use crate::buffer::buffer_pool::{BufferPool, PageHandle};
use crate::common::{PageId, PageNo, TableId};
use crate::concurrency::{Permission, TransactionId};
use crate::error::{DbError, Result};
use crate::storage::Page;
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;

/// A table stored as an unordered sequence of fixed-size pages in a single file.
/// Page `n` starts at byte offset `n * page_size`.
pub struct HeapFile {
    table_id: TableId,
    path: PathBuf,
    file: File,
    filesize: AtomicU64,
    // serializes writes that grow the file, the size is only bumped once the page is on disk
    append_lock: Mutex<()>,
    schema: Arc<Schema>,
    page_size: usize,
}

impl HeapFile {
    /// Opens the file at `path`, creating an empty one if it does not exist yet.
    /// Fails if the file size is not a multiple of the page size.
    pub fn open(
        path: impl Into<PathBuf>,
        table_id: TableId,
        schema: Arc<Schema>,
        page_size: usize,
    ) -> Result<Self> {
        if num_slots(page_size, schema.tuple_size()) == 0 {
            return Err(DbError::InvalidSchema(format!(
                "a tuple of {} bytes does not fit into a page of {} bytes",
                schema.tuple_size(),
                page_size
            )));
        }

        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        if size % page_size as u64 != 0 {
            return Err(DbError::InvalidFileSize {
                table_id,
                size,
                page_size,
            });
        }
        debug!(
            "Opened {} for table {} with {} pages",
            path.display(),
            table_id,
            size / page_size as u64
        );

        Ok(Self {
            table_id,
            path,
            file,
            filesize: AtomicU64::new(size),
            append_lock: Mutex::new(()),
            schema,
            page_size,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> PageNo {
        (self.filesize.load(Ordering::Acquire) / self.page_size as u64) as PageNo
    }

    /// Reads a page straight from disk, bypassing the buffer pool.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        self.check_table(page_id)?;
        let num_pages = self.num_pages();
        if page_id.page_no >= num_pages {
            return Err(DbError::PageOutOfRange { page_id, num_pages });
        }

        let mut buffer = vec![0u8; self.page_size];
        self.file
            .read_exact_at(&mut buffer, self.offset(page_id.page_no))?;
        HeapPage::new(page_id, &buffer, Arc::clone(&self.schema))
    }

    /// Writes a page at its position in the file. A page directly behind the last one extends the file.
    pub fn write_page(&self, page: &impl Page) -> Result<()> {
        let page_id = page.id();
        self.check_table(page_id)?;
        let num_pages = self.num_pages();
        if page_id.page_no < num_pages {
            return self.write_at(self.offset(page_id.page_no), &page.page_data());
        }

        let _append = self.append_lock.lock().unwrap();
        let num_pages = self.num_pages();
        if page_id.page_no > num_pages {
            return Err(DbError::PageOutOfRange { page_id, num_pages });
        }
        let offset = self.offset(page_id.page_no);
        self.write_at(offset, &page.page_data())?;
        self.filesize
            .fetch_max(offset + self.page_size as u64, Ordering::Release);

        Ok(())
    }

    /// Appends an empty page and returns its page number.
    pub fn allocate_page(&self) -> Result<PageNo> {
        let _append = self.append_lock.lock().unwrap();
        let offset = self.filesize.load(Ordering::Acquire);
        self.write_at(offset, &HeapPage::empty_page_data(self.page_size))?;
        self.filesize
            .store(offset + self.page_size as u64, Ordering::Release);
        let page_no = (offset / self.page_size as u64) as PageNo;
        debug!("Allocated page {} of table {}", page_no, self.table_id);
        Ok(page_no)
    }

    /// Stores the tuple on the first page with a free slot, appending a page if every page is full.
    /// Returns the pages that were modified, the caller is responsible for marking them dirty.
    pub fn insert_tuple(
        &self,
        buffer_pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageHandle>> {
        if !self.schema.is_compatible(tuple.schema()) {
            return Err(DbError::SchemaMismatch(PageId::new(self.table_id, 0)));
        }

        let mut page_no = 0;
        loop {
            while page_no < self.num_pages() {
                let page_id = PageId::new(self.table_id, page_no);
                let held_before = buffer_pool.holds_lock(tid, page_id);
                let handle = buffer_pool.get_page(tid, page_id, Permission::ReadWrite)?;

                let has_room = handle.read().num_empty_slots() > 0;
                if has_room {
                    handle.write()?.insert_tuple(tuple)?;
                    return Ok(vec![handle]);
                }

                drop(handle);
                if !held_before {
                    // nothing was read or changed, the lock only served the scan
                    buffer_pool.release_page(tid, page_id);
                }
                page_no += 1;
            }
            // another transaction may fill the new page first, so it is scanned like any other
            self.allocate_page()?;
        }
    }

    /// Removes the tuple from the page its record id points to.
    /// Returns the pages that were modified.
    pub fn delete_tuple(
        &self,
        buffer_pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageHandle>> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let page_id = record_id.page_id;
        self.check_table(page_id)?;
        let num_pages = self.num_pages();
        if page_id.page_no >= num_pages {
            return Err(DbError::PageOutOfRange { page_id, num_pages });
        }

        let handle = buffer_pool.get_page(tid, page_id, Permission::ReadWrite)?;
        handle.write()?.delete_tuple(tuple)?;
        Ok(vec![handle])
    }

    fn check_table(&self, page_id: PageId) -> Result<()> {
        if page_id.table_id != self.table_id {
            return Err(DbError::WrongTable {
                expected: self.table_id,
                actual: page_id.table_id,
            });
        }
        Ok(())
    }

    fn offset(&self, page_no: PageNo) -> u64 {
        page_no as u64 * self.page_size as u64
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.write_all_at(data, offset)?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Iterates over all tuples of a heap file in page order, then slot order.
/// Pages are fetched read-only through the buffer pool on behalf of `tid`.
pub struct HeapFileIterator<'a> {
    file: Arc<HeapFile>,
    buffer_pool: &'a BufferPool,
    tid: TransactionId,
    next_page_no: PageNo,
    current: std::vec::IntoIter<Tuple>,
}

impl<'a> HeapFileIterator<'a> {
    pub fn new(file: Arc<HeapFile>, buffer_pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            buffer_pool,
            tid,
            next_page_no: 0,
            current: Vec::new().into_iter(),
        }
    }

    /// Restarts the scan at the first page
    pub fn rewind(&mut self) {
        self.next_page_no = 0;
        self.current = Vec::new().into_iter();
    }

    fn fetch_next_tuple(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Ok(Some(tuple));
            }
            // pages appended during the scan are visited as well
            if self.next_page_no >= self.file.num_pages() {
                return Ok(None);
            }

            let page_id = PageId::new(self.file.table_id(), self.next_page_no);
            let handle = self
                .buffer_pool
                .get_page(self.tid, page_id, Permission::ReadOnly)?;
            let tuples = handle.read().iter().cloned().collect::<Vec<_>>();
            self.current = tuples.into_iter();
            self.next_page_no += 1;
        }
    }
}

impl<'a> Iterator for HeapFileIterator<'a> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_next_tuple().transpose()
    }
}
