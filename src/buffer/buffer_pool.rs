use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, info, warn};

use super::page_cache::PageCache;
use super::Frame;
use crate::catalog::Catalog;
use crate::common::{DbConfig, PageId, RecordId, TableId};
use crate::concurrency::lock_manager::LockManager;
use crate::concurrency::{Permission, TransactionId};
use crate::error::{DbError, Result};
use crate::storage::heap::file::HeapFileIterator;
use crate::storage::heap::page::HeapPage;
use crate::storage::Page;
use crate::tuple::Tuple;

/// A page handed out by the buffer pool.
///
/// A clean page may be evicted while a handle to it lives, the handle then keeps the evicted copy.
/// Modifications reported through [`BufferPool::insert_tuple`] or [`BufferPool::delete_tuple`]
/// put that copy back into the pool.
pub struct PageHandle {
    page_id: PageId,
    permission: Permission,
    frame: Frame,
}

impl PageHandle {
    pub fn id(&self) -> PageId {
        self.page_id
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn read(&self) -> RwLockReadGuard<HeapPage> {
        self.frame.read().unwrap()
    }

    /// Fails if the page was fetched read-only
    pub fn write(&self) -> Result<RwLockWriteGuard<HeapPage>> {
        match self.permission {
            Permission::ReadWrite => Ok(self.frame.write().unwrap()),
            Permission::ReadOnly => Err(DbError::ReadOnlyPage(self.page_id)),
        }
    }

    /// Whether both handles refer to the same cached page instance
    pub fn is_same_page(&self, other: &PageHandle) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame)
    }
}

/// BufferPool caches a bounded number of pages and is the only way transactions reach them.
///
/// Every page access first takes a page lock on behalf of the transaction, locks are held until
/// the transaction completes. Pages dirtied by a running transaction are never written back
/// before it commits, so a full pool of dirty pages makes further page loads fail.
pub struct BufferPool {
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    pages: Mutex<PageCache>,
    pool_size: usize,
    lock_timeout: Duration,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, config: &DbConfig) -> Self {
        Self {
            catalog,
            lock_manager: LockManager::new(),
            pages: Mutex::new(PageCache::new()),
            pool_size: config.pool_size,
            lock_timeout: config.lock_timeout,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Locks the page for `tid` and returns it, reading it from disk if it is not resident.
    ///
    /// Waits for conflicting locks at most for the configured lock timeout, after which the
    /// transaction is considered aborted. Fails if the page has to be loaded but every resident
    /// page is dirty or currently being written.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> Result<PageHandle> {
        self.lock_manager
            .lock(page_id, tid, permission.into(), self.lock_timeout)?;

        let frame = self.fetch_frame(page_id)?;
        Ok(PageHandle {
            page_id,
            permission,
            frame,
        })
    }

    /// Gives up the lock of `tid` on a page before the transaction completes
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.lock_manager.release(tid, page_id);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(tid, page_id)
    }

    /// Adds the tuple to the table on behalf of `tid` and returns where it was stored.
    /// The tuple's record id is updated as well.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<RecordId> {
        let file = self.catalog.get_file(table_id)?;
        let dirtied = file.insert_tuple(self, tid, tuple)?;
        self.mark_dirtied(tid, dirtied)?;
        tuple.record_id().ok_or(DbError::MissingRecordId)
    }

    /// Removes the tuple from the table its record id points into
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.get_file(record_id.page_id.table_id)?;
        let dirtied = file.delete_tuple(self, tid, tuple)?;
        self.mark_dirtied(tid, dirtied)
    }

    /// Scans all tuples of a table on behalf of `tid`
    pub fn scan(&self, tid: TransactionId, table_id: TableId) -> Result<HeapFileIterator<'_>> {
        let file = self.catalog.get_file(table_id)?;
        Ok(HeapFileIterator::new(file, self, tid))
    }

    /// Commits the transaction
    pub fn transaction_complete_commit(&self, tid: TransactionId) -> Result<()> {
        self.transaction_complete(tid, true)
    }

    /// Ends the transaction. On commit its dirty pages are written to disk, on abort they are
    /// replaced by their on-disk version. All locks of the transaction are released either way.
    ///
    /// If writing fails partway, the pages not written yet are rolled back like on abort, so the
    /// commit may be partially durable. Pages that cannot even be re-read are dropped from the pool.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let result = if commit {
            self.flush_pages(tid).or_else(|e| {
                if let Err(undo_error) = self.revert_pages(tid) {
                    warn!(
                        "Rolling back unwritten pages of transaction {} failed: {}",
                        tid, undo_error
                    );
                }
                Err(e)
            })
        } else {
            self.revert_pages(tid)
        };
        self.lock_manager.release_all(tid);

        match &result {
            Ok(()) if commit => info!("Transaction {} committed", tid),
            Ok(()) => info!("Transaction {} aborted", tid),
            Err(e) => warn!("Completing transaction {} failed: {}", tid, e),
        }
        result
    }

    /// Writes all pages dirtied by `tid` to disk
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        for (_, frame) in self.frames_dirtied_by(tid) {
            let mut page = frame.write().unwrap();
            if page.is_dirty() == Some(tid) {
                self.flush(&mut page)?;
            }
        }
        Ok(())
    }

    /// Writes the page to disk if it is resident and dirty
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame = self.pages.lock().unwrap().peek(&page_id);
        if let Some(frame) = frame {
            let mut page = frame.write().unwrap();
            if page.is_dirty().is_some() {
                self.flush(&mut page)?;
            }
        }
        Ok(())
    }

    /// Writes every dirty resident page to disk, regardless of which transaction dirtied it
    pub fn flush_all_pages(&self) -> Result<()> {
        let frames = self.pages.lock().unwrap().frames();
        for (_, frame) in frames {
            if frame.read().unwrap().is_dirty().is_some() {
                self.flush(&mut frame.write().unwrap())?;
            }
        }
        Ok(())
    }

    /// Drops the page from the pool without writing it
    pub fn discard_page(&self, page_id: PageId) {
        let mut pages = self.pages.lock().unwrap();
        if pages.remove(&page_id).is_some() {
            debug!("Discarded page {}", page_id);
        }
    }

    /// Drops every resident page of a table without writing it
    pub fn discard_table(&self, table_id: TableId) {
        let mut pages = self.pages.lock().unwrap();
        let page_ids = pages
            .frames()
            .into_iter()
            .map(|(page_id, _)| page_id)
            .filter(|page_id| page_id.table_id == table_id)
            .collect::<Vec<_>>();
        for page_id in page_ids {
            pages.remove(&page_id);
        }
        debug!("Discarded all pages of table {}", table_id);
    }

    /// Drops all resident pages without writing them
    pub fn clear(&self) {
        self.pages.lock().unwrap().clear();
    }

    pub fn num_resident(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.pages.lock().unwrap().contains(&page_id)
    }

    fn fetch_frame(&self, page_id: PageId) -> Result<Frame> {
        let cached = self.pages.lock().unwrap().get(&page_id);
        if let Some(frame) = cached {
            return Ok(frame);
        }

        // the page lock keeps writers away, so the disk content cannot change while it is read
        let file = self.catalog.get_file(page_id.table_id)?;
        let page = file.read_page(page_id)?;

        let mut pages = self.pages.lock().unwrap();
        // another reader may have loaded it in the meantime
        if let Some(frame) = pages.get(&page_id) {
            return Ok(frame);
        }
        self.make_room(&mut pages)?;
        debug!("Loaded page {} into the buffer pool", page_id);

        let frame = Arc::new(RwLock::new(page));
        pages.insert(page_id, Arc::clone(&frame));
        Ok(frame)
    }

    /// Marks the pages returned by a heap file operation dirty and makes sure they are resident
    fn mark_dirtied(&self, tid: TransactionId, dirtied: Vec<PageHandle>) -> Result<()> {
        for handle in dirtied {
            handle.write()?.mark_dirty(tid);

            let mut pages = self.pages.lock().unwrap();
            match pages.get(&handle.id()) {
                Some(frame) if Arc::ptr_eq(&frame, &handle.frame) => {}
                Some(_) => {
                    // the handle outlived an eviction, its copy carries the modification
                    pages.insert(handle.id(), Arc::clone(&handle.frame));
                    debug!("Reattached page {}", handle.id());
                }
                None => {
                    self.make_room(&mut pages)?;
                    pages.insert(handle.id(), Arc::clone(&handle.frame));
                }
            }
        }
        Ok(())
    }

    /// Resident pages dirtied by `tid`. Pages somebody is writing right now are skipped without
    /// waiting, the writer holds an exclusive lock on them, so they cannot belong to `tid`.
    fn frames_dirtied_by(&self, tid: TransactionId) -> Vec<(PageId, Frame)> {
        self.pages
            .lock()
            .unwrap()
            .frames()
            .into_iter()
            .filter(|(_, frame)| {
                matches!(frame.try_read(), Ok(page) if page.is_dirty() == Some(tid))
            })
            .collect()
    }

    fn make_room(&self, pages: &mut PageCache) -> Result<()> {
        while pages.len() >= self.pool_size {
            match pages.find_victim() {
                Some(victim) => {
                    pages.remove(&victim);
                    debug!("Evicted page {}", victim);
                }
                None => {
                    warn!(
                        "Cannot evict a page, all {} resident pages are dirty or being written",
                        pages.len()
                    );
                    return Err(DbError::NoEvictablePage);
                }
            }
        }
        Ok(())
    }

    fn flush(&self, page: &mut HeapPage) -> Result<()> {
        let file = self.catalog.get_file(page.id().table_id)?;
        file.write_page(&*page)?;
        page.mark_clean();
        page.set_before_image();
        debug!("Flushed page {}", page.id());
        Ok(())
    }

    /// Replaces every page dirtied by `tid` with its on-disk version. The cached instance is
    /// overwritten in place, so handles held elsewhere see the restored content.
    /// A page that cannot be re-read is dropped from the pool and the first such error returned.
    fn revert_pages(&self, tid: TransactionId) -> Result<()> {
        let mut result = Ok(());
        for (page_id, frame) in self.frames_dirtied_by(tid) {
            let mut page = frame.write().unwrap();
            if page.is_dirty() != Some(tid) {
                continue;
            }
            let on_disk = self
                .catalog
                .get_file(page_id.table_id)
                .and_then(|file| file.read_page(page_id));
            match on_disk {
                Ok(on_disk) => {
                    *page = on_disk;
                    debug!("Restored page {} from disk", page_id);
                }
                Err(e) => {
                    drop(page);
                    warn!("Cannot restore page {}, dropping it: {}", page_id, e);
                    self.discard_page(page_id);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    use super::BufferPool;
    use crate::catalog::Catalog;
    use crate::common::{DbConfig, PageId, TableId};
    use crate::concurrency::{Permission, TransactionIds};
    use crate::error::DbError;
    use crate::storage::Page;
    use crate::tuple::schema::{Schema, TypeId};
    use crate::tuple::value::Value;
    use crate::tuple::Tuple;

    // 7 tuples of two integers fit into a page
    const PAGE_SIZE: usize = 64;
    const TUPLES_PER_PAGE: usize = 7;
    const LOCK_TIMEOUT: Duration = Duration::from_millis(100);

    struct Setup {
        _dir: TempDir,
        catalog: Arc<Catalog>,
        buffer_pool: BufferPool,
        table_id: TableId,
        tids: TransactionIds,
    }

    fn setup(pool_size: usize, num_pages: u32) -> Result<Setup> {
        let dir = tempdir()?;
        let catalog = Arc::new(Catalog::new(PAGE_SIZE));
        let table_id = catalog.add_table(
            "t",
            Schema::from_types(&[TypeId::Integer, TypeId::Integer]),
            dir.path().join("t.dat"),
            None,
        )?;
        let file = catalog.get_file(table_id)?;
        for _ in 0..num_pages {
            file.allocate_page()?;
        }

        let config = DbConfig::default()
            .with_page_size(PAGE_SIZE)
            .with_pool_size(pool_size)
            .with_lock_timeout(LOCK_TIMEOUT);
        let buffer_pool = BufferPool::new(Arc::clone(&catalog), &config);
        Ok(Setup {
            _dir: dir,
            catalog,
            buffer_pool,
            table_id,
            tids: TransactionIds::new(),
        })
    }

    impl Setup {
        fn tuple(&self, a: i32, b: i32) -> Tuple {
            let schema = self.catalog.get_schema(self.table_id).unwrap();
            Tuple::new(vec![Value::Integer(a), Value::Integer(b)], schema).unwrap()
        }

        fn page(&self, page_no: u32) -> PageId {
            PageId::new(self.table_id, page_no)
        }

        fn count(&self) -> Result<usize> {
            let tid = self.tids.next();
            let tuples = self
                .buffer_pool
                .scan(tid, self.table_id)?
                .collect::<Result<Vec<_>, _>>()?;
            self.buffer_pool.transaction_complete(tid, true)?;
            Ok(tuples.len())
        }
    }

    #[test]
    fn same_page_is_cached_once() -> Result<()> {
        let s = setup(4, 1)?;
        let tid = s.tids.next();
        let first = s.buffer_pool.get_page(tid, s.page(0), Permission::ReadOnly)?;
        let second = s.buffer_pool.get_page(tid, s.page(0), Permission::ReadOnly)?;
        assert!(first.is_same_page(&second));
        assert_eq!(s.buffer_pool.num_resident(), 1);
        Ok(())
    }

    #[test]
    fn clean_page_is_evicted_when_full() -> Result<()> {
        let s = setup(2, 3)?;
        let tid = s.tids.next();
        s.buffer_pool.get_page(tid, s.page(0), Permission::ReadOnly)?;
        s.buffer_pool.get_page(tid, s.page(1), Permission::ReadOnly)?;
        assert_eq!(s.buffer_pool.num_resident(), 2);

        s.buffer_pool.get_page(tid, s.page(2), Permission::ReadOnly)?;
        assert_eq!(s.buffer_pool.num_resident(), 2);
        assert!(!s.buffer_pool.is_resident(s.page(0)));
        assert!(s.buffer_pool.is_resident(s.page(1)));
        assert!(s.buffer_pool.is_resident(s.page(2)));
        Ok(())
    }

    #[test]
    fn dirty_pages_are_not_evicted() -> Result<()> {
        let s = setup(2, 3)?;
        let tid = s.tids.next();
        for page_no in 0..2 {
            let handle = s
                .buffer_pool
                .get_page(tid, s.page(page_no), Permission::ReadWrite)?;
            handle.write()?.mark_dirty(tid);
        }

        let err = s
            .buffer_pool
            .get_page(tid, s.page(2), Permission::ReadOnly)
            .err()
            .unwrap();
        assert!(matches!(err, DbError::NoEvictablePage));
        assert!(s.buffer_pool.is_resident(s.page(0)));
        assert!(s.buffer_pool.is_resident(s.page(1)));
        assert!(!s.buffer_pool.is_resident(s.page(2)));
        Ok(())
    }

    #[test]
    fn clean_pages_in_use_can_be_evicted() -> Result<()> {
        let s = setup(1, 2)?;
        let tid = s.tids.next();
        let handle = s.buffer_pool.get_page(tid, s.page(0), Permission::ReadOnly)?;

        s.buffer_pool.get_page(tid, s.page(1), Permission::ReadOnly)?;
        assert!(!s.buffer_pool.is_resident(s.page(0)));
        assert!(s.buffer_pool.is_resident(s.page(1)));
        assert_eq!(handle.read().id(), s.page(0));
        Ok(())
    }

    #[test]
    fn modified_page_comes_back_after_eviction() -> Result<()> {
        let s = setup(1, 2)?;
        let tid = s.tids.next();
        let handle = s
            .buffer_pool
            .get_page(tid, s.page(0), Permission::ReadWrite)?;
        handle.write()?.insert_tuple(&mut s.tuple(7, 7))?;

        // page 0 is still clean, loading page 1 pushes it out
        s.buffer_pool.get_page(tid, s.page(1), Permission::ReadOnly)?;
        assert!(!s.buffer_pool.is_resident(s.page(0)));

        s.buffer_pool.mark_dirtied(tid, vec![handle])?;
        assert!(s.buffer_pool.is_resident(s.page(0)));
        assert!(!s.buffer_pool.is_resident(s.page(1)));
        s.buffer_pool.transaction_complete(tid, true)?;

        let on_disk = s.catalog.get_file(s.table_id)?.read_page(s.page(0))?;
        assert_eq!(on_disk.iter().count(), 1);
        Ok(())
    }

    #[test]
    fn commit_does_not_wait_for_pages_of_others() -> Result<()> {
        let s = setup(4, 3)?;
        let writer = s.tids.next();
        let holder = s.tids.next();
        let dirtied = s
            .buffer_pool
            .get_page(writer, s.page(1), Permission::ReadWrite)?;
        dirtied.write()?.insert_tuple(&mut s.tuple(1, 1))?;
        s.buffer_pool.mark_dirtied(writer, vec![dirtied])?;

        let held = s
            .buffer_pool
            .get_page(holder, s.page(0), Permission::ReadWrite)?;
        thread::scope(|scope| -> Result<()> {
            let guard = held.write()?;
            let committer = scope.spawn(|| s.buffer_pool.transaction_complete(writer, true));
            let deadline = Instant::now() + Duration::from_secs(5);
            while !committer.is_finished() {
                assert!(Instant::now() < deadline, "commit waited for a page it does not own");
                thread::sleep(Duration::from_millis(5));
            }
            committer.join().unwrap()?;

            // loading another page while still writing page 0
            let other = s
                .buffer_pool
                .get_page(holder, s.page(2), Permission::ReadOnly)?;
            assert_eq!(other.read().iter().count(), 0);
            drop(guard);
            Ok(())
        })?;

        let on_disk = s.catalog.get_file(s.table_id)?.read_page(s.page(1))?;
        assert_eq!(on_disk.iter().count(), 1);
        s.buffer_pool.transaction_complete(holder, false)?;
        Ok(())
    }

    #[test]
    fn readers_loading_together_share_the_page() -> Result<()> {
        let s = setup(4, 1)?;
        let barrier = Barrier::new(2);
        let (a, b) = thread::scope(|scope| {
            let load = || {
                let tid = s.tids.next();
                barrier.wait();
                s.buffer_pool.get_page(tid, s.page(0), Permission::ReadOnly)
            };
            let first = scope.spawn(load);
            let second = scope.spawn(load);
            (first.join().unwrap(), second.join().unwrap())
        });
        assert!(a?.is_same_page(&b?));
        assert_eq!(s.buffer_pool.num_resident(), 1);
        Ok(())
    }

    #[test]
    fn failed_commit_leaves_nothing_dirty() -> Result<()> {
        let s = setup(4, 0)?;
        let tid = s.tids.next();
        s.buffer_pool
            .insert_tuple(tid, s.table_id, &mut s.tuple(1, 1))?;

        s.catalog.clear();
        let err = s.buffer_pool.transaction_complete(tid, true).err().unwrap();
        assert!(matches!(err, DbError::NoSuchTable(_)));
        assert!(!s.buffer_pool.is_resident(s.page(0)));
        assert!(!s.buffer_pool.holds_lock(tid, s.page(0)));
        Ok(())
    }

    #[test]
    fn discarding_a_table_keeps_other_tables() -> Result<()> {
        let s = setup(4, 2)?;
        let other = s.catalog.add_table(
            "u",
            Schema::from_types(&[TypeId::Integer]),
            s._dir.path().join("u.dat"),
            None,
        )?;
        s.catalog.get_file(other)?.allocate_page()?;

        let tid = s.tids.next();
        for page_id in [s.page(0), s.page(1), PageId::new(other, 0)] {
            s.buffer_pool.get_page(tid, page_id, Permission::ReadOnly)?;
        }
        s.buffer_pool.discard_table(s.table_id);
        assert_eq!(s.buffer_pool.num_resident(), 1);
        assert!(s.buffer_pool.is_resident(PageId::new(other, 0)));
        Ok(())
    }

    #[test]
    fn pool_never_exceeds_its_size() -> Result<()> {
        let s = setup(3, 10)?;
        let tid = s.tids.next();
        for round in 0..3 {
            for page_no in 0..10 {
                let page_no = (page_no * (round + 1)) % 10;
                s.buffer_pool
                    .get_page(tid, s.page(page_no), Permission::ReadOnly)?;
                assert!(s.buffer_pool.num_resident() <= 3);
            }
        }
        Ok(())
    }

    #[test]
    fn read_only_handle_cannot_write() -> Result<()> {
        let s = setup(2, 1)?;
        let tid = s.tids.next();
        let handle = s.buffer_pool.get_page(tid, s.page(0), Permission::ReadOnly)?;
        assert!(matches!(handle.write(), Err(DbError::ReadOnlyPage(_))));
        Ok(())
    }

    #[test]
    fn reading_past_the_end_fails() -> Result<()> {
        let s = setup(2, 1)?;
        let tid = s.tids.next();
        let err = s
            .buffer_pool
            .get_page(tid, s.page(5), Permission::ReadOnly)
            .err()
            .unwrap();
        assert!(matches!(err, DbError::PageOutOfRange { num_pages: 1, .. }));
        Ok(())
    }

    #[test]
    fn committed_inserts_are_durable() -> Result<()> {
        let s = setup(4, 0)?;
        let tid = s.tids.next();
        let mut tuple = s.tuple(1, 2);
        let record_id = s.buffer_pool.insert_tuple(tid, s.table_id, &mut tuple)?;
        assert_eq!(record_id.page_id, s.page(0));
        assert_eq!(record_id.slot, 0);
        assert_eq!(tuple.record_id(), Some(record_id));

        s.buffer_pool.transaction_complete_commit(tid)?;
        assert!(!s.buffer_pool.holds_lock(tid, s.page(0)));

        let on_disk = s.catalog.get_file(s.table_id)?.read_page(s.page(0))?;
        assert_eq!(on_disk.iter().collect::<Vec<_>>(), vec![&tuple]);

        s.buffer_pool.clear();
        assert_eq!(s.count()?, 1);
        Ok(())
    }

    #[test]
    fn commit_marks_pages_clean() -> Result<()> {
        let s = setup(4, 0)?;
        let tid = s.tids.next();
        s.buffer_pool
            .insert_tuple(tid, s.table_id, &mut s.tuple(1, 1))?;

        let reader = s.tids.next();
        s.buffer_pool.transaction_complete(tid, true)?;
        let handle = s.buffer_pool.get_page(reader, s.page(0), Permission::ReadOnly)?;
        let page = handle.read();
        assert_eq!(page.is_dirty(), None);
        assert_eq!(page.before_image()?.page_data(), page.page_data());
        Ok(())
    }

    #[test]
    fn abort_restores_disk_content() -> Result<()> {
        let s = setup(4, 0)?;
        let writer = s.tids.next();
        s.buffer_pool
            .insert_tuple(writer, s.table_id, &mut s.tuple(1, 1))?;
        s.buffer_pool.transaction_complete(writer, true)?;
        let committed = s
            .catalog
            .get_file(s.table_id)?
            .read_page(s.page(0))?
            .page_data();

        let aborted = s.tids.next();
        s.buffer_pool
            .insert_tuple(aborted, s.table_id, &mut s.tuple(2, 2))?;
        let stale = s
            .buffer_pool
            .get_page(aborted, s.page(0), Permission::ReadWrite)?;
        assert_eq!(stale.read().iter().count(), 2);
        s.buffer_pool.transaction_complete(aborted, false)?;
        assert!(!s.buffer_pool.holds_lock(aborted, s.page(0)));

        let on_disk = s.catalog.get_file(s.table_id)?.read_page(s.page(0))?;
        assert_eq!(on_disk.page_data(), committed);

        let reader = s.tids.next();
        let handle = s.buffer_pool.get_page(reader, s.page(0), Permission::ReadOnly)?;
        assert!(handle.is_same_page(&stale));
        assert_eq!(handle.read().page_data(), committed);
        assert_eq!(handle.read().is_dirty(), None);
        Ok(())
    }

    #[test]
    fn deleted_tuples_are_gone_after_commit() -> Result<()> {
        let s = setup(4, 0)?;
        let tid = s.tids.next();
        let mut keep = s.tuple(1, 1);
        let mut remove = s.tuple(2, 2);
        s.buffer_pool.insert_tuple(tid, s.table_id, &mut keep)?;
        s.buffer_pool.insert_tuple(tid, s.table_id, &mut remove)?;
        s.buffer_pool.transaction_complete(tid, true)?;

        let tid = s.tids.next();
        s.buffer_pool.delete_tuple(tid, &remove)?;
        assert!(s.buffer_pool.delete_tuple(tid, &remove).is_err());
        s.buffer_pool.transaction_complete(tid, true)?;

        let tid = s.tids.next();
        let tuples = s
            .buffer_pool
            .scan(tid, s.table_id)?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(tuples, vec![keep]);
        Ok(())
    }

    #[test]
    fn deleting_without_record_id_fails() -> Result<()> {
        let s = setup(4, 1)?;
        let tid = s.tids.next();
        let err = s
            .buffer_pool
            .delete_tuple(tid, &s.tuple(1, 1))
            .err()
            .unwrap();
        assert!(matches!(err, DbError::MissingRecordId));
        Ok(())
    }

    #[test]
    fn inserts_append_pages_when_full() -> Result<()> {
        let s = setup(8, 0)?;
        let tid = s.tids.next();
        for i in 0..TUPLES_PER_PAGE as i32 * 2 + 1 {
            s.buffer_pool
                .insert_tuple(tid, s.table_id, &mut s.tuple(i, i))?;
        }
        s.buffer_pool.transaction_complete(tid, true)?;

        assert_eq!(s.catalog.get_file(s.table_id)?.num_pages(), 3);
        assert_eq!(s.count()?, TUPLES_PER_PAGE * 2 + 1);
        Ok(())
    }

    #[test]
    fn insert_releases_locks_of_full_pages() -> Result<()> {
        let s = setup(8, 0)?;
        let tid = s.tids.next();
        for i in 0..TUPLES_PER_PAGE as i32 {
            s.buffer_pool
                .insert_tuple(tid, s.table_id, &mut s.tuple(i, i))?;
        }
        s.buffer_pool.transaction_complete(tid, true)?;

        let tid = s.tids.next();
        let record_id = s
            .buffer_pool
            .insert_tuple(tid, s.table_id, &mut s.tuple(100, 100))?;
        assert_eq!(record_id.page_id, s.page(1));
        assert!(!s.buffer_pool.holds_lock(tid, s.page(0)));
        assert!(s.buffer_pool.holds_lock(tid, s.page(1)));
        s.buffer_pool.transaction_complete(tid, true)?;

        // a lock taken before the insert is kept
        let tid = s.tids.next();
        s.buffer_pool
            .get_page(tid, s.page(0), Permission::ReadOnly)?;
        s.buffer_pool
            .insert_tuple(tid, s.table_id, &mut s.tuple(101, 101))?;
        assert!(s.buffer_pool.holds_lock(tid, s.page(0)));
        assert!(s.buffer_pool.holds_lock(tid, s.page(1)));
        Ok(())
    }

    #[test]
    fn flush_and_discard_single_pages() -> Result<()> {
        let s = setup(4, 2)?;
        let tid = s.tids.next();
        for page_no in 0..2 {
            let handle = s
                .buffer_pool
                .get_page(tid, s.page(page_no), Permission::ReadWrite)?;
            handle.write()?.insert_tuple(&mut s.tuple(page_no as i32, 0))?;
            handle.write()?.mark_dirty(tid);
        }

        s.buffer_pool.flush_page(s.page(0))?;
        s.buffer_pool.discard_page(s.page(1));
        assert!(!s.buffer_pool.is_resident(s.page(1)));
        s.buffer_pool.transaction_complete(tid, true)?;

        let file = s.catalog.get_file(s.table_id)?;
        assert_eq!(file.read_page(s.page(0))?.iter().count(), 1);
        assert_eq!(file.read_page(s.page(1))?.iter().count(), 0);
        Ok(())
    }

    #[test]
    fn flush_all_writes_every_dirty_page() -> Result<()> {
        let s = setup(4, 0)?;
        let first = s.tids.next();
        s.buffer_pool
            .insert_tuple(first, s.table_id, &mut s.tuple(1, 1))?;

        s.buffer_pool.flush_all_pages()?;
        let on_disk = s.catalog.get_file(s.table_id)?.read_page(s.page(0))?;
        assert_eq!(on_disk.iter().count(), 1);
        Ok(())
    }

    #[test]
    fn scan_can_be_rewound() -> Result<()> {
        let s = setup(4, 0)?;
        let tid = s.tids.next();
        for i in 0..TUPLES_PER_PAGE as i32 + 2 {
            s.buffer_pool
                .insert_tuple(tid, s.table_id, &mut s.tuple(i, -i))?;
        }

        let mut scan = s.buffer_pool.scan(tid, s.table_id)?;
        let first = scan.next().unwrap()?;
        assert_eq!(first.as_i32(0), 0);
        assert_eq!(scan.by_ref().count(), TUPLES_PER_PAGE + 1);
        assert!(scan.next().is_none());

        scan.rewind();
        let values = scan
            .map(|tuple| tuple.map(|t| t.as_i32(1)))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(values, (0..TUPLES_PER_PAGE as i32 + 2).map(|i| -i).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn scan_of_empty_table() -> Result<()> {
        let s = setup(4, 0)?;
        let tid = s.tids.next();
        assert!(s.buffer_pool.scan(tid, s.table_id)?.next().is_none());
        assert!(s.buffer_pool.scan(tid, 42).is_err());
        Ok(())
    }

    #[test]
    fn conflicting_lock_times_out() -> Result<()> {
        let s = setup(4, 1)?;
        let writer = s.tids.next();
        let reader = s.tids.next();
        s.buffer_pool
            .get_page(writer, s.page(0), Permission::ReadWrite)?;

        let start = Instant::now();
        let err = s
            .buffer_pool
            .get_page(reader, s.page(0), Permission::ReadOnly)
            .err()
            .unwrap();
        assert!(err.is_transaction_aborted());
        assert!(start.elapsed() >= LOCK_TIMEOUT);
        s.buffer_pool.transaction_complete(reader, false)?;

        s.buffer_pool.transaction_complete(writer, true)?;
        let reader = s.tids.next();
        s.buffer_pool
            .get_page(reader, s.page(0), Permission::ReadOnly)?;
        Ok(())
    }

    #[test]
    fn readers_share_pages() -> Result<()> {
        let s = setup(4, 1)?;
        let first = s.tids.next();
        let second = s.tids.next();
        let a = s.buffer_pool.get_page(first, s.page(0), Permission::ReadOnly)?;
        let b = s
            .buffer_pool
            .get_page(second, s.page(0), Permission::ReadOnly)?;
        assert!(a.is_same_page(&b));
        Ok(())
    }

    #[test]
    fn concurrent_inserts() -> Result<()> {
        const THREADS: i32 = 4;
        const PER_THREAD: i32 = 5;
        let s = setup(16, 0)?;

        thread::scope(|scope| {
            for t in 0..THREADS {
                let s = &s;
                scope.spawn(move || loop {
                    let tid = s.tids.next();
                    let result = (0..PER_THREAD).try_for_each(|i| {
                        s.buffer_pool
                            .insert_tuple(tid, s.table_id, &mut s.tuple(t, i))
                            .map(|_| ())
                    });
                    match result {
                        Ok(()) => {
                            s.buffer_pool.transaction_complete(tid, true).unwrap();
                            break;
                        }
                        Err(e) if e.is_transaction_aborted() => {
                            s.buffer_pool.transaction_complete(tid, false).unwrap();
                        }
                        Err(e) => panic!("unexpected error {}", e),
                    }
                });
            }
        });

        assert_eq!(s.count()?, (THREADS * PER_THREAD) as usize);
        Ok(())
    }
}
