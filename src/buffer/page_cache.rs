use std::sync::Arc;

use lru::LruCache;

use super::Frame;
use crate::common::PageId;
use crate::storage::Page;

/// PageCache holds the resident pages in recency order and picks victims for eviction.
/// It never evicts on its own, the buffer pool decides when room is needed.
pub(in crate::buffer) struct PageCache {
    frames: LruCache<PageId, Frame>,
}

impl PageCache {
    pub fn new() -> Self {
        Self {
            frames: LruCache::unbounded(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn contains(&self, page_id: &PageId) -> bool {
        self.frames.contains(page_id)
    }

    /// Looks up a page and marks it as most recently used
    pub fn get(&mut self, page_id: &PageId) -> Option<Frame> {
        self.frames.get(page_id).map(Arc::clone)
    }

    pub fn insert(&mut self, page_id: PageId, frame: Frame) {
        self.frames.put(page_id, frame);
    }

    pub fn remove(&mut self, page_id: &PageId) -> Option<Frame> {
        self.frames.pop(page_id)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Looks up a page without touching its recency
    pub fn peek(&self, page_id: &PageId) -> Option<Frame> {
        self.frames.peek(page_id).map(Arc::clone)
    }

    /// Snapshot of the resident pages, most recently used first
    pub fn frames(&self) -> Vec<(PageId, Frame)> {
        self.frames
            .iter()
            .map(|(page_id, frame)| (*page_id, Arc::clone(frame)))
            .collect()
    }

    /// Returns the least recently used page that may be dropped without losing data.
    /// Dirty pages are never victims, neither are pages somebody is writing at the moment.
    pub fn find_victim(&self) -> Option<PageId> {
        for (page_id, frame) in self.frames.iter().rev() {
            if let Ok(page) = frame.try_read() {
                if page.is_dirty().is_none() {
                    return Some(*page_id);
                }
            }
        }
        None
    }
}
