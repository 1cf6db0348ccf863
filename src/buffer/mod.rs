use std::sync::{Arc, RwLock};

use crate::storage::heap::page::HeapPage;

pub mod buffer_pool;
mod page_cache;

/// A cached page. The buffer pool keeps one reference, every live page handle another one.
type Frame = Arc<RwLock<HeapPage>>;
