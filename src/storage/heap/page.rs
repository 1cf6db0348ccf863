use std::sync::Arc;

use crate::common::{PageId, RecordId, Slot};
use crate::concurrency::TransactionId;
use crate::error::{DbError, Result};
use crate::storage::Page;
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;

/// How many tuples of `tuple_size` bytes fit into a page, each one also needing a header bit
pub fn num_slots(page_size: usize, tuple_size: usize) -> usize {
    (page_size * 8) / (tuple_size * 8 + 1)
}

/// Size in bytes of the slot bitmap for `num_slots` slots
pub fn header_size(num_slots: usize) -> usize {
    (num_slots + 7) / 8
}

/// A page of a heap file.
///
/// On disk it consists of
/// 1. a bitmap with one bit per slot, bit `i % 8` of byte `i / 8` is set if slot `i` is in use
/// 2. `num_slots` fixed-width tuple slots, an unused slot is all zeroes
/// 3. zero padding up to the page size
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
    // page content as it was when the page was read or last made durable
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Parses a page from its on-disk bytes. The page size is the length of `data`.
    pub fn new(page_id: PageId, data: &[u8], schema: Arc<Schema>) -> Result<Self> {
        let page_size = data.len();
        let tuple_size = schema.tuple_size();
        if tuple_size == 0 {
            return Err(DbError::InvalidSchema(
                "a heap page needs at least one column".to_owned(),
            ));
        }
        let slots = num_slots(page_size, tuple_size);
        if slots > Slot::MAX as usize + 1 {
            return Err(DbError::InvalidSchema(format!(
                "{} slots per page cannot be addressed",
                slots
            )));
        }
        let header_len = header_size(slots);
        let header = data[..header_len].to_vec();

        let mut tuples = Vec::with_capacity(slots);
        let mut offset = header_len;
        for slot in 0..slots {
            if is_bit_set(&header, slot) {
                let bytes = &data[offset..offset + tuple_size];
                let mut tuple = Tuple::parse(bytes, Arc::clone(&schema)).map_err(|e| {
                    DbError::CorruptedPage {
                        page_id,
                        reason: format!("slot {}: {}", slot, e),
                    }
                })?;
                tuple.set_record_id(Some(RecordId::new(page_id, slot as Slot)));
                tuples.push(Some(tuple));
            } else {
                tuples.push(None);
            }
            offset += tuple_size;
        }

        let mut page = Self {
            page_id,
            schema,
            page_size,
            header,
            tuples,
            dirtied_by: None,
            before_image: Vec::new(),
        };
        page.set_before_image();
        Ok(page)
    }

    /// The image of a page without any tuples
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|slot| !self.is_slot_used(*slot))
            .count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && is_bit_set(&self.header, slot)
    }

    pub fn tuple(&self, slot: usize) -> Option<&Tuple> {
        self.tuples.get(slot).and_then(|tuple| tuple.as_ref())
    }

    /// Iterates over the live tuples in slot order
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().filter_map(|tuple| tuple.as_ref())
    }

    /// Stores the tuple in the first free slot and updates its record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if !self.schema.is_compatible(tuple.schema()) {
            return Err(DbError::SchemaMismatch(self.page_id));
        }
        let slot = (0..self.num_slots())
            .find(|slot| !self.is_slot_used(*slot))
            .ok_or(DbError::PageFull(self.page_id))?;

        let record_id = RecordId::new(self.page_id, slot as Slot);
        tuple.set_record_id(Some(record_id));
        self.tuples[slot] = Some(tuple.clone());
        self.mark_slot_used(slot, true);

        Ok(record_id)
    }

    /// Removes the tuple from the slot its record id points to.
    /// Fails if that slot does not hold an equal tuple.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if record_id.page_id != self.page_id {
            return Err(DbError::TupleNotOnPage(record_id));
        }
        let slot = record_id.slot as usize;
        if slot >= self.num_slots() {
            return Err(DbError::SlotOutOfRange(record_id));
        }

        match &self.tuples[slot] {
            Some(stored) if self.is_slot_used(slot) && stored.values() == tuple.values() => {
                self.tuples[slot] = None;
                self.mark_slot_used(slot, false);
                Ok(())
            }
            _ => Err(DbError::TupleNotOnPage(record_id)),
        }
    }

    /// Returns the page as it was when the before image was taken
    pub fn before_image(&self) -> Result<HeapPage> {
        HeapPage::new(self.page_id, &self.before_image, Arc::clone(&self.schema))
    }

    pub fn set_before_image(&mut self) {
        self.before_image = self.page_data();
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }
}

impl Page for HeapPage {
    fn id(&self) -> PageId {
        self.page_id
    }

    fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    fn mark_dirty(&mut self, tid: TransactionId) {
        self.dirtied_by = Some(tid);
    }

    fn mark_clean(&mut self) {
        self.dirtied_by = None;
    }

    fn page_data(&self) -> Vec<u8> {
        let tuple_size = self.schema.tuple_size();
        let mut data = vec![0u8; self.page_size];
        data[..self.header.len()].copy_from_slice(&self.header);

        let mut offset = self.header.len();
        for (slot, tuple) in self.tuples.iter().enumerate() {
            if let Some(tuple) = tuple {
                if self.is_slot_used(slot) {
                    tuple.serialize(&mut data[offset..offset + tuple_size]);
                }
            }
            offset += tuple_size;
        }
        // everything past the last slot stays zero
        data
    }
}

fn is_bit_set(header: &[u8], slot: usize) -> bool {
    (header[slot / 8] >> (slot % 8)) & 1 == 1
}
