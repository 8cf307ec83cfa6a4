use std::collections::{HashMap, HashSet};

use crate::ram::{Ram, RamWriteId};

pub type WriteId = u64;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum WriteState {
    Unspecified,
    Pending,
    Writing(RamWriteId),
    Finished,
}

/// A store in flight through the pipeline. Its address and value may not be
/// known yet at the moment it is dispatched (spec §3).
#[derive(Clone, Copy, Debug)]
pub struct MemoryWrite {
    pub id: WriteId,
    pub address: Option<i64>,
    pub value: Option<i64>,
    pub state: WriteState,
}

impl MemoryWrite {
    fn new(id: WriteId, address: Option<i64>) -> MemoryWrite {
        MemoryWrite {
            id,
            address,
            value: None,
            state: if address.is_some() {
                WriteState::Pending
            } else {
                WriteState::Unspecified
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == WriteState::Pending
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// Tracks stores dispatched by the pipeline but not yet retired to [`Ram`], so
/// that a load can observe the latest earlier store to the same address even
/// before it has actually reached memory (spec §4.5).
///
/// # Invariants
/// - Every live [`WriteId`] is either in `unspecified_writes` or has an entry
///   in `write_address_map`, never both.
/// - `writes_map[addr]` is sorted by id ascending.
#[derive(Default)]
pub struct MemoryWritesManager {
    writes_map: HashMap<i64, Vec<MemoryWrite>>,
    write_address_map: HashMap<WriteId, i64>,
    unspecified_writes: HashSet<WriteId>,
    current_id: WriteId,
}

impl MemoryWritesManager {
    pub fn new() -> MemoryWritesManager {
        MemoryWritesManager::default()
    }

    /// Creates an address-unknown write, returning its freshly allocated id.
    pub fn register_pending_write(&mut self) -> WriteId {
        let id = self.current_id;
        self.current_id += 1;
        self.unspecified_writes.insert(id);
        id
    }

    /// Creates an address-known write at `address`.
    pub fn register_pending_write_at(&mut self, address: i64) -> WriteId {
        let id = self.current_id;
        self.current_id += 1;
        self.insert_at(id, address, None);
        id
    }

    fn insert_at(&mut self, id: WriteId, address: i64, value: Option<i64>) {
        let mut write = MemoryWrite::new(id, Some(address));
        write.value = value;
        let bucket = self.writes_map.entry(address).or_default();
        bucket.push(write);
        bucket.sort_by_key(|w| w.id);
        self.write_address_map.insert(id, address);
    }

    /// Resolves the address of a previously-unspecified write. Panics (an
    /// `InternalInvariantViolation`, spec §7) if `id` is not currently in
    /// `unspecified_writes`.
    pub fn specify_address(&mut self, id: WriteId, address: i64) {
        let removed = self.unspecified_writes.remove(&id);
        assert!(
            removed,
            "specifyAddress: write {} is not an unspecified pending write",
            id
        );
        self.insert_at(id, address, None);
    }

    /// Annotates `id`'s store with its value. Panics if `id` does not have a
    /// known address yet.
    pub fn specify_value(&mut self, id: WriteId, value: i64) {
        let write = self.get_write_mut(id);
        write.value = Some(value);
    }

    fn get_write_mut(&mut self, id: WriteId) -> &mut MemoryWrite {
        let addr = *self
            .write_address_map
            .get(&id)
            .unwrap_or_else(|| panic!("unknown write id {}", id));
        self.writes_map
            .get_mut(&addr)
            .and_then(|bucket| bucket.iter_mut().find(|w| w.id == id))
            .unwrap_or_else(|| panic!("inconsistent write index for id {}", id))
    }

    fn has_unspecified_writes_up_to(&self, max_id: WriteId) -> bool {
        self.unspecified_writes.iter().any(|id| *id <= max_id)
    }

    /// Returns the latest write to `address` with id `<= max_id`.
    ///
    /// # Panics
    /// Panics if any write with id `<= max_id` is still address-unspecified:
    /// the caller must stall until all earlier stores' addresses are known,
    /// or this query cannot be answered correctly (spec §4.5).
    pub fn previous_write(&self, address: i64, max_id: WriteId) -> Option<MemoryWrite> {
        assert!(
            !self.has_unspecified_writes_up_to(max_id),
            "previousWrite queried with an unresolved earlier store"
        );
        self.writes_map
            .get(&address)?
            .iter()
            .rev()
            .find(|w| w.id <= max_id)
            .copied()
    }

    /// Issues `id`'s store to `ram`, transitioning it to `Writing`.
    pub fn start_writing(&mut self, id: WriteId, ram: &mut Ram) {
        let addr = self.write_address_map[&id];
        let value = {
            let write = self.get_write_mut(id);
            assert!(write.is_pending(), "startWriting: write {} is not pending", id);
            assert!(write.has_value(), "startWriting: write {} has no value", id);
            write.value.unwrap()
        };
        let ram_id = ram
            .write(addr, value)
            .expect("startWriting: address was validated when specified");
        self.get_write_mut(id).state = WriteState::Writing(ram_id);
    }

    /// Reaps writes RAM reports as completed.
    pub fn remove_finished(&mut self, ram: &mut Ram) {
        let finished_ram_ids = ram.take_finished();
        let mut to_remove = Vec::new();
        for bucket in self.writes_map.values_mut() {
            for write in bucket.iter_mut() {
                if let WriteState::Writing(ram_id) = write.state {
                    if finished_ram_ids.contains(&ram_id) {
                        write.state = WriteState::Finished;
                        to_remove.push(write.id);
                    }
                }
            }
        }
        for bucket in self.writes_map.values_mut() {
            bucket.retain(|w| w.state != WriteState::Finished);
        }
        for id in to_remove {
            self.write_address_map.remove(&id);
        }
    }

    /// Cancels all pending (not yet issued to RAM) writes on pipeline flush.
    /// Writes already `Writing` survive, since they are in-flight in RAM.
    pub fn remove_pending(&mut self) {
        for bucket in self.writes_map.values_mut() {
            bucket.retain(|w| !w.is_pending());
        }
        self.unspecified_writes.clear();
    }

    /// Brings every remaining write to `Writing`/`Finished`, for `HALT`'s
    /// pipeline drain (spec §4.6 point 4). Assumes every write already has an
    /// address and value, as is the case once the pipeline has no in-flight
    /// instructions left.
    pub fn drain(&mut self, ram: &mut Ram) {
        let ids: Vec<WriteId> = self
            .writes_map
            .values()
            .flatten()
            .filter(|w| w.is_pending())
            .map(|w| w.id)
            .collect();
        for id in ids {
            self.start_writing(id, ram);
        }
        self.remove_finished(ram);
    }

    pub fn live_write_count(&self) -> usize {
        self.write_address_map.len() + self.unspecified_writes.len()
    }
}
