//! Cache of resolved delta bases for streaming pack consumption.
//!
//! Resolved contents live in memory up to a byte budget; past it, the
//! least-recently-inserted entries spill to a temp directory so memory
//! stays bounded however large the pack is.

use std::collections::{HashMap, VecDeque};

use vault_hash::ObjectId;
use vault_object::ObjectType;

use crate::WireError;

/// Default in-memory budget: 32 MiB.
pub const DEFAULT_MEMORY_BUDGET: usize = 32 * 1024 * 1024;

pub struct PackObjectCache {
    mem: HashMap<ObjectId, (ObjectType, Vec<u8>)>,
    /// Insertion order, oldest first, for spill selection.
    order: VecDeque<ObjectId>,
    mem_bytes: usize,
    budget: usize,
    spill_dir: Option<tempfile::TempDir>,
    spilled: HashMap<ObjectId, ObjectType>,
}

impl PackObjectCache {
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_MEMORY_BUDGET)
    }

    pub fn with_budget(budget: usize) -> Self {
        Self {
            mem: HashMap::new(),
            order: VecDeque::new(),
            mem_bytes: 0,
            budget,
            spill_dir: None,
            spilled: HashMap::new(),
        }
    }

    /// Insert a resolved object, spilling older entries past the budget.
    pub fn insert(
        &mut self,
        id: ObjectId,
        obj_type: ObjectType,
        data: Vec<u8>,
    ) -> Result<(), WireError> {
        if self.mem.contains_key(&id) || self.spilled.contains_key(&id) {
            return Ok(());
        }
        self.mem_bytes += data.len();
        self.mem.insert(id, (obj_type, data));
        self.order.push_back(id);

        while self.mem_bytes > self.budget && self.order.len() > 1 {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some((obj_type, data)) = self.mem.remove(&oldest) {
                self.mem_bytes -= data.len();
                self.spill(oldest, obj_type, &data)?;
            }
        }
        Ok(())
    }

    /// Fetch a resolved object, from memory or the spill area.
    pub fn get(&mut self, id: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, WireError> {
        if let Some((obj_type, data)) = self.mem.get(id) {
            return Ok(Some((*obj_type, data.clone())));
        }
        if let Some(obj_type) = self.spilled.get(id) {
            let dir = self
                .spill_dir
                .as_ref()
                .expect("spilled entries imply a spill dir");
            let data = std::fs::read(dir.path().join(id.to_hex()))?;
            return Ok(Some((*obj_type, data)));
        }
        Ok(None)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.mem.contains_key(id) || self.spilled.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.mem.len() + self.spilled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spill(&mut self, id: ObjectId, obj_type: ObjectType, data: &[u8]) -> Result<(), WireError> {
        if self.spill_dir.is_none() {
            self.spill_dir = Some(tempfile::tempdir()?);
        }
        let dir = self.spill_dir.as_ref().expect("just created");
        std::fs::write(dir.path().join(id.to_hex()), data)?;
        self.spilled.insert(id, obj_type);
        Ok(())
    }
}

impl Default for PackObjectCache {
    fn default() -> Self {
        Self::new()
    }
}
