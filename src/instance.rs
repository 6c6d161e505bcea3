//! Instance Table
//!
//! Maps opaque integer handles to live objects created from module types.
//! Handles come from a wrapping counter that advances on every allocation
//! attempt, including failed ones, so handles are monotonic but may have
//! gaps. Handle 0 is never issued.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::module::registry::Module;
use crate::module::{ModuleKey, TypeDef};

/// Opaque instance handle
pub type Handle = u32;

/// A live object and the type and module it came from.
pub struct InstanceEntry {
    // Field order is drop order: the object goes before its module.
    object: Mutex<Box<dyn Any + Send>>,
    type_def: Arc<TypeDef>,
    origin: Option<ModuleKey>,
    module: Arc<Module>,
}

impl InstanceEntry {
    pub fn new(object: Box<dyn Any + Send>, type_def: Arc<TypeDef>, module: Arc<Module>) -> Self {
        Self {
            object: Mutex::new(object),
            type_def,
            origin: module.key(),
            module,
        }
    }

    pub fn object(&self) -> &Mutex<Box<dyn Any + Send>> {
        &self.object
    }

    pub fn type_def(&self) -> &Arc<TypeDef> {
        &self.type_def
    }

    /// Module the instance was created from; `None` for ambient types
    pub fn origin(&self) -> Option<ModuleKey> {
        self.origin
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }
}

/// Handle → instance map with the handle counter.
#[derive(Default)]
pub struct InstanceTable {
    next: Handle,
    entries: HashMap<Handle, Arc<InstanceEntry>>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter and return the new handle.
    ///
    /// On wrap-around, 0 and handles still in the table are skipped.
    pub fn reserve(&mut self) -> Handle {
        loop {
            self.next = self.next.wrapping_add(1);
            if self.next != 0 && !self.entries.contains_key(&self.next) {
                return self.next;
            }
        }
    }

    /// Store an entry under a reserved handle.
    pub fn insert(&mut self, handle: Handle, entry: InstanceEntry) {
        self.entries.insert(handle, Arc::new(entry));
    }

    pub fn get(&self, handle: Handle) -> Option<Arc<InstanceEntry>> {
        self.entries.get(&handle).cloned()
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Arc<InstanceEntry>> {
        self.entries.remove(&handle)
    }

    /// Remove every instance created from `key`.
    pub fn purge_module(&mut self, key: ModuleKey) -> Vec<Arc<InstanceEntry>> {
        let handles: Vec<Handle> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.origin == Some(key))
            .map(|(handle, _)| *handle)
            .collect();
        handles
            .into_iter()
            .filter_map(|handle| self.entries.remove(&handle))
            .collect()
    }

    /// Number of live instances created from `key`
    pub fn count_from(&self, key: ModuleKey) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.origin == Some(key))
            .count()
    }

    /// Remove every instance.
    pub fn drain(&mut self) -> Vec<Arc<InstanceEntry>> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live handles in ascending order
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.entries.keys().copied().collect();
        handles.sort_unstable();
        handles
    }
}
