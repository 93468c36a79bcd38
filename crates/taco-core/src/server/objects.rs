//! The object table: live objects held on behalf of the client.
//!
//! Handles are allocated monotonically starting at 1 and never reused within
//! a server's lifetime, so a destroyed handle stays invalid forever.

use std::collections::HashMap;

use crate::error::{Result, TacoError};
use crate::server::value::SharedObject;

/// Handle → live object mapping, the server's only persistent object state.
#[derive(Default)]
pub struct ObjectTable {
    objects: HashMap<u64, SharedObject>,
    last_number: u64,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object under the next handle and return the handle.
    pub fn insert(&mut self, object: SharedObject) -> u64 {
        self.last_number += 1;
        self.objects.insert(self.last_number, object);
        self.last_number
    }

    /// Look up a handle, failing if it was never allocated or was destroyed.
    pub fn get(&self, number: u64) -> Result<SharedObject> {
        self.objects
            .get(&number)
            .cloned()
            .ok_or(TacoError::ObjectNotFound(number))
    }

    /// Drop a handle's entry. The handle is invalid afterwards.
    pub fn remove(&mut self, number: u64) -> Result<()> {
        self.objects
            .remove(&number)
            .map(|_| ())
            .ok_or(TacoError::ObjectNotFound(number))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
