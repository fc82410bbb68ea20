//! Bounded handle-keyed resource table.
//!
//! Handles are opaque strings `res_N`, monotonic per table and never reused
//! within a process lifetime. Allocation is capacity-checked atomically so
//! concurrent allocators cannot race past `max_size` (TOCTOU-safe).

use crate::error::{CoreError, CoreResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// An opaque resource handle, e.g. `res_42`.
pub type Handle = String;

/// A single resource-table entry.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// Type tag describing what `value` holds, e.g. `"stream"`.
    pub type_tag: String,
    /// The stored value.
    pub value: V,
    /// The id of the tenant that currently owns this entry.
    pub owner: String,
}

/// A bounded, handle-keyed table of `(type, value, owner)` tuples.
#[derive(Debug)]
pub struct ResourceTable<V> {
    entries: DashMap<Handle, Entry<V>>,
    next_id: AtomicU64,
    max_size: usize,
    len: AtomicUsize,
}

impl<V: Clone> ResourceTable<V> {
    /// Creates an empty table bounded to `max_size` live entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_size,
            len: AtomicUsize::new(0),
        }
    }

    /// Allocates a new handle for `value`, owned by `owner`.
    ///
    /// Fails with `ETABLEFULL` if the table is already at capacity; the
    /// capacity check and insertion happen under the same atomic increment,
    /// so two concurrent allocators cannot both slip past the limit.
    pub fn allocate(
        &self,
        type_tag: impl Into<String>,
        value: V,
        owner: impl Into<String>,
    ) -> CoreResult<Handle> {
        let prev = self.len.fetch_add(1, Ordering::SeqCst);
        if prev >= self.max_size {
            self.len.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::TableFull(self.max_size));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = format!("res_{id}");
        self.entries.insert(
            handle.clone(),
            Entry {
                type_tag: type_tag.into(),
                value,
                owner: owner.into(),
            },
        );
        Ok(handle)
    }

    /// Returns a clone of the entry for `handle`.
    pub fn get(&self, handle: &str) -> CoreResult<Entry<V>> {
        self.entries
            .get(handle)
            .map(|e| e.clone())
            .ok_or_else(|| CoreError::NoHandle(handle.to_string()))
    }

    /// Returns the value for `handle` after checking its type tag matches.
    pub fn get_typed(&self, handle: &str, expected_type: &str) -> CoreResult<V> {
        let entry = self.get(handle)?;
        if entry.type_tag != expected_type {
            return Err(CoreError::HandleType {
                handle: handle.to_string(),
                expected: expected_type.to_string(),
            });
        }
        Ok(entry.value)
    }

    /// Re-assigns ownership of `handle`.
    pub fn transfer(&self, handle: &str, new_owner: impl Into<String>) -> CoreResult<()> {
        let mut entry = self
            .entries
            .get_mut(handle)
            .ok_or_else(|| CoreError::NoHandle(handle.to_string()))?;
        entry.owner = new_owner.into();
        Ok(())
    }

    /// Removes `handle` and returns its value. The handle is never reused.
    pub fn drop(&self, handle: &str) -> CoreResult<V> {
        let (_, entry) = self
            .entries
            .remove(handle)
            .ok_or_else(|| CoreError::NoHandle(handle.to_string()))?;
        self.len.fetch_sub(1, Ordering::SeqCst);
        Ok(entry.value)
    }

    /// Returns `true` if `handle` names a live entry.
    pub fn has(&self, handle: &str) -> bool {
        self.entries.contains_key(handle)
    }

    /// Lists every handle owned by `owner`.
    pub fn list_by_owner(&self, owner: &str) -> Vec<Handle> {
        self.entries
            .iter()
            .filter(|e| e.owner == owner)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Lists every handle whose type tag equals `type_tag`.
    pub fn list_by_type(&self, type_tag: &str) -> Vec<Handle> {
        self.entries
            .iter()
            .filter(|e| e.type_tag == type_tag)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Lists every live handle.
    pub fn list_all(&self) -> Vec<Handle> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Drops every entry owned by `owner`, returning the handles removed.
    /// Used by tenant destruction to sweep all handles it owns.
    pub fn drop_all_owned_by(&self, owner: &str) -> Vec<Handle> {
        let handles = self.list_by_owner(owner);
        for h in &handles {
            let _ = self.drop(h);
        }
        handles
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
        self.len.store(0, Ordering::SeqCst);
    }

    /// The number of live entries.
    pub fn size(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }
}
