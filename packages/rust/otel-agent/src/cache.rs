//! Memoization of instrument handles.
//!
//! Tracers, meters and metric instruments are cheap to use but not free to create,
//! and creating the same instrument twice can register duplicate metric streams.
//! [`InstrumentCache`] guarantees at most one successful creation per key, even when
//! many threads ask for the same key at once.
//!
//! Each key owns a slot with its own initialization lock, so a slow factory for one
//! key never blocks lookups for another. A factory that fails leaves the slot empty
//! and the next caller simply tries again.

use crate::error::AgentError;

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, RwLock},
};

#[derive(Default)]
struct Slot {
    value: OnceLock<Box<dyn Any + Send + Sync>>,
    init: Mutex<()>,
}

/// Type-erased, keyed store of instrument handles.
#[derive(Default)]
pub struct InstrumentCache {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl std::fmt::Debug for InstrumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentCache")
            .field("len", &self.len())
            .finish()
    }
}

impl InstrumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle stored under `key`, creating it with `factory` if absent.
    ///
    /// # Errors
    ///
    /// - [`AgentError::InstrumentKindMismatch`] if `key` already holds a handle of
    ///   another type.
    /// - Whatever `factory` returns. The key stays empty and can be retried.
    pub fn get_or_create<T, F>(&self, key: &str, factory: F) -> Result<T, AgentError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, AgentError>,
    {
        let slot = self.slot(key);

        if let Some(existing) = slot.value.get() {
            return downcast(key, existing.as_ref());
        }

        let _guard = slot.init.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some(existing) = slot.value.get() {
            return downcast(key, existing.as_ref());
        }

        let value = factory()?;
        // Only this thread can set the slot while it holds the init lock.
        let _ = slot.value.set(Box::new(value.clone()));
        Ok(value)
    }

    /// Number of keys holding a created handle.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(|poison| poison.into_inner());
        slots.values().filter(|slot| slot.value.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached handle.
    pub fn clear(&self) {
        let mut slots = self.slots.write().unwrap_or_else(|poison| poison.into_inner());
        slots.clear();
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        {
            let slots = self.slots.read().unwrap_or_else(|poison| poison.into_inner());
            if let Some(slot) = slots.get(key) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().unwrap_or_else(|poison| poison.into_inner());
        slots.entry(key.to_string()).or_default().clone()
    }
}

fn downcast<T>(key: &str, value: &(dyn Any + Send + Sync)) -> Result<T, AgentError>
where
    T: Clone + 'static,
{
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| AgentError::InstrumentKindMismatch {
            key: key.to_string(),
        })
}
