//! Controller registry
//!
//! Maps the external card identifier to a running [`Anc350`] so the layer
//! that resolves configuration strings can hand out shared controller
//! handles. Purely a lookup table; controllers own their own lifecycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::controller::Anc350;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("controller card {card} already registered")]
    Duplicate { card: u32 },

    #[error("no controller registered for card {card}")]
    NotFound { card: u32 },
}

/// Thread-safe card-to-controller map.
#[derive(Default)]
pub struct ControllerRegistry {
    inner: Mutex<HashMap<u32, Arc<Anc350>>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller under its card number.
    pub fn insert(&self, controller: Arc<Anc350>) -> Result<(), RegistryError> {
        let card = controller.card();
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&card) {
            return Err(RegistryError::Duplicate { card });
        }
        map.insert(card, controller);
        Ok(())
    }

    pub fn get(&self, card: u32) -> Result<Arc<Anc350>, RegistryError> {
        self.inner
            .lock()
            .unwrap()
            .get(&card)
            .cloned()
            .ok_or(RegistryError::NotFound { card })
    }

    /// Remove and return a controller; the caller decides whether to shut
    /// it down.
    pub fn remove(&self, card: u32) -> Result<Arc<Anc350>, RegistryError> {
        self.inner
            .lock()
            .unwrap()
            .remove(&card)
            .ok_or(RegistryError::NotFound { card })
    }

    /// Registered card numbers, unordered.
    pub fn cards(&self) -> Vec<u32> {
        self.inner.lock().unwrap().keys().copied().collect()
    }
}
