//! A simple, volatile, in-memory implementation of [`Storage`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use qbft_rs::storage::{Storage, StorageError};

/// An in-memory implementation of [`Storage`]. Clones share the same map.
#[derive(Clone)]
pub(crate) struct MemDB(Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>);

impl MemDB {
    /// Create a new, empty `MemDB`.
    pub(crate) fn new() -> MemDB {
        MemDB(Arc::new(Mutex::new(HashMap::new())))
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl Storage for MemDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        self.0.lock().unwrap().insert(key.to_vec(), value);
        Ok(())
    }
}

/// A [`Storage`] that rejects every write.
pub(crate) struct ReadOnlyDB;

impl Storage for ReadOnlyDB {
    fn get(&self, _: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn set(&mut self, _: &[u8], _: Vec<u8>) -> Result<(), StorageError> {
        Err(StorageError::WriteError {
            reason: String::from("read only"),
        })
    }
}
