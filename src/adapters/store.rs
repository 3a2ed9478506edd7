use crate::domain::model::{Identifier, PersistablePair};
use crate::domain::ports::RecordStore;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory [`RecordStore`] keyed by the source identifier.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<Identifier, PersistablePair>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: Identifier) -> bool {
        self.records
            .lock()
            .map(|r| r.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn get(&self, id: Identifier) -> Option<PersistablePair> {
        self.records.lock().ok()?.get(&id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_if_absent(&self, pairs: &[PersistablePair]) -> Result<usize> {
        let mut records = self.records.lock().map_err(|e| EtlError::Store {
            message: format!("record store lock poisoned: {}", e),
        })?;

        let mut inserted = 0;
        for pair in pairs {
            let Some(id) = pair.id() else {
                tracing::warn!("Skipping record without id");
                continue;
            };
            // 已存在的記錄保留第一次寫入的版本
            if let std::collections::hash_map::Entry::Vacant(slot) = records.entry(id) {
                slot.insert(pair.clone());
                inserted += 1;
            }
        }

        tracing::debug!("💾 Stored {} new of {} records", inserted, pairs.len());
        Ok(inserted)
    }
}
