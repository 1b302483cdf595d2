use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Storage, StorageError, StoredRecord};

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    revision: u64,
    expiration: Option<OffsetDateTime>,
}

impl Entry {
    fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expiration.map_or(true, |expiration| expiration > now)
    }
}

/// Table size below which inserts never sweep.
const MIN_SWEEP_SIZE: usize = 64;

#[derive(Debug)]
struct Table {
    records: HashMap<String, Entry>,
    /// Size at which the next insert drops every expired record.
    sweep_at: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            sweep_at: MIN_SWEEP_SIZE,
        }
    }
}

impl Table {
    /// Drop expired records once the table has doubled since the last sweep, so
    /// never-redeemed records cannot pile up while inserts stay amortised O(1).
    fn sweep_if_due(&mut self, now: OffsetDateTime) {
        if self.records.len() < self.sweep_at {
            return;
        }
        self.records.retain(|_, entry| entry.is_live(now));
        self.sweep_at = MIN_SWEEP_SIZE.max(self.records.len() * 2);
    }
}

/// In-process [`Storage`] implementation.
///
/// Expired records are dropped when they are next touched and swept in bulk as a
/// table grows.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, table: &str, key: &str) -> Result<Option<StoredRecord>, StorageError> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.lock().await;
        let Some(Table { records, .. }) = tables.get_mut(table) else {
            return Ok(None);
        };
        match records.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(StoredRecord {
                data: entry.data.clone(),
                revision: entry.revision,
            })),
            Some(_) => {
                records.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn insert(
        &self,
        table: &str,
        key: Option<&str>,
        data: Vec<u8>,
        expiration: Option<OffsetDateTime>,
    ) -> Result<String, StorageError> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.lock().await;
        let table_records = tables.entry(table.to_string()).or_default();
        table_records.sweep_if_due(now);
        let records = &mut table_records.records;

        let key = match key {
            Some(key) => key.to_string(),
            None => loop {
                let candidate = Uuid::new_v4().to_string();
                if !records.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        if records.get(&key).is_some_and(|entry| entry.is_live(now)) {
            return Err(StorageError::AlreadyExists {
                table: table.to_string(),
                key,
            });
        }

        records.insert(
            key.clone(),
            Entry {
                data,
                revision: 1,
                expiration,
            },
        );
        Ok(key)
    }

    async fn update(
        &self,
        table: &str,
        key: &str,
        data: Vec<u8>,
        expected_revision: u64,
    ) -> Result<u64, StorageError> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.lock().await;
        let entry = tables
            .get_mut(table)
            .and_then(|table| table.records.get_mut(key))
            .filter(|entry| entry.is_live(now))
            .ok_or_else(|| StorageError::NotFound {
                table: table.to_string(),
                key: key.to_string(),
            })?;

        if entry.revision != expected_revision {
            return Err(StorageError::Conflict {
                table: table.to_string(),
                key: key.to_string(),
            });
        }

        entry.data = data;
        entry.revision += 1;
        Ok(entry.revision)
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StorageError> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.lock().await;
        Ok(tables
            .get_mut(table)
            .and_then(|table| table.records.remove(key))
            .is_some_and(|entry| entry.is_live(now)))
    }
}
