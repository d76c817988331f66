//! In-memory [`KeyStore`] that records every call.
//!
//! Used by tests to check query counts and batch sizes without a database.
//! Insert failures can be injected by call number.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::errors::StoreError;
use super::resolver::{InsertBatch, KeyStore, TableSpec};

#[derive(Debug, Default)]
struct Table {
    next_id: i32,
    rows: HashMap<String, i32>,
}

impl Table {
    fn create(&mut self, key: String) -> i32 {
        self.next_id += 1;
        self.rows.insert(key, self.next_id);
        self.next_id
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<&'static str, Table>,
    lookups: Vec<usize>,
    inserts: Vec<usize>,
    fail_insert_on: Option<usize>,
    fail_lookups: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create rows, as if an earlier run had inserted them.
    pub async fn seed<I, K>(&self, table: &TableSpec, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut state = self.state.lock().await;
        let rows = state.tables.entry(table.table).or_default();
        for key in keys {
            rows.create(key.as_ref().to_owned());
        }
    }

    /// Make the `call`-th insert (1-based, counted across all tables) fail.
    pub async fn fail_insert_on(&self, call: usize) {
        self.state.lock().await.fail_insert_on = Some(call);
    }

    pub async fn fail_lookups(&self, fail: bool) {
        self.state.lock().await.fail_lookups = fail;
    }

    pub async fn lookup_calls(&self) -> usize {
        self.state.lock().await.lookups.len()
    }

    /// Number of keys passed to each lookup, in call order.
    pub async fn lookup_sizes(&self) -> Vec<usize> {
        self.state.lock().await.lookups.clone()
    }

    pub async fn insert_calls(&self) -> usize {
        self.state.lock().await.inserts.len()
    }

    /// Number of rows passed to each insert, in call order. Failed inserts
    /// are included.
    pub async fn insert_sizes(&self) -> Vec<usize> {
        self.state.lock().await.inserts.clone()
    }

    /// Rows currently stored in `table`.
    pub async fn rows(&self, table: &TableSpec) -> HashMap<String, i32> {
        self.state
            .lock()
            .await
            .tables
            .get(table.table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

fn injected(message: impl Into<String>) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(message.into()))
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn lookup(
        &self,
        table: &TableSpec,
        keys: &[String],
    ) -> Result<Vec<(i32, String)>, StoreError> {
        let mut state = self.state.lock().await;
        state.lookups.push(keys.len());
        if state.fail_lookups {
            return Err(injected(format!("lookup on {} failed", table.table)));
        }

        let Some(rows) = state.tables.get(table.table) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|key| rows.rows.get(key).map(|&id| (id, key.clone())))
            .collect())
    }

    async fn insert(
        &self,
        table: &TableSpec,
        batch: &InsertBatch,
    ) -> Result<Vec<(i32, String)>, StoreError> {
        batch.validate(table)?;
        let key_offset = batch.key_offset(table)?;

        let mut state = self.state.lock().await;
        state.inserts.push(batch.rows);
        if state.fail_insert_on == Some(state.inserts.len()) {
            return Err(injected(format!("insert into {} failed", table.table)));
        }

        let keys: Vec<String> = batch
            .rows()
            .map(|row| row[key_offset].as_text().unwrap_or_default().to_owned())
            .collect();

        let rows = state.tables.entry(table.table).or_default();
        if let Some(dup) = keys.iter().find(|key| rows.rows.contains_key(*key)) {
            return Err(injected(format!(
                "duplicate key value violates unique constraint: {}.{} = {dup}",
                table.table, table.key_column
            )));
        }

        Ok(keys
            .into_iter()
            .map(|key| (rows.create(key.clone()), key))
            .collect())
    }
}
