//! Natural key to surrogate key resolution with get-or-create semantics.
//!
//! A [`KeyResolver`] fronts one table. Lookups are cache-first; misses are
//! fetched in a single bulk query and cached. [`KeyResolver::resolve_or_create`]
//! additionally inserts every entity that is still missing, again in one
//! statement, and caches the returned ids.
//!
//! Two concurrent `resolve_or_create` calls missing the same key may both
//! insert it. The table's unique constraint on the key column rejects the
//! loser, and that error is returned to the caller unchanged.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::errors::StoreError;

/// A single bound parameter of an insert. `None` binds SQL `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i32>),
    Text(Option<String>),
    Real(Option<f32>),
    Date(Option<NaiveDate>),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(Some(value.into()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => value.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One value, one placeholder.
    Scalar,
    /// Two values rendered as `point($a, $b)`.
    Point,
}

/// An insertable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub column: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn scalar(column: &'static str) -> Self {
        Self {
            column,
            kind: FieldKind::Scalar,
        }
    }

    pub const fn point(column: &'static str) -> Self {
        Self {
            column,
            kind: FieldKind::Point,
        }
    }

    /// Number of values this field consumes per row.
    pub const fn arity(&self) -> usize {
        match self.kind {
            FieldKind::Scalar => 1,
            FieldKind::Point => 2,
        }
    }
}

/// Values per row for a field list.
pub fn row_arity(fields: &[Field]) -> usize {
    fields.iter().map(Field::arity).sum()
}

/// Table identity: name, surrogate key column and natural key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: &'static str,
    pub id_column: &'static str,
    pub key_column: &'static str,
}

/// An entity that can be created by a [`KeyResolver`].
pub trait Loadable: Send + Sync {
    /// Columns written on insert, in projection order. Must include the
    /// table's key column.
    fn fields() -> &'static [Field];

    fn natural_key(&self) -> &str;

    /// Append this entity's values in [`fields`](Self::fields) order.
    fn project_values(&self, out: &mut Vec<SqlValue>);
}

/// Row-major values for one multi-row insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBatch {
    pub fields: &'static [Field],
    pub rows: usize,
    pub values: Vec<SqlValue>,
}

impl InsertBatch {
    /// Project the entities whose natural key is in `filter`. When several
    /// entities share a key only the first is projected.
    pub fn project<T: Loadable>(entities: &[T], filter: &HashSet<&str>) -> Self {
        let mut seen = HashSet::with_capacity(filter.len());
        let mut values = Vec::with_capacity(filter.len() * row_arity(T::fields()));
        let mut rows = 0;

        for entity in entities {
            let key = entity.natural_key();
            if filter.contains(key) && seen.insert(key) {
                entity.project_values(&mut values);
                rows += 1;
            }
        }

        Self {
            fields: T::fields(),
            rows,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Check the value count against the field list.
    pub fn validate(&self, table: &TableSpec) -> Result<(), StoreError> {
        let expected = self.rows * row_arity(self.fields);
        if self.values.len() != expected {
            return Err(StoreError::FieldCount {
                table: table.table,
                rows: self.rows,
                expected,
                got: self.values.len(),
            });
        }
        Ok(())
    }

    /// Iterate rows as value slices. Call [`validate`](Self::validate) first.
    pub fn rows(&self) -> impl Iterator<Item = &[SqlValue]> {
        self.values.chunks(row_arity(self.fields).max(1))
    }

    /// Offset of the key column within a row.
    pub fn key_offset(&self, table: &TableSpec) -> Result<usize, StoreError> {
        let mut offset = 0;
        for field in self.fields {
            if field.column == table.key_column && field.kind == FieldKind::Scalar {
                return Ok(offset);
            }
            offset += field.arity();
        }
        Err(StoreError::MissingKeyColumn {
            table: table.table,
            column: table.key_column,
        })
    }
}

/// Bulk persistence used by [`KeyResolver`].
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// `SELECT id, key FROM table WHERE key IN (keys)`. Keys without a row are
    /// simply absent from the result.
    async fn lookup(
        &self,
        table: &TableSpec,
        keys: &[String],
    ) -> Result<Vec<(i32, String)>, StoreError>;

    /// Multi-row insert returning `(id, key)` for every created row.
    async fn insert(
        &self,
        table: &TableSpec,
        batch: &InsertBatch,
    ) -> Result<Vec<(i32, String)>, StoreError>;
}

/// Cache-backed natural key resolver for one table.
pub struct KeyResolver<S> {
    table: TableSpec,
    store: Arc<S>,
    cache: RwLock<HashMap<String, i32>>,
}

impl<S: KeyStore> KeyResolver<S> {
    pub fn new(table: TableSpec, store: Arc<S>) -> Self {
        Self {
            table,
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Resolve natural keys to surrogate keys. Duplicates are collapsed and
    /// unknown keys are absent from the returned map.
    pub async fn resolve<I, K>(&self, keys: I) -> Result<HashMap<String, i32>, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let unique: BTreeSet<String> = keys
            .into_iter()
            .map(|key| key.as_ref().to_owned())
            .collect();
        let mut resolved = HashMap::with_capacity(unique.len());
        if unique.is_empty() {
            return Ok(resolved);
        }

        let mut misses = Vec::new();
        {
            let cache = self.cache.read().await;
            for key in unique {
                match cache.get(&key) {
                    Some(&id) => {
                        resolved.insert(key, id);
                    }
                    None => misses.push(key),
                }
            }
        }

        if misses.is_empty() {
            trace!(table = self.table.table, hits = resolved.len(), "resolved from cache");
            return Ok(resolved);
        }

        let found = self.store.lookup(&self.table, &misses).await?;
        debug!(
            table = self.table.table,
            hits = resolved.len(),
            misses = misses.len(),
            found = found.len(),
            "looked up missing keys"
        );
        self.merge(found, &mut resolved).await;

        Ok(resolved)
    }

    pub async fn resolve_one(&self, key: &str) -> Result<Option<i32>, StoreError> {
        Ok(self.resolve([key]).await?.remove(key))
    }

    /// Resolve every entity's natural key, inserting the ones that do not
    /// exist yet. The returned map covers every input entity on success.
    pub async fn resolve_or_create<T: Loadable>(
        &self,
        entities: &[T],
    ) -> Result<HashMap<String, i32>, StoreError> {
        let mut resolved = self.resolve(entities.iter().map(T::natural_key)).await?;

        let missing: HashSet<&str> = entities
            .iter()
            .map(T::natural_key)
            .filter(|key| !resolved.contains_key(*key))
            .collect();
        if missing.is_empty() {
            return Ok(resolved);
        }

        let batch = InsertBatch::project(entities, &missing);
        let inserted = self.store.insert(&self.table, &batch).await?;
        debug!(
            table = self.table.table,
            requested = batch.rows,
            inserted = inserted.len(),
            "created missing rows"
        );
        self.merge(inserted, &mut resolved).await;

        Ok(resolved)
    }

    /// Merge store rows into the cache and the result. A key already cached
    /// keeps its id.
    async fn merge(&self, rows: Vec<(i32, String)>, resolved: &mut HashMap<String, i32>) {
        let mut cache = self.cache.write().await;
        for (id, key) in rows {
            let id = *cache.entry(key.clone()).or_insert(id);
            resolved.insert(key, id);
        }
    }
}
