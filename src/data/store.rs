//! Postgres-backed [`KeyStore`].

use std::time::Instant;

use async_trait::async_trait;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::trace;

use super::errors::StoreError;
use super::resolver::{FieldKind, InsertBatch, KeyStore, SqlValue, TableSpec, row_arity};
use crate::utils::fmt_duration;

/// Key store over a shared connection pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Build `INSERT INTO table (cols) VALUES (...), (...) RETURNING id, key`.
pub fn build_insert<'args>(table: &TableSpec, batch: &InsertBatch) -> QueryBuilder<'args, Postgres> {
    let columns = batch
        .fields
        .iter()
        .map(|field| field.column)
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder = QueryBuilder::new(format!("INSERT INTO {} ({columns}) ", table.table));
    builder.push_values(batch.rows(), |mut row, values| {
        let mut values = values.iter();
        for field in batch.fields {
            match field.kind {
                FieldKind::Scalar => {
                    if let Some(value) = values.next() {
                        push_bind(&mut row, value, true);
                    }
                }
                FieldKind::Point => {
                    row.push("point(");
                    if let Some(value) = values.next() {
                        push_bind(&mut row, value, false);
                    }
                    row.push_unseparated(", ");
                    if let Some(value) = values.next() {
                        push_bind(&mut row, value, false);
                    }
                    row.push_unseparated(")");
                }
            }
        }
    });
    builder.push(format!(" RETURNING {}, {}", table.id_column, table.key_column));
    builder
}

fn push_bind(row: &mut Separated<'_, '_, Postgres, &'static str>, value: &SqlValue, separated: bool) {
    match (value.clone(), separated) {
        (SqlValue::Int(v), true) => row.push_bind(v),
        (SqlValue::Int(v), false) => row.push_bind_unseparated(v),
        (SqlValue::Text(v), true) => row.push_bind(v),
        (SqlValue::Text(v), false) => row.push_bind_unseparated(v),
        (SqlValue::Real(v), true) => row.push_bind(v),
        (SqlValue::Real(v), false) => row.push_bind_unseparated(v),
        (SqlValue::Date(v), true) => row.push_bind(v),
        (SqlValue::Date(v), false) => row.push_bind_unseparated(v),
    };
}

#[async_trait]
impl KeyStore for PgStore {
    async fn lookup(
        &self,
        table: &TableSpec,
        keys: &[String],
    ) -> Result<Vec<(i32, String)>, StoreError> {
        let start = Instant::now();
        let sql = format!(
            "SELECT {id}, {key} FROM {table} WHERE {key} = ANY($1)",
            id = table.id_column,
            key = table.key_column,
            table = table.table,
        );
        let rows: Vec<(i32, String)> = sqlx::query_as(&sql)
            .bind(keys)
            .fetch_all(&self.pool)
            .await?;

        trace!(
            table = table.table,
            keys = keys.len(),
            found = rows.len(),
            duration = fmt_duration(start.elapsed()),
            "bulk lookup"
        );
        Ok(rows)
    }

    async fn insert(
        &self,
        table: &TableSpec,
        batch: &InsertBatch,
    ) -> Result<Vec<(i32, String)>, StoreError> {
        batch.validate(table)?;
        batch.key_offset(table)?;
        if batch.is_empty() || row_arity(batch.fields) == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let rows: Vec<(i32, String)> = build_insert(table, batch)
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        trace!(
            table = table.table,
            rows = rows.len(),
            duration = fmt_duration(start.elapsed()),
            "bulk insert"
        );
        Ok(rows)
    }
}
