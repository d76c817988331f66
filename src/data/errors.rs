//! Persistence errors shared by every key store and sink.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("failed to encode rows for {table}")]
    Encode {
        table: &'static str,
        #[source]
        source: csv::Error,
    },
    #[error("{table}: batch of {rows} rows needs {expected} values, got {got}")]
    FieldCount {
        table: &'static str,
        rows: usize,
        expected: usize,
        got: usize,
    },
    #[error("{table}: key column `{column}` is not among the inserted fields")]
    MissingKeyColumn {
        table: &'static str,
        column: &'static str,
    },
}
