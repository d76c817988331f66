//! Timezones are reference data. They are only ever looked up, never created.

use std::sync::Arc;

use super::resolver::{KeyResolver, KeyStore, TableSpec};

pub const TIMEZONES: TableSpec = TableSpec {
    table: "timezones",
    id_column: "timezone_id",
    key_column: "name",
};

pub fn timezone_resolver<S: KeyStore>(store: Arc<S>) -> KeyResolver<S> {
    KeyResolver::new(TIMEZONES, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;

    #[tokio::test]
    async fn missing_timezones_are_absent() {
        let store = Arc::new(MemoryStore::new());
        store.seed(&TIMEZONES, ["Europe/Moscow"]).await;
        let resolver = timezone_resolver(store);

        let resolved = resolver
            .resolve(["Europe/Moscow", "Asia/Yekaterinburg"])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("Europe/Moscow"));
    }
}
