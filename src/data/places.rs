//! Cinemas, keyed by the Afisha place id. Location is stored as a `point`.

use std::sync::Arc;

use super::resolver::{Field, KeyResolver, KeyStore, Loadable, SqlValue, TableSpec};
use crate::afisha::models::Place;

pub const CINEMAS: TableSpec = TableSpec {
    table: "cinemas",
    id_column: "cinema_id",
    key_column: "ya_id",
};

/// Cinemas per insert statement.
pub const CINEMA_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct CinemaData {
    pub city_id: i32,
    pub name: String,
    pub address: String,
    pub lat: f32,
    pub long: f32,
    pub vendor_id: String,
}

impl CinemaData {
    pub fn from_place(place: &Place, city_id: i32) -> Self {
        Self {
            city_id,
            name: place.title.clone(),
            address: place.address.clone(),
            lat: place.coordinates.latitude,
            long: place.coordinates.longitude,
            vendor_id: place.id.clone(),
        }
    }
}

impl Loadable for CinemaData {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::scalar("name"),
            Field::scalar("address"),
            Field::point("loc"),
            Field::scalar("city_id"),
            Field::scalar("ya_id"),
        ];
        FIELDS
    }

    fn natural_key(&self) -> &str {
        &self.vendor_id
    }

    fn project_values(&self, out: &mut Vec<SqlValue>) {
        out.extend([
            SqlValue::text(&self.name),
            SqlValue::text(&self.address),
            SqlValue::Real(Some(self.lat)),
            SqlValue::Real(Some(self.long)),
            SqlValue::Int(Some(self.city_id)),
            SqlValue::text(&self.vendor_id),
        ]);
    }
}

pub fn cinema_resolver<S: KeyStore>(store: Arc<S>) -> KeyResolver<S> {
    KeyResolver::new(CINEMAS, store)
}
