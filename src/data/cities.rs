//! Cities, keyed by the Afisha city id (`moscow`, `saint-petersburg`, ...).

use std::sync::Arc;

use super::resolver::{Field, KeyResolver, KeyStore, Loadable, SqlValue, TableSpec};
use crate::afisha::models::City;

pub const CITIES: TableSpec = TableSpec {
    table: "cities",
    id_column: "city_id",
    key_column: "ya_name",
};

/// Every city Afisha covers is in Russia.
pub const DEFAULT_COUNTRY: &str = "RU";

#[derive(Debug, Clone, PartialEq)]
pub struct CityData {
    pub country_code: String,
    pub name: String,
    pub vendor_id: String,
    pub timezone_id: i32,
}

impl CityData {
    pub fn from_vendor(city: &City, timezone_id: i32) -> Self {
        Self {
            country_code: DEFAULT_COUNTRY.to_string(),
            name: city.name.clone(),
            vendor_id: city.id.clone(),
            timezone_id,
        }
    }
}

impl Loadable for CityData {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::scalar("country_code"),
            Field::scalar("name"),
            Field::scalar("ya_name"),
            Field::scalar("timezone_id"),
        ];
        FIELDS
    }

    fn natural_key(&self) -> &str {
        &self.vendor_id
    }

    fn project_values(&self, out: &mut Vec<SqlValue>) {
        out.extend([
            SqlValue::text(&self.country_code),
            SqlValue::text(&self.name),
            SqlValue::text(&self.vendor_id),
            SqlValue::Int(Some(self.timezone_id)),
        ]);
    }
}

pub fn city_resolver<S: KeyStore>(store: Arc<S>) -> KeyResolver<S> {
    KeyResolver::new(CITIES, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::resolver::row_arity;

    #[test]
    fn projection_matches_fields() {
        let city = City {
            id: "kazan".into(),
            name: "Казань".into(),
            geoid: 43,
            timezone: "Europe/Moscow".into(),
        };
        let data = CityData::from_vendor(&city, 7);

        let mut values = Vec::new();
        data.project_values(&mut values);
        assert_eq!(values.len(), row_arity(CityData::fields()));
        assert_eq!(values[0], SqlValue::text("RU"));
        assert_eq!(values[2], SqlValue::text("kazan"));
        assert_eq!(values[3], SqlValue::Int(Some(7)));
        assert_eq!(data.natural_key(), "kazan");
    }
}
