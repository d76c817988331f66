//! Movies, keyed by the Afisha event id.
//!
//! Movie rows are assembled from three sources in increasing order of
//! preference: schedule documents, repertory documents and the event page.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use super::resolver::{Field, KeyResolver, KeyStore, Loadable, SqlValue, TableSpec};
use crate::afisha::EventPage;
use crate::afisha::models::{Event, RepertoryItem};

pub const MOVIES: TableSpec = TableSpec {
    table: "movies",
    id_column: "movie_id",
    key_column: "ya_event_id",
};

/// What the API documents tell us about an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventInfo {
    pub url: String,
    pub kp_id: Option<i32>,
    pub kp_rating: Option<i32>,
    pub title: Option<String>,
    pub original_title: Option<String>,
}

impl EventInfo {
    pub fn from_event(event: &Event) -> Self {
        let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        let kinopoisk = event.kinopoisk.as_ref();
        Self {
            url: event.url.clone(),
            kp_id: kinopoisk.and_then(|kp| kp.film_id()),
            kp_rating: kinopoisk.and_then(|kp| kp.rating()),
            title: non_empty(&event.title),
            original_title: event.original_title.as_deref().and_then(non_empty),
        }
    }
}

/// Event infos seen in schedule documents, keyed by event id.
#[derive(Debug, Default)]
pub struct EventCatalog {
    events: HashMap<String, EventInfo>,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event. The first sighting wins unless a later one carries a
    /// Kinopoisk id the first one lacked.
    pub fn observe(&mut self, event: &Event) {
        let info = EventInfo::from_event(event);
        match self.events.get_mut(&event.id) {
            Some(existing) if existing.kp_id.is_none() && info.kp_id.is_some() => *existing = info,
            Some(_) => {}
            None => {
                self.events.insert(event.id.clone(), info);
            }
        }
    }

    /// Replace infos with repertory data where the repertory knows the event.
    pub fn enrich(&mut self, repertory: &HashMap<String, EventInfo>) {
        for (id, info) in self.events.iter_mut() {
            if let Some(better) = repertory.get(id) {
                *info = better.clone();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<&EventInfo> {
        self.events.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EventInfo)> {
        self.events.iter().map(|(id, info)| (id.as_str(), info))
    }
}

/// Index repertory items by event id. The first occurrence of an id wins.
pub fn repertory_index<'a>(
    items: impl IntoIterator<Item = &'a RepertoryItem>,
) -> HashMap<String, EventInfo> {
    let mut index = HashMap::new();
    for item in items {
        index
            .entry(item.event.id.clone())
            .or_insert_with(|| EventInfo::from_event(&item.event));
    }
    index
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieData {
    pub event_id: String,
    pub kp_id: Option<i32>,
    pub title_ru: Option<String>,
    pub title_original: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<i32>,
    pub release: Option<NaiveDate>,
    pub age_restriction: Option<i32>,
    pub country_code: Option<String>,
    pub kp_rating: Option<i32>,
}

impl MovieData {
    /// Build a movie row from API info, preferring event page values when a
    /// page is available.
    pub fn build(event_id: &str, info: &EventInfo, page: Option<&EventPage>) -> Self {
        let Some(page) = page else {
            return Self {
                event_id: event_id.to_string(),
                kp_id: info.kp_id,
                title_ru: info.title.clone(),
                title_original: info.original_title.clone(),
                kp_rating: info.kp_rating,
                ..Default::default()
            };
        };

        Self {
            event_id: event_id.to_string(),
            kp_id: page.kp_id.or(info.kp_id),
            title_ru: page.title_ru.clone().or_else(|| info.title.clone()),
            title_original: page
                .title_original
                .clone()
                .or_else(|| info.original_title.clone()),
            year: page.year,
            duration: page.duration,
            release: page.release,
            age_restriction: page.age_restriction,
            country_code: None,
            kp_rating: page.kp_rating.or(info.kp_rating),
        }
    }
}

impl Loadable for MovieData {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::scalar("ya_event_id"),
            Field::scalar("kp_id"),
            Field::scalar("title_ru"),
            Field::scalar("title_or"),
            Field::scalar("year"),
            Field::scalar("duration"),
            Field::scalar("release"),
            Field::scalar("age_restriction"),
            Field::scalar("country_code"),
            Field::scalar("kp_rating"),
        ];
        FIELDS
    }

    fn natural_key(&self) -> &str {
        &self.event_id
    }

    fn project_values(&self, out: &mut Vec<SqlValue>) {
        out.extend([
            SqlValue::text(&self.event_id),
            SqlValue::Int(self.kp_id),
            SqlValue::Text(self.title_ru.clone()),
            SqlValue::Text(self.title_original.clone()),
            SqlValue::Int(self.year),
            SqlValue::Int(self.duration),
            SqlValue::Date(self.release),
            SqlValue::Int(self.age_restriction),
            SqlValue::Text(self.country_code.clone()),
            SqlValue::Int(self.kp_rating),
        ]);
    }
}

pub fn movie_resolver<S: KeyStore>(store: Arc<S>) -> KeyResolver<S> {
    KeyResolver::new(MOVIES, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afisha::models::KinopoiskScore;
    use crate::data::resolver::row_arity;

    fn event(id: &str, kp_url: Option<&str>) -> Event {
        Event {
            id: id.into(),
            url: format!("/moscow/cinema/{id}"),
            title: "Веном".into(),
            original_title: Some("".into()),
            kinopoisk: kp_url.map(|url| KinopoiskScore {
                url: Some(url.into()),
                value: Some(6.9),
                votes: None,
            }),
        }
    }

    #[test]
    fn info_from_event_drops_empty_titles() {
        let info = EventInfo::from_event(&event("ev1", Some("https://www.kinopoisk.ru/film/843650/")));
        assert_eq!(info.kp_id, Some(843650));
        assert_eq!(info.kp_rating, Some(690));
        assert_eq!(info.title.as_deref(), Some("Веном"));
        assert_eq!(info.original_title, None);
    }

    #[test]
    fn catalog_prefers_sightings_with_kinopoisk_id() {
        let mut catalog = EventCatalog::new();
        catalog.observe(&event("ev1", None));
        catalog.observe(&event("ev1", Some("https://www.kinopoisk.ru/film/1/")));
        catalog.observe(&event("ev1", Some("https://www.kinopoisk.ru/film/2/")));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("ev1").unwrap().kp_id, Some(1));
    }

    #[test]
    fn repertory_overrides_schedule_info() {
        let mut catalog = EventCatalog::new();
        catalog.observe(&event("ev1", None));
        catalog.observe(&event("ev2", None));

        let items = [RepertoryItem {
            event: Event {
                title: "Звезда родилась".into(),
                ..event("ev1", Some("https://www.kinopoisk.ru/film/3/"))
            },
            ..Default::default()
        }];
        catalog.enrich(&repertory_index(&items));

        assert_eq!(catalog.get("ev1").unwrap().kp_id, Some(3));
        assert_eq!(catalog.get("ev1").unwrap().title.as_deref(), Some("Звезда родилась"));
        assert_eq!(catalog.get("ev2").unwrap().kp_id, None);
    }

    #[test]
    fn page_values_win_with_api_fallback() {
        let info = EventInfo {
            url: "/moscow/cinema/venom".into(),
            kp_id: Some(843650),
            kp_rating: Some(690),
            title: Some("Веном".into()),
            original_title: Some("Venom".into()),
        };
        let page = EventPage {
            event_id: "ev1".into(),
            title_ru: Some("Веном (2018)".into()),
            year: Some(2018),
            duration: Some(112),
            ..Default::default()
        };

        let movie = MovieData::build("ev1", &info, Some(&page));
        assert_eq!(movie.kp_id, Some(843650));
        assert_eq!(movie.title_ru.as_deref(), Some("Веном (2018)"));
        assert_eq!(movie.title_original.as_deref(), Some("Venom"));
        assert_eq!(movie.year, Some(2018));
        assert_eq!(movie.kp_rating, Some(690));

        let fallback = MovieData::build("ev1", &info, None);
        assert_eq!(fallback.title_ru.as_deref(), Some("Веном"));
        assert_eq!(fallback.year, None);
    }

    #[test]
    fn projection_matches_fields() {
        let mut values = Vec::new();
        MovieData::build("ev1", &EventInfo::default(), None).project_values(&mut values);
        assert_eq!(values.len(), row_arity(MovieData::fields()));
        assert_eq!(values[0], SqlValue::text("ev1"));
        assert_eq!(values[6], SqlValue::Date(None));
    }
}
