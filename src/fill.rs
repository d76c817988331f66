//! Fill phase: load cached documents into the database.
//!
//! Entities are written parents first: timezones must already exist, cities
//! are created before the cinemas that reference them, and movies before the
//! sessions that reference them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use chrono::NaiveDate;
use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::afisha::EventPages;
use crate::afisha::models::City;
use crate::data::cities::{CityData, city_resolver};
use crate::data::movies::{MovieData, movie_resolver, repertory_index};
use crate::data::places::{CINEMA_CHUNK_SIZE, CinemaData, cinema_resolver};
use crate::data::sessions::{SESSION_CHUNK_SIZE, Session, SessionCollector};
use crate::data::timezones::timezone_resolver;
use crate::data::{ChunkSink, KeyResolver, KeyStore, upsert_in_chunks};
use crate::documents::DocumentStore;
use crate::utils::{fmt_duration, fmt_preview};

/// Movies per insert statement.
pub const MOVIE_CHUNK_SIZE: usize = 500;

const PREVIEW: usize = 10;

/// One resolver per keyed table, sharing a store. Caches live as long as
/// this value.
pub struct Loaders<S> {
    pub timezones: KeyResolver<S>,
    pub cities: KeyResolver<S>,
    pub cinemas: KeyResolver<S>,
    pub movies: KeyResolver<S>,
}

impl<S: KeyStore> Loaders<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            timezones: timezone_resolver(store.clone()),
            cities: city_resolver(store.clone()),
            cinemas: cinema_resolver(store.clone()),
            movies: movie_resolver(store),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlacesReport {
    pub cities: usize,
    pub cinemas: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionsReport {
    pub movies: usize,
    pub pages_failed: usize,
    pub sessions: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Load every cached place: cities first, then cinemas in chunks.
pub async fn fill_places<S: KeyStore>(
    docs: &DocumentStore,
    loaders: &Loaders<S>,
) -> anyhow::Result<PlacesReport> {
    let start = Instant::now();
    let places = docs.load_places()?;
    if places.is_empty() {
        warn!(root = %docs.root().display(), "no cached places, nothing to fill");
        return Ok(PlacesReport::default());
    }

    let mut cities: BTreeMap<&str, &City> = BTreeMap::new();
    for place in &places {
        cities.entry(place.city.id.as_str()).or_insert(&place.city);
    }

    let timezone_names: BTreeSet<&str> = cities.values().map(|c| c.timezone.as_str()).collect();
    let timezones = loaders.timezones.resolve(&timezone_names).await?;
    let unknown: Vec<&str> = timezone_names
        .iter()
        .copied()
        .filter(|name| !timezones.contains_key(*name))
        .collect();
    if !unknown.is_empty() {
        bail!(
            "{} timezone(s) missing from the timezones table: {}",
            unknown.len(),
            fmt_preview(&unknown, PREVIEW)
        );
    }

    let city_rows: Vec<CityData> = cities
        .values()
        .filter_map(|city| {
            timezones
                .get(&city.timezone)
                .map(|tz| CityData::from_vendor(city, *tz))
        })
        .collect();
    let city_ids = loaders.cities.resolve_or_create(&city_rows).await?;
    info!(cities = city_ids.len(), "cities resolved");

    let mut cinema_rows = Vec::with_capacity(places.len());
    for place in &places {
        let Some(city_id) = city_ids.get(&place.city.id) else {
            bail!("city {} of place {} was not resolved", place.city.id, place.id);
        };
        cinema_rows.push(CinemaData::from_place(place, *city_id));
    }

    let chunks = upsert_in_chunks(&cinema_rows, CINEMA_CHUNK_SIZE, &loaders.cinemas).await?;
    let report = PlacesReport {
        cities: city_ids.len(),
        cinemas: loaders.cinemas.cached_len().await,
    };
    info!(
        cities = report.cities,
        cinemas = report.cinemas,
        chunks,
        duration = fmt_duration(start.elapsed()),
        "places filled"
    );
    Ok(report)
}

/// Load movies and sessions from the schedules cached for `date`.
///
/// Cinemas and cities must already be in the database. Movies missing from
/// the database are enriched from their event page; a failed page falls back
/// to the API data.
pub async fn fill_sessions<S, P, W>(
    docs: &DocumentStore,
    loaders: &Loaders<S>,
    pages: &P,
    writer: &W,
    date: NaiveDate,
    concurrency: usize,
) -> anyhow::Result<SessionsReport>
where
    S: KeyStore,
    P: EventPages + ?Sized,
    W: ChunkSink<Session> + ?Sized,
{
    let start = Instant::now();
    let schedules = docs.load_schedules(date)?;
    if schedules.is_empty() {
        warn!(date = %date, "no cached schedules for date, nothing to fill");
        return Ok(SessionsReport::default());
    }

    let cinema_ids = loaders
        .cinemas
        .resolve(schedules.iter().map(|doc| doc.place_id.as_str()))
        .await?;
    let city_ids = loaders
        .cities
        .resolve(schedules.iter().map(|doc| doc.city.as_str()))
        .await?;

    let mut collector = SessionCollector::new();
    for doc in &schedules {
        let (Some(cinema_id), Some(city_id)) =
            (cinema_ids.get(&doc.place_id), city_ids.get(&doc.city))
        else {
            bail!(
                "place {} in city {} is not in the database; run `fill places` first",
                doc.place_id,
                doc.city
            );
        };
        collector.add_schedule(*city_id, *cinema_id, &doc.items);
    }

    let repertory = repertory_index(&docs.load_repertories()?);
    let catalog = collector.events_mut();
    catalog.enrich(&repertory);
    debug!(events = catalog.len(), "events collected");

    let known = loaders.movies.resolve(catalog.ids()).await?;
    let new_events: Vec<_> = catalog.iter().filter(|(id, _)| !known.contains_key(*id)).collect();
    info!(
        known = known.len(),
        new = new_events.len(),
        "fetching event pages for new movies"
    );

    let built: Vec<(MovieData, bool)> = stream::iter(new_events)
        .map(|(id, info)| async move {
            match pages.event_page(id, &info.url).await {
                Ok(page) => (MovieData::build(id, info, Some(&page)), true),
                Err(e) => {
                    warn!(event = id, error = ?e, "event page unavailable, using API data");
                    (MovieData::build(id, info, None), false)
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    let pages_failed = built.iter().filter(|(_, ok)| !ok).count();
    let mut movies: Vec<MovieData> = built.into_iter().map(|(movie, _)| movie).collect();
    movies.sort_by(|a, b| a.event_id.cmp(&b.event_id));

    upsert_in_chunks(&movies, MOVIE_CHUNK_SIZE, &loaders.movies).await?;
    let movie_ids: HashMap<String, i32> = loaders.movies.resolve(catalog.ids()).await?;

    let duplicates = collector.duplicates();
    let skipped = collector.skipped();
    let (sessions, missing) = collector.finish(&movie_ids);
    if !missing.is_empty() {
        bail!(
            "{} event(s) have no movie row: {}",
            missing.len(),
            fmt_preview(&missing, PREVIEW)
        );
    }

    upsert_in_chunks(&sessions, SESSION_CHUNK_SIZE, writer).await?;

    let report = SessionsReport {
        movies: movies.len(),
        pages_failed,
        sessions: sessions.len(),
        duplicates,
        skipped,
    };
    info!(
        date = %date,
        movies = report.movies,
        pages_failed = report.pages_failed,
        sessions = report.sessions,
        duplicates = report.duplicates,
        skipped = report.skipped,
        duration = fmt_duration(start.elapsed()),
        "sessions filled"
    );
    Ok(report)
}
