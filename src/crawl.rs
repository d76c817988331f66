//! Crawl phase: fetch full paginated listings and cache them as documents.
//!
//! Cities (and, for schedules, places) are crawled concurrently up to a
//! bound; each paginated resource is still fetched page by page. A failed
//! resource is logged and skipped.

use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::{StreamExt, stream};
use tracing::{info, warn};

use crate::afisha::models::{Place, RepertoryItem, ScheduleItem};
use crate::afisha::{
    AfishaApi, AfishaApiError, PagingError, PlacesParams, RepertoryParams, ScheduleCinemaParams,
};
use crate::documents::DocumentStore;
use crate::utils::fmt_duration;

pub type FetchResult<T> = Result<Vec<T>, PagingError<AfishaApiError>>;

/// Full (all pages) listings the crawler needs.
#[async_trait(?Send)]
pub trait CrawlSource: Send + Sync {
    async fn repertory(&self, city: &str, limit: usize) -> FetchResult<RepertoryItem>;

    async fn places(&self, city: &str, limit: usize) -> FetchResult<Place>;

    async fn place_schedule(
        &self,
        city: &str,
        place_id: &str,
        date: NaiveDate,
        limit: usize,
    ) -> FetchResult<ScheduleItem>;
}

#[async_trait(?Send)]
impl CrawlSource for AfishaApi {
    async fn repertory(&self, city: &str, limit: usize) -> FetchResult<RepertoryItem> {
        let params = RepertoryParams {
            city: city.to_string(),
            limit,
            ..Default::default()
        };
        Ok(self.get_repertory_full(&params).await?.data)
    }

    async fn places(&self, city: &str, limit: usize) -> FetchResult<Place> {
        let params = PlacesParams {
            city: city.to_string(),
            limit,
            offset: 0,
        };
        Ok(self.get_places_full(&params).await?.items)
    }

    async fn place_schedule(
        &self,
        city: &str,
        place_id: &str,
        date: NaiveDate,
        limit: usize,
    ) -> FetchResult<ScheduleItem> {
        let params = ScheduleCinemaParams {
            place_id: Some(place_id.to_string()),
            city: Some(city.to_string()),
            date,
            limit,
            ..Default::default()
        };
        Ok(self.get_schedule_cinema_full(&params).await?.items)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlOptions {
    pub page_limit: usize,
    pub concurrency: usize,
}

/// Outcome of one crawl step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    pub saved: usize,
    pub failed: usize,
}

impl CrawlReport {
    fn from_outcomes(outcomes: &[bool]) -> Self {
        let saved = outcomes.iter().filter(|ok| **ok).count();
        Self {
            saved,
            failed: outcomes.len() - saved,
        }
    }
}

/// Fetch every city's repertory into `repertories/<city>.json`.
pub async fn crawl_repertories<C: CrawlSource + ?Sized>(
    source: &C,
    docs: &DocumentStore,
    cities: &[String],
    options: CrawlOptions,
) -> CrawlReport {
    let start = Instant::now();
    let outcomes: Vec<bool> = stream::iter(cities)
        .map(|city| async move {
            let items = match source.repertory(city, options.page_limit).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(city = %city, error = ?e, "failed to fetch repertory, skipping");
                    return false;
                }
            };
            match docs.write_repertory(city, &items) {
                Ok(()) => {
                    info!(city = %city, events = items.len(), "repertory saved");
                    true
                }
                Err(e) => {
                    warn!(city = %city, error = ?e, "failed to save repertory, skipping");
                    false
                }
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let report = CrawlReport::from_outcomes(&outcomes);
    info!(
        saved = report.saved,
        failed = report.failed,
        duration = fmt_duration(start.elapsed()),
        "repertories crawled"
    );
    report
}

/// Fetch every city's cinemas into `places/<city>.json`.
pub async fn crawl_places<C: CrawlSource + ?Sized>(
    source: &C,
    docs: &DocumentStore,
    cities: &[String],
    options: CrawlOptions,
) -> CrawlReport {
    let start = Instant::now();
    let outcomes: Vec<bool> = stream::iter(cities)
        .map(|city| async move {
            let places = match source.places(city, options.page_limit).await {
                Ok(places) => places,
                Err(e) => {
                    warn!(city = %city, error = ?e, "failed to fetch places, skipping");
                    return false;
                }
            };
            match docs.write_places(city, &places) {
                Ok(()) => {
                    info!(city = %city, places = places.len(), "places saved");
                    true
                }
                Err(e) => {
                    warn!(city = %city, error = ?e, "failed to save places, skipping");
                    false
                }
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let report = CrawlReport::from_outcomes(&outcomes);
    info!(
        saved = report.saved,
        failed = report.failed,
        duration = fmt_duration(start.elapsed()),
        "places crawled"
    );
    report
}

/// Fetch the schedule of every cached place for `date` into
/// `schedule/<date>/<city>/<place>.json`.
pub async fn crawl_schedules<C: CrawlSource + ?Sized>(
    source: &C,
    docs: &DocumentStore,
    date: NaiveDate,
    options: CrawlOptions,
) -> anyhow::Result<CrawlReport> {
    let start = Instant::now();
    let places = docs.load_places()?;
    info!(date = %date, places = places.len(), "crawling place schedules");

    let total = places.len();
    let outcomes: Vec<bool> = stream::iter(places.iter().enumerate())
        .map(|(index, place)| async move {
            let city = place.city.id.as_str();
            let place_id = place.id.as_str();
            let items = match source
                .place_schedule(city, place_id, date, options.page_limit)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    warn!(city, place = place_id, error = ?e, "failed to fetch schedule, skipping");
                    return false;
                }
            };
            match docs.write_schedule(date, city, place_id, &items) {
                Ok(()) => {
                    info!(
                        progress = format!("{}/{total}", index + 1),
                        city,
                        place = place_id,
                        title = %place.title,
                        items = items.len(),
                        "schedule saved"
                    );
                    true
                }
                Err(e) => {
                    warn!(city, place = place_id, error = ?e, "failed to save schedule, skipping");
                    false
                }
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let report = CrawlReport::from_outcomes(&outcomes);
    info!(
        date = %date,
        saved = report.saved,
        failed = report.failed,
        duration = fmt_duration(start.elapsed()),
        "schedules crawled"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afisha::models::{City, Event};
    use std::sync::Mutex;

    /// Serves canned listings; cities named `broken` fail.
    #[derive(Default)]
    struct FakeSource {
        schedule_calls: Mutex<Vec<(String, String)>>,
    }

    fn place(id: &str, city: &str) -> Place {
        Place {
            id: id.into(),
            city: City {
                id: city.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn stall() -> PagingError<AfishaApiError> {
        PagingError::UnexpectedStop {
            offset: 20,
            total: 40,
        }
    }

    #[async_trait(?Send)]
    impl CrawlSource for FakeSource {
        async fn repertory(&self, city: &str, _limit: usize) -> FetchResult<RepertoryItem> {
            if city == "broken" {
                return Err(stall());
            }
            Ok(vec![RepertoryItem {
                event: Event {
                    id: format!("{city}-ev"),
                    ..Default::default()
                },
                ..Default::default()
            }])
        }

        async fn places(&self, city: &str, _limit: usize) -> FetchResult<Place> {
            if city == "broken" {
                return Err(stall());
            }
            Ok(vec![place(&format!("{city}-1"), city), place(&format!("{city}-2"), city)])
        }

        async fn place_schedule(
            &self,
            city: &str,
            place_id: &str,
            _date: NaiveDate,
            _limit: usize,
        ) -> FetchResult<ScheduleItem> {
            self.schedule_calls
                .lock()
                .unwrap()
                .push((city.to_string(), place_id.to_string()));
            if place_id.ends_with("-2") {
                return Err(PagingError::Fetch(AfishaApiError::InvalidRequest("nope")));
            }
            Ok(vec![ScheduleItem::default()])
        }
    }

    const OPTIONS: CrawlOptions = CrawlOptions {
        page_limit: 20,
        concurrency: 2,
    };

    #[tokio::test]
    async fn failed_cities_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let docs = DocumentStore::new(dir.path());
        let cities = vec!["moscow".to_string(), "broken".to_string(), "kazan".to_string()];

        let report = crawl_repertories(&FakeSource::default(), &docs, &cities, OPTIONS).await;
        assert_eq!(report, CrawlReport { saved: 2, failed: 1 });
        assert_eq!(docs.load_repertories().unwrap().len(), 2);
        assert!(!docs.repertory_path("broken").exists());
    }

    #[tokio::test]
    async fn schedules_follow_cached_places() {
        let dir = tempfile::tempdir().unwrap();
        let docs = DocumentStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2018, 10, 12).unwrap();
        let source = FakeSource::default();
        let cities = vec!["moscow".to_string(), "kazan".to_string()];

        let places = crawl_places(&source, &docs, &cities, OPTIONS).await;
        assert_eq!(places.saved, 2);

        let report = crawl_schedules(&source, &docs, date, OPTIONS).await.unwrap();
        assert_eq!(report, CrawlReport { saved: 2, failed: 2 });
        assert_eq!(source.schedule_calls.lock().unwrap().len(), 4);

        assert!(docs.schedule_path(date, "moscow", "moscow-1").exists());
        assert!(!docs.schedule_path(date, "moscow", "moscow-2").exists());
        assert_eq!(docs.load_schedules(date).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn api_client_drives_the_crawl() {
        let api = AfishaApi::new(
            "https://afisha.yandex.ru/api/",
            "https://afisha.yandex.ru/",
            5,
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let docs = DocumentStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2018, 10, 12).unwrap();

        // nothing to fetch, so no request leaves the process
        assert_eq!(crawl_repertories(&api, &docs, &[], OPTIONS).await, CrawlReport::default());
        assert_eq!(crawl_places(&api, &docs, &[], OPTIONS).await, CrawlReport::default());
        assert_eq!(
            crawl_schedules(&api, &docs, date, OPTIONS).await.unwrap(),
            CrawlReport::default()
        );
    }
}
