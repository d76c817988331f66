//! Afisha event page scraper.
//!
//! The JSON API lacks most movie metadata (year, duration, premiere date, age
//! rating), so it is read from the event's HTML page instead. The page is
//! served with a captcha wall unless the `bltsr` cookie is present.

use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use reqwest::header::COOKIE;
use tracing::{debug, warn};

use super::api::AfishaApi;
use super::errors::AfishaApiError;
use crate::utils::fmt_duration;

static KINOPOISK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"kinopoisk\.ru/film/(\d+)").expect("valid kinopoisk regex"));
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) мин\.").expect("valid duration regex"));

static AGE_SEL: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class="event-heading__content-rating"]"#));
static RATING_SEL: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class="arrow__text"]"#));
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class="event-heading__title"]"#));
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class="event-attributes__row"]"#));
static CATEGORY_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[class="event-attributes__category"]"#));
static VALUE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[class="event-attributes__category-value"]"#));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

/// Movie metadata scraped from an event page. Every field is optional since
/// pages routinely omit attribute rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub event_id: String,
    pub kp_id: Option<i32>,
    pub title_ru: Option<String>,
    pub title_original: Option<String>,
    pub year: Option<i32>,
    /// Minutes.
    pub duration: Option<i32>,
    pub release: Option<NaiveDate>,
    pub age_restriction: Option<i32>,
    /// Hundredths, like [`KinopoiskScore::rating`](super::models::KinopoiskScore::rating).
    pub kp_rating: Option<i32>,
}

/// Source of event pages. Implemented by [`AfishaApi`]; the loader only sees
/// this trait.
#[async_trait]
pub trait EventPages: Send + Sync {
    /// Fetch and parse the page at `url` (relative to the site root).
    async fn event_page(&self, event_id: &str, url: &str) -> Result<EventPage, AfishaApiError>;
}

#[async_trait]
impl EventPages for AfishaApi {
    async fn event_page(&self, event_id: &str, url: &str) -> Result<EventPage, AfishaApiError> {
        let url = self.site_base.join(url.trim_start_matches('/'))?;
        self.throttle().await;

        let start = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .header(COOKIE, "bltsr=1")
            .send()
            .await
            .map_err(|source| AfishaApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(AfishaApiError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| AfishaApiError::Transport {
                url: url.to_string(),
                source,
            })?;
        if body.contains("captcha") {
            return Err(AfishaApiError::Captcha {
                url: url.to_string(),
            });
        }

        debug!(event_id, url = %url, duration = fmt_duration(start.elapsed()), "event page fetched");
        Ok(parse_event_page(event_id, &body))
    }
}

fn text_of(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|found| found.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Extract movie metadata from an event page body.
pub fn parse_event_page(event_id: &str, body: &str) -> EventPage {
    let mut page = EventPage {
        event_id: event_id.to_string(),
        ..Default::default()
    };

    page.kp_id = KINOPOISK_RE
        .captures(body)
        .and_then(|caps| caps[1].parse().ok());

    let html = Html::parse_document(body);
    let root = html.root_element();

    page.age_restriction = text_of(root, &AGE_SEL).and_then(|age| age.trim_matches('+').parse().ok());
    page.kp_rating = text_of(root, &RATING_SEL)
        .and_then(|rating| rating.replace(',', ".").parse::<f32>().ok())
        .map(|rating| (rating * 100.0).round() as i32);
    page.title_ru = text_of(root, &TITLE_SEL);

    for row in html.select(&ROW_SEL) {
        let key = text_of(row, &CATEGORY_SEL).unwrap_or_default();
        let Some(value) = text_of(row, &VALUE_SEL) else {
            continue;
        };

        match key.as_str() {
            "Оригинальное название" => page.title_original = Some(value),
            "Год производства" => page.year = value.parse().ok(),
            "Время" => match DURATION_RE.captures(&value) {
                Some(caps) => page.duration = caps[1].parse().ok(),
                None => warn!(event_id, key = %key, value = %value, "duration did not match"),
            },
            "Премьера" => match parse_ru_date(&value) {
                Some(date) => page.release = Some(date),
                None => warn!(event_id, key = %key, value = %value, "failed to parse premiere date"),
            },
            "Страна" | "Режиссёр" | "Продюсер" | "Композитор" | "В ролях" => {}
            _ => debug!(event_id, key = %key, "unknown event attribute"),
        }
    }

    page
}

/// Month stems, matched as prefixes of the month word. "ма" (May) also
/// prefixes "март" and must stay last.
const RU_MONTHS: [(&str, u32); 12] = [
    ("январ", 1),
    ("феврал", 2),
    ("март", 3),
    ("апрел", 4),
    ("июн", 6),
    ("июл", 7),
    ("август", 8),
    ("сентябр", 9),
    ("октябр", 10),
    ("ноябр", 11),
    ("декабр", 12),
    ("ма", 5),
];

/// Parse a Russian date like `4 октября 2018`.
pub fn parse_ru_date(value: &str) -> Option<NaiveDate> {
    let mut parts = value.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month_name = parts.next()?.to_lowercase();
    let year: i32 = parts.next()?.trim_end_matches('г').trim_end_matches('.').parse().ok()?;

    let (_, month) = RU_MONTHS
        .iter()
        .find(|(stem, _)| month_name.starts_with(*stem))?;

    NaiveDate::from_ymd_opt(year, *month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <h1 class="event-heading__title">Веном</h1>
          <span class="event-heading__content-rating">16+</span>
          <a href="https://www.kinopoisk.ru/film/843650/"><span class="arrow__text">6.9</span></a>
          <div class="event-attributes">
            <div class="event-attributes__row">
              <div class="event-attributes__category">Оригинальное название</div>
              <div class="event-attributes__category-value">Venom</div>
            </div>
            <div class="event-attributes__row">
              <div class="event-attributes__category">Год производства</div>
              <div class="event-attributes__category-value">2018</div>
            </div>
            <div class="event-attributes__row">
              <div class="event-attributes__category">Время</div>
              <div class="event-attributes__category-value">112 мин.</div>
            </div>
            <div class="event-attributes__row">
              <div class="event-attributes__category">Премьера</div>
              <div class="event-attributes__category-value">4 октября 2018</div>
            </div>
            <div class="event-attributes__row">
              <div class="event-attributes__category">Режиссёр</div>
              <div class="event-attributes__category-value">Рубен Флейшер</div>
            </div>
          </div>
        </body></html>
    "#;

    #[test]
    fn parses_full_event_page() {
        let page = parse_event_page("ev1", PAGE);
        assert_eq!(
            page,
            EventPage {
                event_id: "ev1".into(),
                kp_id: Some(843650),
                title_ru: Some("Веном".into()),
                title_original: Some("Venom".into()),
                year: Some(2018),
                duration: Some(112),
                release: NaiveDate::from_ymd_opt(2018, 10, 4),
                age_restriction: Some(16),
                kp_rating: Some(690),
            }
        );
    }

    #[test]
    fn empty_page_yields_only_the_id() {
        let page = parse_event_page("ev2", "<html><body><p>nothing</p></body></html>");
        assert_eq!(
            page,
            EventPage {
                event_id: "ev2".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn may_and_march_are_distinct() {
        assert_eq!(parse_ru_date("1 мая 2018"), NaiveDate::from_ymd_opt(2018, 5, 1));
        assert_eq!(parse_ru_date("8 марта 2019"), NaiveDate::from_ymd_opt(2019, 3, 8));
        assert_eq!(parse_ru_date("31 декабря 2020"), NaiveDate::from_ymd_opt(2020, 12, 31));
    }

    #[test]
    fn rejects_malformed_dates() {
        assert_eq!(parse_ru_date("октября 2018"), None);
        assert_eq!(parse_ru_date("4 брюмера 2018"), None);
        assert_eq!(parse_ru_date("31 февраля 2018"), None);
        assert_eq!(parse_ru_date(""), None);
    }
}
