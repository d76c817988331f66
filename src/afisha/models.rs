//! Documents returned by the Afisha API and cached on disk by the crawler.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::paging::PagingState;

/// `YYYY-MM-DD` dates where an empty string means "absent".
pub mod opt_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.collect_str(&d.format(FORMAT)),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Same as [`opt_date`], for lists of dates.
mod date_list {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, ser::SerializeSeq};

    use super::opt_date::FORMAT;

    pub fn serialize<S: Serializer>(dates: &[NaiveDate], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(dates.len()))?;
        for d in dates {
            seq.serialize_element(&d.format(FORMAT).to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<NaiveDate>, D::Error> {
        let raw: Option<Vec<String>> = Option::deserialize(d)?;
        raw.unwrap_or_default()
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| NaiveDate::parse_from_str(s, FORMAT).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// An `#rrggbb` colour. Only the full six-digit form is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Color::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color `{raw}`")))
    }
}

/// Unwraps `{"name": "..."}` into the bare string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NamedItemRepr", into = "NamedItemRepr")]
pub struct NamedItem(pub String);

#[derive(Serialize, Deserialize)]
struct NamedItemRepr {
    #[serde(default)]
    name: String,
}

impl From<NamedItemRepr> for NamedItem {
    fn from(repr: NamedItemRepr) -> Self {
        Self(repr.name)
    }
}

impl From<NamedItem> for NamedItemRepr {
    fn from(item: NamedItem) -> Self {
        Self { name: item.0 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KinopoiskScore {
    pub url: Option<String>,
    pub value: Option<f32>,
    pub votes: Option<i32>,
}

impl KinopoiskScore {
    /// Kinopoisk film id, taken from the last path segment of the score URL.
    pub fn film_id(&self) -> Option<i32> {
        film_id_from_url(self.url.as_deref()?)
    }

    /// Rating in hundredths (7.45 -> 745), the unit stored in `movies.kp_rating`.
    pub fn rating(&self) -> Option<i32> {
        self.value
            .filter(|v| *v > 0.0)
            .map(|v| (v * 100.0).round() as i32)
    }
}

/// Parse a Kinopoisk film id out of a URL such as `https://www.kinopoisk.ru/film/123/`.
pub fn film_id_from_url(url: &str) -> Option<i32> {
    url.rsplit('/')
        .find(|segment| !segment.is_empty())
        .and_then(|segment| segment.parse().ok())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub url: String,
    pub title: String,
    pub original_title: Option<String>,
    pub kinopoisk: Option<KinopoiskScore>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleInfo {
    #[serde(with = "date_list")]
    pub dates: Vec<NaiveDate>,
    #[serde(with = "opt_date")]
    pub date_started: Option<NaiveDate>,
    #[serde(with = "opt_date")]
    pub date_end: Option<NaiveDate>,
    #[serde(with = "opt_date")]
    pub date_released: Option<NaiveDate>,
    #[serde(rename = "placedTotal")]
    pub places_total: i32,
}

/// An item of the all-events (repertory) listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepertoryItem {
    pub event: Event,
    pub schedule_info: ScheduleInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct City {
    pub id: String,
    pub name: String,
    pub geoid: i64,
    pub timezone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetroInfo {
    pub name: String,
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Coordinates {
    pub longitude: f32,
    pub latitude: f32,
}

/// A specific place (a cinema) that schedules are attached to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    pub url: String,
    pub title: String,
    pub address: String,
    pub city: City,
    pub metro: Vec<MetroInfo>,
    pub coordinates: Coordinates,
    pub links: Vec<String>,
    pub logo_color: Option<Color>,
    pub bg_color: Option<Color>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceRange {
    pub currency: String,
    /// Kopecks.
    pub min: i32,
    /// Kopecks.
    pub max: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketInfo {
    pub id: String,
    pub price: Option<PriceRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSession {
    #[serde(with = "opt_date")]
    pub date: Option<NaiveDate>,
    pub datetime: String,
    pub ticket: Option<TicketInfo>,
    #[serde(rename = "hall")]
    pub hall_name: Option<String>,
}

/// Sessions sharing one format (2D, 3D, IMAX...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSubItem {
    pub format: Option<NamedItem>,
    pub tags: Vec<NamedItem>,
    pub sessions: Vec<ScheduleSession>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleItem {
    #[serde(with = "opt_date")]
    pub date: Option<NaiveDate>,
    pub place: Option<Place>,
    pub event: Option<Event>,
    pub schedule: Vec<ScheduleSubItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Repertory {
    pub data: Vec<RepertoryItem>,
    pub paging: PagingState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Places {
    pub items: Vec<Place>,
    pub paging: PagingState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleParamsEcho {
    #[serde(with = "opt_date")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleCinema {
    pub params: ScheduleParamsEcho,
    pub paging: PagingState,
    pub items: Vec<ScheduleItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleCinemaResponse {
    pub schedule: ScheduleCinema,
}
