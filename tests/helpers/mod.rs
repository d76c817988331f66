//! Builders shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use kino::afisha::models::{
    City, Event, KinopoiskScore, NamedItem, Place, PriceRange, ScheduleItem, ScheduleSession,
    ScheduleSubItem, TicketInfo,
};
use kino::afisha::{AfishaApiError, EventPage, EventPages};
use kino::data::StoreError;
use kino::data::sessions::Session;
use kino::data::ChunkSink;
use tokio::sync::Mutex;

pub fn make_city(id: &str) -> City {
    City {
        id: id.to_owned(),
        name: id.to_owned(),
        geoid: 213,
        timezone: "Europe/Moscow".to_owned(),
    }
}

pub fn make_place(id: &str, city: &str) -> Place {
    Place {
        id: id.to_owned(),
        url: format!("/{city}/places/{id}"),
        title: format!("Кинотеатр {id}"),
        address: "ул. Тверская, 1".to_owned(),
        city: make_city(city),
        ..Default::default()
    }
}

pub fn make_event(id: &str, kp_film: Option<i32>) -> Event {
    Event {
        id: id.to_owned(),
        url: format!("/moscow/cinema/{id}"),
        title: format!("Фильм {id}"),
        original_title: None,
        kinopoisk: kp_film.map(|film| KinopoiskScore {
            url: Some(format!("https://www.kinopoisk.ru/film/{film}/")),
            value: Some(7.1),
            votes: Some(1000),
        }),
    }
}

/// A schedule item with one session per `(time, ticket)` pair.
pub fn make_schedule_item(event: Event, format: &str, sessions: &[(&str, &str)]) -> ScheduleItem {
    ScheduleItem {
        event: Some(event),
        schedule: vec![ScheduleSubItem {
            format: Some(NamedItem(format.to_owned())),
            tags: Vec::new(),
            sessions: sessions
                .iter()
                .map(|(time, ticket)| ScheduleSession {
                    datetime: format!("2018-10-12T{time}:00"),
                    ticket: Some(TicketInfo {
                        id: (*ticket).to_owned(),
                        price: Some(PriceRange {
                            currency: "rub".to_owned(),
                            min: 25000,
                            max: 40000,
                        }),
                    }),
                    hall_name: Some("Зал 1".to_owned()),
                    ..Default::default()
                })
                .collect(),
        }],
        ..Default::default()
    }
}

/// Serves canned event pages; ids not in the map fail.
#[derive(Default)]
pub struct StubPages {
    pub pages: HashMap<String, EventPage>,
    pub requests: Mutex<Vec<String>>,
}

#[async_trait]
impl EventPages for StubPages {
    async fn event_page(&self, event_id: &str, _url: &str) -> Result<EventPage, AfishaApiError> {
        self.requests.lock().await.push(event_id.to_owned());
        self.pages
            .get(event_id)
            .cloned()
            .ok_or(AfishaApiError::InvalidRequest("no such page"))
    }
}

/// Collects every persisted session chunk.
#[derive(Default)]
pub struct RecordingSessions {
    pub chunks: Mutex<Vec<Vec<Session>>>,
}

#[async_trait]
impl ChunkSink<Session> for RecordingSessions {
    async fn persist(&self, chunk: &[Session]) -> Result<(), StoreError> {
        self.chunks.lock().await.push(chunk.to_vec());
        Ok(())
    }
}
