//! Showtimes. Sessions are never looked up, so they bypass the resolver and
//! are written with `COPY ... FROM STDIN`.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bitflags::bitflags;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolCopyExt;
use tracing::{debug, warn};

use super::batch::ChunkSink;
use super::errors::StoreError;
use super::movies::EventCatalog;
use crate::afisha::models::ScheduleItem;
use crate::utils::fmt_duration;

/// Sessions per COPY statement.
pub const SESSION_CHUNK_SIZE: usize = 1000;

const SESSION_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const COPY_SESSIONS: &str = "COPY sessions (hall_name, cinema_id, city_id, movie_id, type, ya_id, date, price_min, price_max) FROM STDIN WITH (FORMAT csv)";

bitflags! {
    /// Projection format, stored in `sessions.type`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SessionFormat: i32 {
        const THREE_D = 1;
        const IMAX = 2;
    }
}

impl SessionFormat {
    /// Derive flags from a format name such as `IMAX 3D`.
    pub fn from_format_name(name: &str) -> Self {
        let name = name.to_lowercase();
        let mut format = Self::empty();
        if name.contains("3d") {
            format |= Self::THREE_D;
        }
        if name.contains("imax") {
            format |= Self::IMAX;
        }
        format
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub hall: Option<String>,
    pub cinema_id: i32,
    pub city_id: i32,
    pub event_id: String,
    /// Filled in once movies are resolved.
    pub movie_id: Option<i32>,
    pub format: SessionFormat,
    pub ticket_id: Option<String>,
    pub starts_at: NaiveDateTime,
    /// Rubles.
    pub price_min: Option<i32>,
    /// Rubles.
    pub price_max: Option<i32>,
}

impl Session {
    /// The ticket id when present, else a composite of hall, cinema, event
    /// and start time.
    pub fn unique_key(&self) -> String {
        match &self.ticket_id {
            Some(ticket) => ticket.clone(),
            None => format!(
                "{};{};{};{}",
                self.hall.as_deref().unwrap_or_default(),
                self.cinema_id,
                self.event_id,
                self.starts_at
            ),
        }
    }
}

/// Decode a base64 ticket id. An empty id is absent.
pub fn decode_ticket_id(raw: &str) -> Result<Option<String>, base64::DecodeError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let bytes = STANDARD.decode(raw)?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

pub fn parse_session_time(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, SESSION_DATETIME_FORMAT)
}

/// Builds deduplicated sessions from schedule documents and records the
/// events they reference.
#[derive(Debug, Default)]
pub struct SessionCollector {
    seen: HashSet<String>,
    sessions: Vec<Session>,
    events: EventCatalog,
    duplicates: usize,
    skipped: usize,
}

impl SessionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every session of one place's schedule. Sessions with an
    /// undecodable ticket id or start time are skipped with a warning.
    pub fn add_schedule(&mut self, city_id: i32, cinema_id: i32, items: &[ScheduleItem]) {
        for item in items {
            let Some(event) = &item.event else {
                warn!(cinema_id, "schedule item without event, skipping");
                self.skipped += 1;
                continue;
            };
            self.events.observe(event);

            for sub in &item.schedule {
                let format = sub
                    .format
                    .as_ref()
                    .map(|f| SessionFormat::from_format_name(&f.0))
                    .unwrap_or_default();

                for raw in &sub.sessions {
                    let ticket = raw.ticket.as_ref();
                    let raw_ticket = ticket.map(|t| t.id.as_str()).unwrap_or_default();
                    let ticket_id = match decode_ticket_id(raw_ticket) {
                        Ok(id) => id,
                        Err(error) => {
                            warn!(
                                event = %event.id,
                                cinema_id,
                                ticket = raw_ticket,
                                error = %error,
                                "bad ticket id, skipping session"
                            );
                            self.skipped += 1;
                            continue;
                        }
                    };
                    let starts_at = match parse_session_time(&raw.datetime) {
                        Ok(at) => at,
                        Err(error) => {
                            warn!(
                                event = %event.id,
                                cinema_id,
                                datetime = %raw.datetime,
                                error = %error,
                                "bad session time, skipping session"
                            );
                            self.skipped += 1;
                            continue;
                        }
                    };
                    let price = ticket.and_then(|t| t.price.as_ref());

                    let session = Session {
                        hall: raw.hall_name.clone().filter(|h| !h.is_empty()),
                        cinema_id,
                        city_id,
                        event_id: event.id.clone(),
                        movie_id: None,
                        format,
                        ticket_id,
                        starts_at,
                        price_min: price.map(|p| p.min / 100),
                        price_max: price.map(|p| p.max / 100),
                    };

                    if self.seen.insert(session.unique_key()) {
                        self.sessions.push(session);
                    } else {
                        debug!(key = %session.unique_key(), "duplicate session, skipping");
                        self.duplicates += 1;
                    }
                }
            }
        }
    }

    pub fn events(&self) -> &EventCatalog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventCatalog {
        &mut self.events
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Attach movie ids. Returns the event ids that have no movie.
    pub fn finish(self, movies: &HashMap<String, i32>) -> (Vec<Session>, Vec<String>) {
        let mut missing = Vec::new();
        let mut sessions = self.sessions;
        for session in &mut sessions {
            session.movie_id = movies.get(&session.event_id).copied();
            if session.movie_id.is_none() && !missing.contains(&session.event_id) {
                missing.push(session.event_id.clone());
            }
        }
        (sessions, missing)
    }
}

/// Render sessions as CSV rows for `COPY sessions`. Absent values become
/// unquoted empty fields, which COPY reads as `NULL`.
pub fn encode_sessions(sessions: &[Session]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(sessions.len() * 96));

    for s in sessions {
        let opt = |v: Option<i32>| v.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([
            s.hall.clone().unwrap_or_default(),
            s.cinema_id.to_string(),
            s.city_id.to_string(),
            opt(s.movie_id),
            s.format.bits().to_string(),
            s.ticket_id.clone().unwrap_or_default(),
            s.starts_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            opt(s.price_min),
            opt(s.price_max),
        ])?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Writes session chunks with one COPY per chunk.
#[derive(Debug, Clone)]
pub struct SessionWriter {
    pool: PgPool,
}

impl SessionWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkSink<Session> for SessionWriter {
    async fn persist(&self, chunk: &[Session]) -> Result<(), StoreError> {
        let start = Instant::now();
        let data = encode_sessions(chunk).map_err(|source| StoreError::Encode {
            table: "sessions",
            source,
        })?;

        let mut copy = self.pool.copy_in_raw(COPY_SESSIONS).await?;
        let sent = copy.send(data).await.map(|_| ());
        if let Err(e) = sent {
            copy.abort(e.to_string()).await.ok();
            return Err(e.into());
        }
        let rows = copy.finish().await?;

        debug!(
            rows,
            duration = fmt_duration(start.elapsed()),
            "sessions copied"
        );
        Ok(())
    }
}
