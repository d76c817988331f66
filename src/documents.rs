//! Cached crawl results on disk.
//!
//! Layout under the root directory:
//!
//! ```text
//! repertories/<city>.json              [RepertoryItem]
//! places/<city>.json                   [Place]
//! schedule/<date>/<city>/<place>.json  [ScheduleItem]
//! ```
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place, so a crash never leaves a truncated document behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::afisha::json::read_json_with_context;
use crate::afisha::models::{Place, RepertoryItem, ScheduleItem};

const REPERTORIES_DIR: &str = "repertories";
const PLACES_DIR: &str = "places";
const SCHEDULE_DIR: &str = "schedule";

/// One place's schedule for a date. City and place come from the path.
#[derive(Debug, Clone)]
pub struct ScheduleDocument {
    pub city: String,
    pub place_id: String,
    pub items: Vec<ScheduleItem>,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repertory_path(&self, city: &str) -> PathBuf {
        self.root.join(REPERTORIES_DIR).join(format!("{city}.json"))
    }

    pub fn places_path(&self, city: &str) -> PathBuf {
        self.root.join(PLACES_DIR).join(format!("{city}.json"))
    }

    pub fn schedule_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(SCHEDULE_DIR).join(date.format("%Y-%m-%d").to_string())
    }

    pub fn schedule_path(&self, date: NaiveDate, city: &str, place_id: &str) -> PathBuf {
        self.schedule_dir(date)
            .join(city)
            .join(format!("{place_id}.json"))
    }

    /// Serialize `value` to `path` atomically, creating parent directories.
    pub fn write<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let parent = path
            .parent()
            .with_context(|| format!("document path has no parent: {}", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, value)
                .with_context(|| format!("failed to serialize {}", path.display()))?;
            writer.flush()?;
        }
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("failed to move document into {}", path.display()))?;

        debug!(path = %path.display(), "document written");
        Ok(())
    }

    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        read_json_with_context(BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn write_repertory(&self, city: &str, items: &[RepertoryItem]) -> Result<()> {
        self.write(&self.repertory_path(city), items)
    }

    pub fn write_places(&self, city: &str, places: &[Place]) -> Result<()> {
        self.write(&self.places_path(city), places)
    }

    pub fn write_schedule(
        &self,
        date: NaiveDate,
        city: &str,
        place_id: &str,
        items: &[ScheduleItem],
    ) -> Result<()> {
        self.write(&self.schedule_path(date, city, place_id), items)
    }

    /// Every cached place. Unreadable documents are skipped.
    pub fn load_places(&self) -> Result<Vec<Place>> {
        let files = json_files(&self.root.join(PLACES_DIR))?;
        debug!(files = files.len(), "loading place documents");
        Ok(self.read_all::<Vec<Place>>(&files).into_iter().flatten().collect())
    }

    /// Every cached repertory item. Unreadable documents are skipped.
    pub fn load_repertories(&self) -> Result<Vec<RepertoryItem>> {
        let files = json_files(&self.root.join(REPERTORIES_DIR))?;
        debug!(files = files.len(), "loading repertory documents");
        Ok(self
            .read_all::<Vec<RepertoryItem>>(&files)
            .into_iter()
            .flatten()
            .collect())
    }

    /// Every cached schedule for `date`. Unreadable documents are skipped.
    pub fn load_schedules(&self, date: NaiveDate) -> Result<Vec<ScheduleDocument>> {
        let mut documents = Vec::new();
        let day_dir = self.schedule_dir(date);

        for city_dir in subdirectories(&day_dir)? {
            let Some(city) = file_stem(&city_dir, false) else {
                continue;
            };
            for file in json_files(&city_dir)? {
                let Some(place_id) = file_stem(&file, true) else {
                    continue;
                };
                match self.read::<Vec<ScheduleItem>>(&file) {
                    Ok(items) => documents.push(ScheduleDocument {
                        city: city.clone(),
                        place_id,
                        items,
                    }),
                    Err(e) => warn!(path = %file.display(), error = ?e, "skipping unreadable schedule"),
                }
            }
        }

        debug!(date = %date, documents = documents.len(), "loaded schedule documents");
        Ok(documents)
    }

    fn read_all<T: DeserializeOwned>(&self, files: &[PathBuf]) -> Vec<T> {
        files
            .iter()
            .filter_map(|file| match self.read(file) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(path = %file.display(), error = ?e, "skipping unreadable document");
                    None
                }
            })
            .collect()
    }
}

/// Read a JSON list of city ids.
pub fn read_city_list(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_json_with_context(BufReader::new(file))
        .with_context(|| format!("failed to parse city list {}", path.display()))
}

fn entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
    };

    let mut paths = read
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to list {}", dir.display()))?;
    paths.sort();
    Ok(paths)
}

/// `*.json` files directly under `dir`, sorted. A missing directory is empty.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect())
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(entries(dir)?.into_iter().filter(|p| p.is_dir()).collect())
}

fn file_stem(path: &Path, strip_extension: bool) -> Option<String> {
    let name = if strip_extension {
        path.file_stem()
    } else {
        path.file_name()
    };
    name.and_then(|n| n.to_str()).map(str::to_owned)
}
