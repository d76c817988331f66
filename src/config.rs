//! Configuration, read from the process environment.
//!
//! Every key maps to an upper-case environment variable of the same name
//! (`PAGE_LIMIT`, `DATABASE_URL`, ...). A `.env` file is honoured by `main`.

use std::path::PathBuf;

use anyhow::Context;
use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Level for this crate's targets; dependencies log at `warn`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Postgres connection string. Only the `fill` commands need it.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Root of the document cache.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_afisha_api_url")]
    pub afisha_api_url: String,
    #[serde(default = "default_afisha_site_url")]
    pub afisha_site_url: String,
    /// Page size requested from paginated endpoints.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Resources fetched concurrently during a crawl.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: usize,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("./out")
}

fn default_afisha_api_url() -> String {
    "https://afisha.yandex.ru/api/".to_string()
}

fn default_afisha_site_url() -> String {
    "https://afisha.yandex.ru/".to_string()
}

fn default_page_limit() -> usize {
    20
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_crawl_concurrency() -> usize {
    4
}

fn default_db_max_connections() -> u32 {
    4
}

impl Config {
    /// Load from the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .context("DATABASE_URL is not set")
    }
}
