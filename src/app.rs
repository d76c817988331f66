//! Command dispatch and resource setup.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

use crate::afisha::AfishaApi;
use crate::cli::{Args, Command, CrawlArgs, FillCommand};
use crate::config::Config;
use crate::crawl::{self, CrawlOptions};
use crate::data::PgStore;
use crate::data::sessions::SessionWriter;
use crate::documents::{DocumentStore, read_city_list};
use crate::fill::{self, Loaders};
use crate::utils::fmt_duration;

const ACQUIRE_SLOW_THRESHOLD: Duration = Duration::from_millis(500);

pub struct App {
    config: Config,
    docs: DocumentStore,
}

impl App {
    pub fn new(config: Config, out: Option<std::path::PathBuf>) -> Self {
        let root = out.unwrap_or_else(|| config.out_dir.clone());
        Self {
            docs: DocumentStore::new(root),
            config,
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.docs
    }

    pub async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Crawl(args) => self.crawl(args).await,
            Command::Fill(FillCommand::Places) => {
                let pool = connect_database(&self.config).await?;
                let loaders = Loaders::new(Arc::new(PgStore::new(pool)));
                fill::fill_places(&self.docs, &loaders).await?;
                Ok(())
            }
            Command::Fill(FillCommand::Sessions { date }) => {
                let pool = connect_database(&self.config).await?;
                let api = AfishaApi::from_config(&self.config)?;
                let loaders = Loaders::new(Arc::new(PgStore::new(pool.clone())));
                let writer = SessionWriter::new(pool);
                fill::fill_sessions(
                    &self.docs,
                    &loaders,
                    &api,
                    &writer,
                    date,
                    self.config.crawl_concurrency,
                )
                .await?;
                Ok(())
            }
        }
    }

    async fn crawl(&self, args: CrawlArgs) -> anyhow::Result<()> {
        if args.is_empty() {
            bail!("nothing to crawl; pass --repertories, --places or --schedules");
        }

        let api = AfishaApi::from_config(&self.config)?;
        let options = CrawlOptions {
            page_limit: self.config.page_limit,
            concurrency: self.config.crawl_concurrency,
        };

        if args.needs_cities() {
            let path = args
                .city_list
                .as_deref()
                .context("--city-list is required for --repertories and --places")?;
            let cities = read_city_list(path)?;
            info!(cities = cities.len(), path = %path.display(), "city list loaded");

            if args.repertories {
                crawl::crawl_repertories(&api, &self.docs, &cities, options).await;
            }
            if args.places {
                crawl::crawl_places(&api, &self.docs, &cities, options).await;
            }
        }

        for date in args.schedules {
            crawl::crawl_schedules(&api, &self.docs, date, options).await?;
        }
        Ok(())
    }
}

/// Open a Postgres pool from `DATABASE_URL`.
pub async fn connect_database(config: &Config) -> anyhow::Result<PgPool> {
    let connect_options = PgConnectOptions::from_str(config.database_url()?)
        .context("Failed to parse database URL")?
        .log_statements(tracing::log::LevelFilter::Debug)
        .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

    let max_connections = config.db_max_connections.max(1);
    let pool = PgPoolOptions::new()
        .min_connections(0)
        .max_connections(max_connections)
        .acquire_slow_threshold(ACQUIRE_SLOW_THRESHOLD)
        .acquire_timeout(Duration::from_secs(4))
        .idle_timeout(Duration::from_secs(60 * 2))
        .max_lifetime(Duration::from_secs(60 * 30))
        .connect_with(connect_options)
        .await
        .context("Failed to create database pool")?;

    info!(
        min_connections = 0,
        max_connections,
        acquire_timeout = "4s",
        idle_timeout = "2m",
        max_lifetime = "30m",
        acquire_slow_threshold = fmt_duration(ACQUIRE_SLOW_THRESHOLD),
        "database pool established"
    );
    Ok(pool)
}

/// Parse arguments already in hand and run the selected command.
pub async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let app = App::new(config, args.out);
    info!(root = %app.documents().root().display(), "document cache");
    app.run(args.command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Figment;

    fn config() -> Config {
        Config::from_figment(Figment::new().merge(("out_dir", "/tmp/kino-out"))).unwrap()
    }

    #[test]
    fn out_flag_overrides_config() {
        let app = App::new(config(), Some("/srv/cache".into()));
        assert_eq!(app.documents().root(), std::path::Path::new("/srv/cache"));

        let app = App::new(config(), None);
        assert_eq!(app.documents().root(), std::path::Path::new("/tmp/kino-out"));
    }

    #[tokio::test]
    async fn empty_crawl_is_rejected() {
        let app = App::new(config(), None);
        let err = app.run(Command::Crawl(CrawlArgs::default())).await.unwrap_err();
        assert!(err.to_string().contains("nothing to crawl"));
    }

    #[tokio::test]
    async fn fill_without_database_url_fails() {
        let app = App::new(config(), None);
        let err = app.run(Command::Fill(FillCommand::Places)).await.unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[tokio::test]
    async fn city_list_is_required_for_city_crawls() {
        let app = App::new(config(), None);
        let args = CrawlArgs {
            places: true,
            ..Default::default()
        };
        let err = app.run(Command::Crawl(args)).await.unwrap_err();
        assert!(err.to_string().contains("--city-list"));
    }
}
