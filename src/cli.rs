use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

/// Crawl Yandex Afisha cinema listings and load them into Postgres.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    pub tracing: TracingFormat,

    /// Document cache directory (overrides OUT_DIR)
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable, for terminals
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch listings from the API into the document cache
    Crawl(CrawlArgs),
    /// Load cached documents into the database
    #[command(subcommand)]
    Fill(FillCommand),
}

#[derive(clap::Args, Debug, Default)]
pub struct CrawlArgs {
    /// JSON array of city ids, required by --repertories and --places
    #[arg(long)]
    pub city_list: Option<PathBuf>,

    /// Crawl each city's repertory
    #[arg(long)]
    pub repertories: bool,

    /// Crawl each city's cinemas
    #[arg(long)]
    pub places: bool,

    /// Crawl schedules of cached cinemas for these dates (YYYY-MM-DD, comma separated)
    #[arg(long, value_delimiter = ',')]
    pub schedules: Vec<NaiveDate>,
}

impl CrawlArgs {
    pub fn needs_cities(&self) -> bool {
        self.repertories || self.places
    }

    pub fn is_empty(&self) -> bool {
        !self.needs_cities() && self.schedules.is_empty()
    }
}

#[derive(Subcommand, Debug)]
pub enum FillCommand {
    /// Load cities and cinemas from cached place documents
    Places,
    /// Load movies and sessions from cached schedules for one date
    Sessions {
        #[arg(long)]
        date: NaiveDate,
    },
}
