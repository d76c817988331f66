pub mod afisha;
pub mod app;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod data;
pub mod documents;
pub mod fill;
pub mod logging;
pub mod utils;
