//! Runtime configuration read from the environment
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file by `dotenvy` in `main`. Every setting has a default, so an empty
//! environment still yields a working server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::list_query::DEFAULT_BATCH_SIZE;

#[derive(Clone, Debug)]
pub struct Config {
    /// `PORT` - HTTP port (default: 8080)
    pub port: u16,

    /// `DATABASE_URL` - path of the redb file (default: "catalog.db")
    pub database_url: String,

    /// `UNDO_WINDOW_SECS` - how long a bulk delete can be undone (default: 8)
    pub undo_window: Duration,

    /// `MAX_IDS_PER_REQUEST` - largest id list a single store lookup accepts (default: 500)
    pub max_ids_per_request: usize,

    /// `RELATION_BATCH_SIZE` - chunk size for id-keyed secondary fetches (default: 100)
    pub relation_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            database_url: "catalog.db".to_string(),
            undo_window: Duration::from_secs(8),
            max_ids_per_request: 500,
            relation_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_var("PORT", defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            undo_window: Duration::from_secs(parse_var(
                "UNDO_WINDOW_SECS",
                defaults.undo_window.as_secs(),
            )),
            max_ids_per_request: parse_var("MAX_IDS_PER_REQUEST", defaults.max_ids_per_request)
                .max(1),
            relation_batch_size: parse_var("RELATION_BATCH_SIZE", defaults.relation_batch_size)
                .max(1),
        }
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
