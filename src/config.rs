//! Process configuration, read from environment variables with defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::utils::DEFAULT_SETTLE_INTERVAL;

pub const DEFAULT_TMDB_SEARCH_URL: &str = "https://api.themoviedb.org/3/search/movie";

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file holding movies and reviews
    pub db_path: PathBuf,
    /// Address the HTTP API binds to
    pub bind_addr: String,
    /// Quiet period before a coalesced search runs
    pub settle_interval: Duration,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout: Duration,
    /// TMDB key; external search is off when empty
    pub tmdb_api_key: String,
    pub tmdb_search_url: String,
    /// Chat completion endpoint; text generation is off when empty
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("reviews.db"),
            bind_addr: "127.0.0.1:8080".to_string(),
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            http_timeout: Duration::from_secs(30),
            tmdb_api_key: String::new(),
            tmdb_search_url: DEFAULT_TMDB_SEARCH_URL.to_string(),
            llm_api_url: String::new(),
            llm_api_key: String::new(),
            llm_model: "gpt-4".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var("REVIEWS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(addr) = env::var("REVIEWS_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(ms) = parse_var::<u64>("REVIEWS_SETTLE_MS") {
            config.settle_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("REVIEWS_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Ok(key) = env::var("TMDB_API_KEY") {
            config.tmdb_api_key = key;
        }
        if let Ok(url) = env::var("TMDB_SEARCH_URL") {
            config.tmdb_search_url = url;
        }
        if let Ok(url) = env::var("LLM_API_URL") {
            config.llm_api_url = url;
        }
        if let Ok(key) = env::var("LLM_API_KEY") {
            config.llm_api_key = key;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm_model = model;
        }

        config
    }

    pub fn search_enabled(&self) -> bool {
        !self.tmdb_api_key.trim().is_empty()
    }

    pub fn generation_enabled(&self) -> bool {
        !self.llm_api_url.trim().is_empty()
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparsable setting, using default");
            None
        }
    }
}
