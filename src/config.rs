use crate::calendar::Calendar;
use crate::coordinator::DEFAULT_REQUEST_TIMEOUT;
use crate::stats::DEFAULT_BADGE_CAP;
use chrono::Weekday;
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use tracing::warn;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/state.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub user_id: Option<String>,
    pub first_weekday: Weekday,
    pub request_timeout: Duration,
    pub badge_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            user_id: None,
            first_weekday: Weekday::Sun,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            badge_cap: DEFAULT_BADGE_CAP,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparseable values are logged and
    /// replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            data_path: resolve_data_path(&lookup),
            user_id: lookup("APP_USER_ID").filter(|value| !value.trim().is_empty()),
            first_weekday: parsed(&lookup, "APP_FIRST_WEEKDAY").unwrap_or(defaults.first_weekday),
            request_timeout: parsed(&lookup, "APP_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            badge_cap: parsed(&lookup, "APP_BADGE_CAP").unwrap_or(defaults.badge_cap),
        }
    }

    pub fn calendar(&self) -> Calendar {
        Calendar::new(self.first_weekday)
    }
}

pub fn resolve_data_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup("APP_DATA_PATH") {
        return PathBuf::from(path);
    }

    PathBuf::from(DEFAULT_DATA_PATH)
}

fn parsed<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid config value");
            None
        }
    }
}
