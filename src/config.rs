use std::{str::FromStr, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub store_timeout: Duration,
    pub session_inactivity: time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite://friendchat.db?mode=rwc".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            db_max_connections: 16,
            store_timeout: Duration::from_millis(5000),
            session_inactivity: time::Duration::minutes(60),
        }
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> anyhow::Result<Config> {
        let _ = dotenv::dotenv();
        let defaults = Config::default();

        Ok(Config {
            database_url: dotenv::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS")?.unwrap_or(defaults.db_max_connections),
            store_timeout: parse_var("STORE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            session_inactivity: parse_var("SESSION_INACTIVITY_MINUTES")?
                .map(time::Duration::minutes)
                .unwrap_or(defaults.session_inactivity),
        })
    }
}

fn parse_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(None),
    }
}
