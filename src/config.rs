use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::error::FetchError;

pub const DEFAULT_URL: &str = "https://www.walmart.com/browse/food/seasonal-bakery/976759_976779_7443156_4622028?povid=976759_ItemCarousel_4302028_Fallbakerytreats_ViewAll_Rweb_Sept_05";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

const ENV_PREFIX: &str = "BAKERY";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub fetch: FetchConfig,
    pub warehouse: WarehouseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Extra static headers sent alongside the User-Agent.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Append the table to the destination.
    Write,
    /// Open the connection and report the row count, writing nothing.
    #[serde(alias = "check")]
    CheckOnly,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Write => "write",
            LoadMode::CheckOnly => "check_only",
        }
    }
}

/// Destination settings.
///
/// The store is a local SQLite file, which needs no credentials. `password`,
/// `account` and `role` are accepted so a configuration written for a
/// networked warehouse still loads; `account` and `role` are only logged at
/// connect time and `password` is never read outside the redacted `Debug`.
#[derive(Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Logged at connect time and recorded as `LOADED_BY` in the run log.
    pub user: Option<String>,
    /// Unused by the SQLite store.
    pub password: Option<String>,
    /// Unused by the SQLite store; logged only.
    pub account: Option<String>,
    /// Logged at connect time and recorded as `COMPUTE` in the run log.
    pub warehouse: Option<String>,
    /// Unused by the SQLite store; logged only.
    pub role: Option<String>,
    /// Path of the SQLite database file.
    pub database: String,
    pub schema: String,
    pub table: String,
    pub mode: LoadMode,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Settings {
    /// Defaults, then the optional file, then `BAKERY_*` environment variables
    /// (`__` separates nested keys, e.g. `BAKERY_WAREHOUSE__USER`).
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut builder = defaults()?;
        if let Some(p) = path {
            builder = builder.add_source(File::from(p).required(true));
        }
        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;
        Settings::from_config(cfg)
    }

    pub fn from_config(cfg: Config) -> Result<Settings> {
        cfg.try_deserialize()
            .context("Configuration does not match the expected settings")
    }
}

fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(Config::builder()
        .set_default("fetch.url", DEFAULT_URL)?
        .set_default("fetch.user_agent", DEFAULT_USER_AGENT)?
        .set_default("fetch.timeout_secs", 30)?
        .set_default("warehouse.database", "data/warehouse.sqlite")?
        .set_default("warehouse.schema", "main")?
        .set_default("warehouse.table", "BAKERY_ITEMS")?
        .set_default("warehouse.mode", "check_only")?)
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The static header set for the page request.
    pub fn headers(&self) -> Result<HeaderMap, FetchError> {
        let mut map = HeaderMap::new();
        let ua = HeaderValue::from_str(&self.user_agent)
            .map_err(|_| FetchError::InvalidHeader(format!("User-Agent: {}", self.user_agent)))?;
        map.insert(USER_AGENT, ua);

        for (name, value) in &self.headers {
            let n = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let v = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(format!("{}: {}", name, value)))?;
            map.insert(n, v);
        }
        Ok(map)
    }
}
