use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{AppError, Result};
use crate::feed::IdentityFallback;
use crate::models::{Frequency, FrontmatterFormat};

pub const ENV_DATABASE_URL: &str = "TURSO_DATABASE_URL";
pub const ENV_AUTH_TOKEN: &str = "TURSO_AUTH_TOKEN";
pub const ENV_LOCAL_DB_URL: &str = "DIGEST_DB_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub turso: TursoConfig,

    #[serde(default)]
    pub digests: DigestConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TursoConfig {
    #[serde(default)]
    pub database_url: String,

    /// Read for remote-database setups; a local SQLite store has no use for
    /// it, so it is ignored with a warning.
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default = "default_frequency")]
    pub default_frequency: Frequency,

    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Zero disables truncation.
    #[serde(default = "default_max_articles")]
    pub max_articles_per_digest: usize,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub blog_template: BlogTemplateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_true")]
    pub brief: bool,

    #[serde(default = "default_true")]
    pub show_urls: bool,

    #[serde(default = "default_true")]
    pub emoji_header: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogTemplateConfig {
    #[serde(default)]
    pub frontmatter_format: FrontmatterFormat,

    #[serde(default = "default_true")]
    pub include_tags: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Look-back window for sources that were never fetched.
    #[serde(default = "default_fetch_days")]
    pub default_days: i64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub identity_fallback: IdentityFallback,
}

fn default_frequency() -> Frequency {
    Frequency::Weekly
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

fn default_max_articles() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_fetch_days() -> i64 {
    7
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    concat!("digest-tracker/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            default_frequency: default_frequency(),
            default_timezone: default_timezone(),
            max_articles_per_digest: default_max_articles(),
            whatsapp: WhatsAppConfig::default(),
            blog_template: BlogTemplateConfig::default(),
        }
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            brief: true,
            show_urls: true,
            emoji_header: true,
        }
    }
}

impl Default for BlogTemplateConfig {
    fn default() -> Self {
        Self {
            frontmatter_format: FrontmatterFormat::default(),
            include_tags: true,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_days: default_fetch_days(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            user_agent: default_user_agent(),
            identity_fallback: IdentityFallback::default(),
        }
    }
}

/// Where the article store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl Config {
    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        let lookup = |key: &str| std::env::var(key).ok();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_yaml_str(&content, &lookup)?
        } else {
            if path.is_some() {
                return Err(AppError::NotFound(format!(
                    "config file {}",
                    config_path.display()
                )));
            }
            Config::default()
        };

        config.apply_env_overrides(&lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        if value.is_null() {
            return Ok(Config::default());
        }
        let value = expand_env_vars(value, lookup);
        let config: Config = serde_yaml::from_value(value)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            self.turso.database_url = url;
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN).filter(|v| !v.is_empty()) {
            self.turso.auth_token = Some(token);
        }
        if let Some(url) = lookup(ENV_LOCAL_DB_URL).filter(|v| !v.is_empty()) {
            self.turso.database_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        if self.fetch.concurrency == 0 {
            return Err(AppError::Validation(
                "fetch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.fetch.default_days < 0 {
            return Err(AppError::Validation(
                "fetch.default_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.digests.default_timezone.parse::<Tz>().map_err(|_| {
            AppError::Validation(format!(
                "unknown timezone: {}",
                self.digests.default_timezone
            ))
        })
    }

    pub fn database_location(&self) -> Result<DatabaseLocation> {
        let location = self.resolve_database_url()?;
        if self.turso.auth_token.is_some() {
            tracing::warn!(
                "{} is ignored for the local database {:?}",
                ENV_AUTH_TOKEN,
                location
            );
        }
        Ok(location)
    }

    fn resolve_database_url(&self) -> Result<DatabaseLocation> {
        let url = self.turso.database_url.trim();

        if url.is_empty() {
            return Ok(DatabaseLocation::File(Self::default_db_path()));
        }
        if url == ":memory:" || url == "file::memory:" {
            return Ok(DatabaseLocation::Memory);
        }
        if let Some(path) = url.strip_prefix("file:") {
            return Ok(DatabaseLocation::File(PathBuf::from(path)));
        }
        if ["libsql://", "https://", "http://", "wss://", "ws://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            return Err(AppError::Store(format!(
                "remote database {} is not supported; set {} to a local file",
                url, ENV_LOCAL_DB_URL
            )));
        }
        Ok(DatabaseLocation::File(PathBuf::from(url)))
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("digest-tracker")
            .join("config.yml")
    }

    fn default_db_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("digest-tracker")
            .join("digest.db")
    }
}

/// Replace whole-string `${VAR}` / `${VAR:default}` values.
fn expand_env_vars(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(s) => {
            match s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
                Some(inner) => {
                    let (var, default) = match inner.split_once(':') {
                        Some((var, default)) => (var, default),
                        None => (inner, ""),
                    };
                    Value::String(lookup(var).unwrap_or_else(|| default.to_string()))
                }
                None => Value::String(s),
            }
        }
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, expand_env_vars(v, lookup)))
                .collect(),
        ),
        Value::Sequence(seq) => {
            Value::Sequence(seq.into_iter().map(|v| expand_env_vars(v, lookup)).collect())
        }
        other => other,
    }
}
