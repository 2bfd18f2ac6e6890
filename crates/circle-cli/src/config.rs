use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use circle_backend::{Backend, HttpPushRelay, HttpTranslator, RestBackend};
use circle_core::{AppContext, SessionStore, Settings};
use circle_db::Database;

/// Runtime configuration, read from `CIRCLE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hosted backend base URL. Unset means the embedded database.
    pub backend_url: Option<String>,
    pub anon_key: String,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_path: PathBuf,
    pub push_url: Option<String>,
    pub translate_url: Option<String>,
    pub translate_key: Option<String>,
    pub settings: Settings,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();
        let settings = Settings {
            group_size: parsed("CIRCLE_GROUP_SIZE", defaults.group_size)?,
            poll_interval: Duration::from_millis(parsed(
                "CIRCLE_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            poll_attempts: parsed("CIRCLE_POLL_ATTEMPTS", defaults.poll_attempts)?,
            storage_bucket: var("CIRCLE_STORAGE_BUCKET").unwrap_or(defaults.storage_bucket.clone()),
            ..defaults
        };
        if settings.group_size < 2 {
            anyhow::bail!("CIRCLE_GROUP_SIZE must be at least 2");
        }

        Ok(Self {
            backend_url: var("CIRCLE_BACKEND_URL"),
            anon_key: var("CIRCLE_ANON_KEY").unwrap_or_default(),
            db_path: var("CIRCLE_DB_PATH").unwrap_or_else(|| "circle.db".into()).into(),
            jwt_secret: var("CIRCLE_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into()),
            session_path: var("CIRCLE_SESSION_PATH")
                .unwrap_or_else(|| ".circle/session.json".into())
                .into(),
            push_url: var("CIRCLE_PUSH_URL"),
            translate_url: var("CIRCLE_TRANSLATE_URL"),
            translate_key: var("CIRCLE_TRANSLATE_KEY"),
            settings,
        })
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        match &self.backend_url {
            Some(url) => {
                info!("Using hosted backend at {}", url);
                Ok(Arc::new(RestBackend::new(url, &self.anon_key)?))
            }
            None => {
                info!("Using embedded backend at {}", self.db_path.display());
                Ok(Arc::new(Database::open(&self.db_path, &self.jwt_secret)?))
            }
        }
    }

    pub fn build_context(&self) -> Result<AppContext> {
        let mut builder = AppContext::builder(self.backend()?)
            .settings(self.settings.clone())
            .session_store(SessionStore::new(&self.session_path));
        if let Some(url) = &self.push_url {
            builder = builder.push(Arc::new(HttpPushRelay::new(url)?));
        }
        if let Some(url) = &self.translate_url {
            builder = builder.translator(Arc::new(HttpTranslator::new(url, self.translate_key.clone())?));
        }
        Ok(builder.build())
    }
}
