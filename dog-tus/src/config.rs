use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    FileLockProvider, InMemoryFileLockProvider, MetadataValidator, TusError, TusEvents, TusResult,
};

/// Configuration for a tus endpoint
#[derive(Clone)]
pub struct TusConfig {
    /// Path the endpoint is mounted on, e.g. `/files`
    pub url_path: String,

    /// Largest upload accepted, advertised as `Tus-Max-Size`
    pub max_allowed_upload_size: Option<u64>,

    /// Expiry applied to incomplete uploads, when the store supports it
    pub expiration: Option<Expiration>,

    /// Application callbacks
    pub events: TusEvents,

    /// Lock table used for mutating operations
    pub lock_provider: Arc<dyn FileLockProvider>,

    /// Extra checks on `Upload-Metadata` before creation
    pub metadata_validator: Option<Arc<dyn MetadataValidator>>,
}

/// How long an upload lives before the store may discard it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Reset on every successful write
    Sliding(Duration),
    /// Fixed at creation
    Absolute(Duration),
}

impl Expiration {
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Sliding(timeout) | Self::Absolute(timeout) => *timeout,
        }
    }

    pub fn is_sliding(&self) -> bool {
        matches!(self, Self::Sliding(_))
    }

    /// Expiry for an upload touched at `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.timeout()).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for TusConfig {
    fn default() -> Self {
        Self {
            url_path: "/files".to_string(),
            max_allowed_upload_size: None,
            expiration: None,
            events: TusEvents::default(),
            lock_provider: Arc::new(InMemoryFileLockProvider::new()),
            metadata_validator: None,
        }
    }
}

impl std::fmt::Debug for TusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TusConfig")
            .field("url_path", &self.url_path)
            .field("max_allowed_upload_size", &self.max_allowed_upload_size)
            .field("expiration", &self.expiration)
            .field("events", &self.events)
            .field("metadata_validator", &self.metadata_validator.is_some())
            .finish_non_exhaustive()
    }
}

impl TusConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mount path
    pub fn with_url_path<S: Into<String>>(mut self, url_path: S) -> Self {
        self.url_path = url_path.into();
        self
    }

    /// Set max upload size
    pub fn with_max_upload_size(mut self, bytes: u64) -> Self {
        self.max_allowed_upload_size = Some(bytes);
        self
    }

    /// Set expiration policy
    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set application callbacks
    pub fn with_events(mut self, events: TusEvents) -> Self {
        self.events = events;
        self
    }

    /// Use a custom lock provider
    pub fn with_lock_provider<L: FileLockProvider + 'static>(mut self, provider: L) -> Self {
        self.lock_provider = Arc::new(provider);
        self
    }

    /// Validate metadata before creation
    pub fn with_metadata_validator<V: MetadataValidator + 'static>(mut self, validator: V) -> Self {
        self.metadata_validator = Some(Arc::new(validator));
        self
    }

    /// Overlay `PREFIX__URL_PATH`, `PREFIX__MAX_UPLOAD_SIZE` and
    /// `PREFIX__EXPIRATION_SECS` from the process environment
    pub fn from_env(prefix: &str) -> TusResult<Self> {
        Self::default().with_env_overrides(prefix, std::env::vars())
    }

    /// Apply `PREFIX__KEY` overrides from any key/value source
    pub fn with_env_overrides<I>(mut self, prefix: &str, vars: I) -> TusResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}__", prefix);

        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix(&prefix) else {
                continue;
            };

            match stripped.to_lowercase().replace("__", ".").as_str() {
                "url_path" => self.url_path = value,
                "max_upload_size" => {
                    self.max_allowed_upload_size = Some(parse_number(&key, &value)?);
                }
                "expiration_secs" => {
                    let secs = parse_number(&key, &value)?;
                    self.expiration = Some(Expiration::Sliding(Duration::from_secs(secs)));
                }
                _ => {}
            }
        }

        Ok(self)
    }
}

fn parse_number(key: &str, value: &str) -> TusResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| TusError::invalid(format!("{} must be a number, got {:?}", key, value)))
}
