use facegate_core::store::DEFAULT_MAX_IMAGE_BYTES;
use facegate_core::StoreConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of enrolled source images (`<person>[_<n>].<ext>`).
    pub known_faces_dir: PathBuf,
    /// Path to the gallery cache file.
    pub cache_path: PathBuf,
    /// Maximum embedding distance accepted as a match.
    pub tolerance: f32,
    /// Base URL of the embedding provider service.
    pub provider_url: String,
    /// Per-call timeout for the embedding provider.
    pub provider_timeout_secs: u64,
    /// Upper bound on a whole recognize/enroll request.
    pub request_timeout_secs: u64,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Largest accepted image upload in bytes.
    pub max_upload_bytes: usize,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            known_faces_dir: env_path("FACEGATE_KNOWN_FACES_DIR", "known_faces"),
            cache_path: env_path("FACEGATE_CACHE_PATH", "face_encodings.bin"),
            tolerance: env_f32("FACEGATE_TOLERANCE", 0.6),
            provider_url: std::env::var("FACEGATE_PROVIDER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5002".to_string()),
            provider_timeout_secs: env_u64("FACEGATE_PROVIDER_TIMEOUT_SECS", 30),
            request_timeout_secs: env_u64("FACEGATE_REQUEST_TIMEOUT_SECS", 60),
            db_path: env_path("FACEGATE_DB_PATH", "data/attendance.db"),
            max_upload_bytes: env_usize("FACEGATE_MAX_UPLOAD_BYTES", DEFAULT_MAX_IMAGE_BYTES),
            bus: match std::env::var("FACEGATE_BUS").as_deref() {
                Ok("system") => BusKind::System,
                _ => BusKind::Session,
            },
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            known_faces_dir: self.known_faces_dir.clone(),
            cache_path: self.cache_path.clone(),
            max_image_bytes: self.max_upload_bytes,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
