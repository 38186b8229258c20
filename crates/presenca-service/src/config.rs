use presenca_capture::{ModelSource, SessionConfig};
use presenca_core::{EuclideanMatcher, DEFAULT_MATCH_THRESHOLD};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for a face match.
    pub match_threshold: f32,
    /// Upper bound on one geolocation request.
    pub geolocation_timeout_secs: u64,
    /// How long to wait for video metadata before forcing playback.
    pub metadata_timeout_ms: u64,
    /// Directory holding the embedding model artifacts.
    pub model_dir: PathBuf,
    /// Remote fallback for the model artifacts.
    pub model_cdn: String,
    pub preferred_width: u32,
    pub preferred_height: u32,
}

impl Config {
    /// Load configuration from `PRESENCA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("presenca");

        let db_path = std::env::var("PRESENCA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("presenca.db"));

        let defaults = SessionConfig::default();
        let model_cdn = match &defaults.remote_models {
            ModelSource::Remote(url) => url.clone(),
            ModelSource::Local(path) => path.display().to_string(),
        };

        Self {
            db_path,
            match_threshold: threshold_from(std::env::var("PRESENCA_MATCH_THRESHOLD").ok()),
            geolocation_timeout_secs: env_u64("PRESENCA_GEOLOCATION_TIMEOUT_SECS", 10),
            metadata_timeout_ms: env_u64(
                "PRESENCA_METADATA_TIMEOUT_MS",
                defaults.metadata_timeout.as_millis() as u64,
            ),
            model_dir: std::env::var("PRESENCA_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    PathBuf::from(presenca_capture::platform::DEFAULT_LOCAL_MODELS)
                }),
            model_cdn: std::env::var("PRESENCA_MODEL_CDN").unwrap_or(model_cdn),
            preferred_width: env_u32("PRESENCA_CAMERA_WIDTH", defaults.preferred_width),
            preferred_height: env_u32("PRESENCA_CAMERA_HEIGHT", defaults.preferred_height),
        }
    }

    pub fn matcher(&self) -> EuclideanMatcher {
        EuclideanMatcher::new(self.match_threshold)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            preferred_width: self.preferred_width,
            preferred_height: self.preferred_height,
            metadata_timeout: Duration::from_millis(self.metadata_timeout_ms),
            local_models: ModelSource::Local(self.model_dir.clone()),
            remote_models: ModelSource::Remote(self.model_cdn.clone()),
        }
    }
}

/// Parse a match threshold, keeping the default for anything not a positive finite number.
fn threshold_from(raw: Option<String>) -> f32 {
    let Some(raw) = raw else {
        return DEFAULT_MATCH_THRESHOLD;
    };
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => {
            tracing::warn!(
                value = %raw,
                default = DEFAULT_MATCH_THRESHOLD,
                "ignoring invalid PRESENCA_MATCH_THRESHOLD"
            );
            DEFAULT_MATCH_THRESHOLD
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_defaults() {
        assert_eq!(threshold_from(None), DEFAULT_MATCH_THRESHOLD);
        assert_eq!(threshold_from(Some("0.45".into())), 0.45);
        assert_eq!(threshold_from(Some("-1".into())), DEFAULT_MATCH_THRESHOLD);
        assert_eq!(threshold_from(Some("NaN".into())), DEFAULT_MATCH_THRESHOLD);
        assert_eq!(threshold_from(Some("abc".into())), DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_session_config_uses_model_sources() {
        let config = Config {
            db_path: PathBuf::from("/tmp/p.db"),
            match_threshold: 0.5,
            geolocation_timeout_secs: 5,
            metadata_timeout_ms: 3000,
            model_dir: PathBuf::from("/srv/models"),
            model_cdn: "https://example.org/models".into(),
            preferred_width: 1280,
            preferred_height: 720,
        };
        let session = config.session_config();
        assert_eq!(session.local_models, ModelSource::Local(PathBuf::from("/srv/models")));
        assert_eq!(session.metadata_timeout, Duration::from_secs(3));
        assert_eq!(config.matcher().threshold(), 0.5);
    }
}
