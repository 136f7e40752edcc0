use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Identifier stamped on every punch from this kiosk.
    pub device_id: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Enrollment source tree: `<dir>/<id>_<name>/*.jpg`.
    pub enrollment_dir: PathBuf,
    /// Directory containing the face model files.
    pub model_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub recognition_threshold: f32,
    /// Consecutive frames required before a match confirms.
    pub verification_frames: u32,
    /// Seconds before the same identity may punch again.
    pub cooldown_secs: u64,
    /// Run inference on every Nth frame to bound CPU.
    pub frame_skip: u32,
    /// Seconds between incremental enrollment scans.
    pub scan_interval_secs: u64,
    /// MQTT broker endpoint.
    pub broker_host: String,
    pub broker_port: u16,
    pub broker_username: Option<String>,
    pub broker_password: Option<String>,
    /// Topic prefix; per-device topics hang off `<prefix>/<device_id>`.
    pub topic_prefix: String,
    /// Seconds between outbound sync cycles.
    pub sync_interval_secs: u64,
    /// Seconds to back off when the reachability probe fails.
    pub retry_interval_secs: u64,
    /// Max records published per sync cycle.
    pub sync_batch_limit: usize,
    /// Bounded wait for one publish confirmation.
    pub publish_timeout_secs: u64,
    /// External endpoint for the reachability probe.
    pub probe_addr: String,
}

impl Config {
    /// Load configuration from `TALLY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var("TALLY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| tally_store::default_db_path());

        let enrollment_dir = std::env::var("TALLY_ENROLLMENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                db_path
                    .parent()
                    .map(|p| p.join("known_faces"))
                    .unwrap_or_else(|| PathBuf::from("known_faces"))
            });

        let model_dir = std::env::var("TALLY_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| tally_core::provider::default_model_dir());

        Self {
            device_id: std::env::var("TALLY_DEVICE_ID")
                .unwrap_or_else(|_| "kiosk-01".to_string()),
            db_path,
            enrollment_dir,
            model_dir,
            recognition_threshold: env_f32("TALLY_RECOGNITION_THRESHOLD", 0.65),
            verification_frames: env_u32("TALLY_VERIFICATION_FRAMES", 5),
            cooldown_secs: env_u64("TALLY_COOLDOWN_SECS", 10),
            frame_skip: env_u32("TALLY_FRAME_SKIP", 3),
            scan_interval_secs: env_u64("TALLY_SCAN_INTERVAL_SECS", 60),
            broker_host: std::env::var("TALLY_BROKER_HOST")
                .unwrap_or_else(|_| "broker.emqx.io".to_string()),
            broker_port: env_u16("TALLY_BROKER_PORT", 1883),
            broker_username: std::env::var("TALLY_BROKER_USERNAME").ok(),
            broker_password: std::env::var("TALLY_BROKER_PASSWORD").ok(),
            topic_prefix: std::env::var("TALLY_TOPIC_PREFIX")
                .unwrap_or_else(|_| "attendance".to_string()),
            sync_interval_secs: env_u64("TALLY_SYNC_INTERVAL_SECS", 10),
            retry_interval_secs: env_u64("TALLY_RETRY_INTERVAL_SECS", 15),
            sync_batch_limit: env_usize("TALLY_SYNC_BATCH_LIMIT", 10),
            publish_timeout_secs: env_u64("TALLY_PUBLISH_TIMEOUT_SECS", 3),
            probe_addr: std::env::var("TALLY_PROBE_ADDR")
                .unwrap_or_else(|_| "8.8.8.8:53".to_string()),
        }
    }

    /// Per-device topic prefix for the broker session.
    pub fn device_topic_prefix(&self) -> String {
        format!("{}/{}", self.topic_prefix, self.device_id)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
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
