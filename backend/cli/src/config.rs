use serde::Deserialize;

/// Voice notes service configuration.
///
/// Built once at process start and passed into collaborators; there is no
/// ambient settings lookup anywhere else in the codebase.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// SQLite database path
    pub db_path: String,
    /// Directory uploaded audio files are written to
    pub upload_dir: String,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,
    /// Audio file extensions accepted for upload
    pub allowed_extensions: Vec<String>,
    /// AssemblyAI API key
    pub assemblyai_api_key: String,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            db_path: "voicenotes.db".to_string(),
            upload_dir: "./uploads".to_string(),
            max_upload_bytes: 50_000_000,
            allowed_extensions: default_extensions(),
            assemblyai_api_key: String::new(),
            log_level: "info".to_string(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".mp3", ".mp4", ".wav", ".ogg", ".m4a"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            bind_address: std::env::var("VOICENOTES_BIND").unwrap_or(defaults.bind_address),
            port: std::env::var("VOICENOTES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            db_path: std::env::var("VOICENOTES_DB").unwrap_or(defaults.db_path),
            upload_dir: std::env::var("VOICENOTES_UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            max_upload_bytes: std::env::var("VOICENOTES_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            allowed_extensions: defaults.allowed_extensions,
            assemblyai_api_key: std::env::var("ASSEMBLYAI_API_KEY").unwrap_or_default(),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }
}
