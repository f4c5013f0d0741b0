use serde::Deserialize;
use std::path::PathBuf;

fn default_recordings_dir() -> PathBuf {
    PathBuf::from("recordings")
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_mb() -> usize {
    200
}

fn default_transcode() -> bool {
    true
}

/// Server configuration file structure (TOML)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Flat directory holding every recording (default: ./recordings)
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
    /// Address to listen on (default: 0.0.0.0, reachable from the LAN)
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on (default: 5000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload body in megabytes (default: 200)
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    /// Convert uploads to WAV (default: true). When false, uploads are
    /// stored as received and flagged with a warning.
    #[serde(default = "default_transcode")]
    pub transcode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            recordings_dir: default_recordings_dir(),
            bind: default_bind(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
            transcode: default_transcode(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_mb == 0 {
            return Err("max_upload_mb must be greater than 0".to_string());
        }
        if self.bind.trim().is_empty() {
            return Err("bind address must not be empty".to_string());
        }
        if self.recordings_dir.as_os_str().is_empty() {
            return Err("recordings_dir must not be empty".to_string());
        }
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn listen_addr(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }
}
