//! Fuzzer settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn default_cases() -> u32 {
    100
}

fn default_timeout() -> f64 {
    10.0
}

/// External configuration applied to every generated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Swagger spec path (local file, JSON or YAML)
    pub spec: PathBuf,

    /// Base URL prepended to every generated path
    pub spec_host: String,

    /// Default headers applied to every generated request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Extra status codes allowed beyond those declared in the spec
    #[serde(default)]
    pub http_code: Vec<u16>,

    /// Trials per run
    #[serde(default = "default_cases")]
    pub cases: u32,

    /// Network timeout per request, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spec: PathBuf::from("swagger.json"),
            spec_host: "http://localhost:8080".to_string(),
            headers: HashMap::new(),
            http_code: Vec::new(),
            cases: default_cases(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML (or JSON) file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from the default locations, falling back to defaults when no
    /// file exists.
    ///
    /// # Errors
    ///
    /// Returns error if a found file cannot be parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".swagfuzz.toml", ".swagfuzz.json", "swagfuzz.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Create example config file content.
    #[must_use]
    pub fn example() -> &'static str {
        r#"# swagfuzz configuration

# Swagger spec (local file path, JSON or YAML)
spec = "swagger.json"

# Base URL every generated path is appended to
spec_host = "http://localhost:8080"

# Status codes accepted in addition to the ones the spec declares
http_code = [404, 405]

# Trials per run
cases = 100

# Per-request network timeout in seconds
timeout_secs = 10.0

# Default headers (auth, api keys). Keep this table last: keys after it
# would be parsed as headers.
[headers]
# Authorization = "Bearer your-token-here"
# X-API-Key = "your-api-key"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
