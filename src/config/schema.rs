//! Settings schema definitions for formsync configuration.
//!
//! All settings structs use `#[serde(default)]` to allow partial
//! configuration files. Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::session::DEFAULT_SUBSCRIBER_CAPACITY;

/// Root settings structure.
///
/// Loaded from `~/.formsync/settings.toml` with environment variable
/// interpolation support. Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormsyncSettings {
    /// Schema version for migrations
    pub version: u32,

    /// HTTP server binding
    pub server: ServerSettings,

    /// Broadcast hub tuning
    pub hub: HubSettings,

    /// Analysis collaborator configuration
    pub analysis: AnalysisSettings,
}

impl Default for FormsyncSettings {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSettings::default(),
            hub: HubSettings::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Per-subscriber queue capacity; overflow drops the newest update
    pub subscriber_capacity: usize,

    /// Seconds between SSE keep-alive comments
    pub heartbeat_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            heartbeat_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Gemini API key; supports `$VAR` / `${VAR}` references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    /// Model used for both form analysis and document grading
    pub model: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: "gemini-2.5-flash".to_string(),
        }
    }
}
