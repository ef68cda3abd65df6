//! Settings loading, saving, and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.formsync/settings.toml` (or an explicit path)
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - Atomic file writes with temp file + rename

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use super::schema::FormsyncSettings;

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".formsync")
        .join("settings.toml")
}

/// Manages settings loading, interpolation, and persistence.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: RwLock<FormsyncSettings>,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager, loading from disk if available.
    pub async fn new() -> Result<Self> {
        Self::from_path(settings_path()).await
    }

    /// Load from an explicit path.
    pub async fn from_path(path: PathBuf) -> Result<Self> {
        let settings = Self::load_from_path(&path).await?;
        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    async fn load_from_path(path: &PathBuf) -> Result<FormsyncSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(FormsyncSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")?;

        let mut settings: FormsyncSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        Self::resolve_env_vars(&mut settings);

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references in string fields.
    fn resolve_env_vars(settings: &mut FormsyncSettings) {
        if let Some(key) = &mut settings.analysis.gemini_api_key {
            if let Some(resolved) = resolve_env_ref(key) {
                *key = resolved;
            }
        }
    }

    /// Get the current settings (read-only).
    pub async fn get(&self) -> FormsyncSettings {
        self.settings.read().await.clone()
    }

    /// Update settings and persist to disk.
    pub async fn update(&self, new_settings: FormsyncSettings) -> Result<()> {
        *self.settings.write().await = new_settings.clone();

        let toml_string =
            toml::to_string_pretty(&new_settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, &toml_string).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::info!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// Resolve a `$VAR` or `${VAR}` reference against the environment.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();

    if trimmed.starts_with('$') {
        let var_name = if trimmed.starts_with("${") && trimmed.ends_with('}') {
            &trimmed[2..trimmed.len() - 1]
        } else {
            &trimmed[1..]
        };

        return std::env::var(var_name).ok();
    }

    None
}

/// Get a setting value with environment variable fallback.
///
/// Priority order:
/// 1. Settings value (if set and non-empty)
/// 2. Environment variable (first match from list)
/// 3. Default value
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    if let Some(v) = setting {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }

    for var in env_vars {
        if let Ok(v) = std::env::var(var) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }

    default
}
