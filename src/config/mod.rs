//! Configuration: typed TOML settings with env interpolation.

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, settings_path, SettingsManager};
pub use schema::{AnalysisSettings, FormsyncSettings, HubSettings, ServerSettings};
