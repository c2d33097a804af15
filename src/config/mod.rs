// src/config/mod.rs
mod health;
mod models;

pub use health::HealthConfig;
pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Environment variables override file values, e.g.
/// `USER_SERVICE_DATABASE__HOST` or `USER_SERVICE_HEALTH__REQUIRED_TABLES=users,sessions`.
pub const ENV_PREFIX: &str = "USER_SERVICE";

/// Load settings from an optional file (YAML, JSON or TOML by extension)
/// layered under environment overrides.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    load_with_env(path.as_ref(), None)
}

/// `env` replaces the process environment when given.
fn load_with_env(path: &Path, env: Option<::config::Map<String, String>>) -> Result<Settings> {
    // Env values stay strings here; numeric and bool fields convert on
    // deserialization, so "007" or "2.0" keep their exact text.
    let settings: Settings = ::config::Config::builder()
        .add_source(::config::File::from(path).required(false))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        )
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    settings.validate()?;
    Ok(settings)
}
