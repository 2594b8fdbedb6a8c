//! # pushbridge-settings
//!
//! Configuration management with layered sources for the push bridge.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **User file**: `~/.pushbridge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PUSHBRIDGE_*` overrides (highest priority)
//!
//! The global singleton is reloadable: [`reload_settings_from_path`] swaps
//! the cached value so later [`get_settings`] calls observe the new file.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

static SETTINGS: RwLock<Option<Arc<BridgeSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// Loads `~/.pushbridge/settings.json` with env overrides on first call and
/// caches the result. Falls back to compiled defaults if loading fails.
pub fn get_settings() -> Arc<BridgeSettings> {
    if let Some(ref s) = *SETTINGS.read() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            BridgeSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
///
/// Replaces any previously cached settings.
pub fn init_settings(settings: BridgeSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload settings from a specific file path and swap the global cache.
///
/// On error the cache is left untouched and the error is returned.
pub fn reload_settings_from_path(path: &Path) -> Result<Arc<BridgeSettings>> {
    let new = Arc::new(load_settings_from_path(path)?);
    *SETTINGS.write() = Some(Arc::clone(&new));
    tracing::info!(?path, "settings reloaded from disk");
    Ok(new)
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    *SETTINGS.write() = None;
}
