//! # lifeos-settings
//!
//! Layered configuration for the Life OS host.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LifeOsSettings::default()`]
//! 2. **User file**: `~/.lifeos/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LIFEOS_*` overrides (highest priority)
//!
//! There is no global instance; the host loads settings once and passes
//! the sections it needs to each component.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, lifeos_dir, load_settings, load_settings_from_path, settings_path};
pub use types::*;
