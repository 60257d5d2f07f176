//! # gqlws-settings
//!
//! Settings for the graphql-ws server, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`GqlWsSettings::default()`]
//! 2. **Settings file**: `$GQLWS_SETTINGS` or `./gqlws.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GQLWS_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use gqlws_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
