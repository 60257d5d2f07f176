//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the fields it changes.

mod protocol;
mod server;

pub use protocol::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Paths served by the host itself.
const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "path": "/subscriptions" },
///   "protocol": { "requireConnectionInit": true },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GqlWsSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Per-connection protocol policy.
    pub protocol: ProtocolSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl GqlWsSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.path must start with '/': {}",
                self.server.path
            )));
        }
        if RESERVED_PATHS.contains(&self.server.path.as_str()) {
            return Err(SettingsError::InvalidValue(format!(
                "server.path {} is reserved",
                self.server.path
            )));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
