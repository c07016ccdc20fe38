//! Engine configuration.
//!
//! Loaded once at boot by the embedding daemon and passed by reference into
//! the core. Only the knobs the state engine itself consumes live here;
//! listener/TLS/oper configuration belongs to the outer layers.

use serde::Deserialize;

use crate::error::ProtoError;

/// Identity of the local server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name shown on the network (e.g. `hub.straylight.net`).
    pub name: String,
    /// TS6 server ID, three characters (`[0-9][0-9A-Z]{2}`).
    pub sid: String,
    /// Free-form server description.
    #[serde(default)]
    pub description: String,
}

/// Length and batching limits applied by the state engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    /// Maximum length of a list-mode entry (ban/except/invex masks).
    #[serde(default = "default_max_ban_length")]
    pub max_ban_length: usize,
    /// Maximum length of any other mode parameter.
    #[serde(default = "default_max_param_length")]
    pub max_param_length: usize,
    /// Maximum parametered modes per emitted MODE/TMODE line.
    #[serde(default = "default_max_modes_per_line")]
    pub max_modes_per_line: usize,
    /// Width limit for one NAMES reply line, measured after the
    /// prefix-decorated nick is appended.
    #[serde(default = "default_names_line_width")]
    pub names_line_width: usize,
    /// Lowest status level that may change simple modes ("basic status").
    #[serde(default = "default_basic_status_level")]
    pub basic_status_level: u8,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_ban_length: default_max_ban_length(),
            max_param_length: default_max_param_length(),
            max_modes_per_line: default_max_modes_per_line(),
            names_line_width: default_names_line_width(),
            basic_status_level: default_basic_status_level(),
        }
    }
}

fn default_max_ban_length() -> usize {
    195
}

fn default_max_param_length() -> usize {
    100
}

fn default_max_modes_per_line() -> usize {
    4
}

fn default_names_line_width() -> usize {
    500
}

fn default_basic_status_level() -> u8 {
    1 // halfop
}

/// Top-level configuration consumed by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Local server identity.
    pub server: ServerConfig,
    /// Engine limits.
    #[serde(default)]
    pub limits: Limits,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ProtoError> {
        toml::from_str(text).map_err(|e| ProtoError::BadParameter(e.to_string()))
    }
}
