//! Configuration management

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
}

/// Static sizing of the engine. Fixed at construction; bearers and calls are
/// never reallocated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of regular-bearer slots.
    pub bearer_count: usize,
    /// Call-table size per regular bearer.
    pub calls_per_bearer: usize,
    pub max_provider_name_len: usize,
    pub max_uri_len: usize,
    pub max_scheme_list_len: usize,
    /// Upper bound for one call-state or current-calls report.
    pub report_buf_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bearer_count: 3,
            calls_per_bearer: 4,
            max_provider_name_len: 64,
            max_uri_len: 64,
            max_scheme_list_len: 64,
            report_buf_size: 512,
        }
    }
}

impl Config {
    /// Load the configuration: defaults, overridden by an optional file,
    /// overridden by `YODEL__`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("YODEL")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
