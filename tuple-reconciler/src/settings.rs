// Reconciler settings
use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{ReconcileError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `TUPLE_SYNC_BATCH_SIZE=50`
pub const ENV_PREFIX: &str = "TUPLE_SYNC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
    pub batch_size: usize,
    pub max_concurrent_namespaces: usize,
    pub interval_secs: u64,
    pub namespaces: Vec<String>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_namespaces: 4,
            interval_secs: 300,
            namespaces: vec!["default".to_string()],
        }
    }
}

impl ReconcilerSettings {
    /// Load defaults, then the optional file, then `TUPLE_SYNC_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("namespaces"),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > DEFAULT_BATCH_SIZE {
            return Err(ReconcileError::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                DEFAULT_BATCH_SIZE, self.batch_size
            )));
        }
        if self.max_concurrent_namespaces == 0 {
            return Err(ReconcileError::Config(
                "max_concurrent_namespaces must be positive".to_string(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(ReconcileError::Config("interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
