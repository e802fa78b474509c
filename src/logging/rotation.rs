//! Log file rotation settings
//!
//! Rotation itself is done by `tracing-appender`; this module only maps the
//! configured policy onto it and bounds how many old files are kept.

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::Rotation;

/// Log rotation strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    /// Rotate logs daily
    #[default]
    Daily,
    /// Rotate logs hourly
    Hourly,
    /// Never rotate logs
    Never,
}

impl RotationStrategy {
    pub fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Daily => Rotation::DAILY,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Never => Rotation::NEVER,
        }
    }
}

/// Log rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationConfig {
    /// Rotation strategy
    #[serde(default)]
    pub strategy: RotationStrategy,

    /// Maximum number of rotated log files to keep (0 = keep all)
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_files() -> usize {
    7
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            strategy: RotationStrategy::Daily,
            max_files: default_max_files(),
        }
    }
}
