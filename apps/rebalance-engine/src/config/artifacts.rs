//! Run artifact output configuration.

use serde::{Deserialize, Serialize};

/// Run artifact output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory receiving one subdirectory per run.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Path to the asset universe JSON consumed by the binary.
    #[serde(default = "default_assets_path")]
    pub assets_path: String,
    /// Path to the target allocation JSON consumed by the binary.
    #[serde(default = "default_targets_path")]
    pub targets_path: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            assets_path: default_assets_path(),
            targets_path: default_targets_path(),
        }
    }
}

fn default_output_dir() -> String {
    "runs".to_string()
}

fn default_assets_path() -> String {
    "data/assets.json".to_string()
}

fn default_targets_path() -> String {
    "data/targets.json".to_string()
}
