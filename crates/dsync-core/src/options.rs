//! DataSync task options
//!
//! [`TaskOverrides`] is what a migration entry may set; [`TaskOptions`] is the
//! resolved set sent with the create-task call.

use serde::{Deserialize, Serialize};

/// Only copy data that changed since the last run
pub const DEFAULT_TRANSFER_MODE: &str = "CHANGED";
/// No post-transfer verification
pub const DEFAULT_VERIFY_MODE: &str = "NONE";
/// Always overwrite destination objects
pub const DEFAULT_OVERWRITE_MODE: &str = "ALWAYS";
/// Log every transferred object
pub const DEFAULT_LOG_LEVEL: &str = "TRANSFER";
/// Keep destination objects deleted at the source
pub const DEFAULT_PRESERVE_DELETED_FILES: &str = "PRESERVE";
/// Do not copy device files
pub const DEFAULT_PRESERVE_DEVICES: &str = "NONE";

/// Per-migration option overrides, keyed as in the DataSync API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct TaskOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_deleted_files: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_devices: Option<String>,
    /// Execution mode hint (e.g. `ENHANCED`), passed through only when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_mode: Option<String>,
}

/// Resolved task options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOptions {
    pub transfer_mode: String,
    pub verify_mode: String,
    pub overwrite_mode: String,
    pub log_level: String,
    pub preserve_deleted_files: String,
    pub preserve_devices: String,
}

impl TaskOptions {
    /// Apply overrides on top of the defaults
    #[must_use]
    pub fn resolve(overrides: &TaskOverrides) -> Self {
        let pick = |value: &Option<String>, default: &str| {
            value.clone().unwrap_or_else(|| default.to_string())
        };
        Self {
            transfer_mode: pick(&overrides.transfer_mode, DEFAULT_TRANSFER_MODE),
            verify_mode: pick(&overrides.verify_mode, DEFAULT_VERIFY_MODE),
            overwrite_mode: pick(&overrides.overwrite_mode, DEFAULT_OVERWRITE_MODE),
            log_level: pick(&overrides.log_level, DEFAULT_LOG_LEVEL),
            preserve_deleted_files: pick(
                &overrides.preserve_deleted_files,
                DEFAULT_PRESERVE_DELETED_FILES,
            ),
            preserve_devices: pick(&overrides.preserve_devices, DEFAULT_PRESERVE_DEVICES),
        }
    }
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self::resolve(&TaskOverrides::default())
    }
}
