//! Configuration file
//!
//! A JSON object describing one raid group and its verify settings. Every
//! field has a default, so `{}` is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::geometry::RaidType;
use crate::raid_group::RaidGroup;
use crate::verify::{
    VerifyKind, VerifySettings, DEFAULT_CHUNKS_PER_CYCLE, DEFAULT_PERSIST_INTERVAL_MS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Number of disks in the group
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_raid_type")]
    pub raid_type: RaidType,

    /// Blocks per element
    #[serde(default = "default_element_size")]
    pub element_size: u32,

    #[serde(default = "default_elements_per_parity")]
    pub elements_per_parity: u32,

    /// Exported capacity at creation, in blocks
    #[serde(default = "default_exported_capacity")]
    pub exported_capacity: u64,

    #[serde(default)]
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Administratively enabled verify kinds, by name
    #[serde(default = "default_enabled_kinds")]
    pub enabled_kinds: Vec<String>,

    #[serde(default = "default_chunks_per_cycle")]
    pub chunks_per_cycle: u64,

    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
}

fn default_group_id() -> String {
    "rg-0".to_string()
}
fn default_width() -> u32 {
    5
}
fn default_raid_type() -> RaidType {
    RaidType::Raid5
}
fn default_element_size() -> u32 {
    128
}
fn default_elements_per_parity() -> u32 {
    8
}
fn default_exported_capacity() -> u64 {
    100_000
}
fn default_enabled_kinds() -> Vec<String> {
    VerifyKind::PRIORITY
        .iter()
        .map(|kind| kind.as_str().to_string())
        .collect()
}
fn default_chunks_per_cycle() -> u64 {
    DEFAULT_CHUNKS_PER_CYCLE
}
fn default_persist_interval_ms() -> u64 {
    DEFAULT_PERSIST_INTERVAL_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            width: default_width(),
            raid_type: default_raid_type(),
            element_size: default_element_size(),
            elements_per_parity: default_elements_per_parity(),
            exported_capacity: default_exported_capacity(),
            verify: VerifyConfig::default(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            enabled_kinds: default_enabled_kinds(),
            chunks_per_cycle: default_chunks_per_cycle(),
            persist_interval_ms: default_persist_interval_ms(),
        }
    }
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// The file at `path`, or the defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> CliResult<()> {
        if self.group_id.trim().is_empty() {
            return Err(CliError::config_error("group_id must not be empty"));
        }

        self.raid_type
            .validate_width(self.width)
            .map_err(|e| CliError::config_error(e.to_string()))?;

        if self.element_size == 0 {
            return Err(CliError::config_error("element_size must be > 0"));
        }
        if self.elements_per_parity == 0 {
            return Err(CliError::config_error("elements_per_parity must be > 0"));
        }
        if self.verify.chunks_per_cycle == 0 {
            return Err(CliError::config_error("verify.chunks_per_cycle must be > 0"));
        }

        self.verify_settings().map(|_| ())
    }

    /// Verify settings with the kind names resolved.
    pub fn verify_settings(&self) -> CliResult<VerifySettings> {
        let mut enabled_kinds = 0;
        for name in &self.verify.enabled_kinds {
            let kind = VerifyKind::from_name(name).ok_or_else(|| {
                CliError::config_error(format!("Unknown verify kind: '{}'", name))
            })?;
            enabled_kinds |= kind.flag();
        }
        Ok(VerifySettings {
            enabled_kinds,
            chunks_per_cycle: self.verify.chunks_per_cycle,
            persist_interval_ms: self.verify.persist_interval_ms,
        })
    }

    /// Build a fresh group object as one controller sees it.
    pub fn build_group(&self, id: &str) -> CliResult<RaidGroup> {
        RaidGroup::new(
            id,
            self.width,
            self.raid_type,
            self.element_size,
            self.elements_per_parity,
            self.exported_capacity,
        )
        .map_err(|e| CliError::group_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let file = write_config("{}");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.verify_settings().unwrap(), VerifySettings::default());
    }

    #[test]
    fn test_partial_config() {
        let file = write_config(
            r#"{"group_id": "rg-7", "raid_type": "raid6", "width": 6,
                "verify": {"enabled_kinds": ["error", "read_only"]}}"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.raid_type, RaidType::Raid6);
        assert_eq!(config.verify.chunks_per_cycle, DEFAULT_CHUNKS_PER_CYCLE);

        let settings = config.verify_settings().unwrap();
        assert_eq!(
            settings.enabled_kinds,
            VerifyKind::Error.flag() | VerifyKind::ReadOnly.flag()
        );
    }

    #[test]
    fn test_unknown_verify_kind_rejected() {
        let file = write_config(r#"{"verify": {"enabled_kinds": ["sniff"]}}"#);
        let err = Config::load(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "RG_CLI_CONFIG_ERROR");
        assert!(err.message().contains("sniff"));
    }

    #[test]
    fn test_zero_chunks_per_cycle_rejected() {
        let file = write_config(r#"{"verify": {"chunks_per_cycle": 0}}"#);
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let file = write_config("{ not json");
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.message().starts_with("Invalid config JSON"));
    }

    #[test]
    fn test_missing_file_rejected() {
        let err = Config::load(Path::new("/nonexistent/raidgroup.json")).unwrap_err();
        assert!(err.message().starts_with("Failed to read config"));
    }

    #[test]
    fn test_build_group() {
        let group = Config::default().build_group("rg-a").unwrap();
        assert_eq!(group.id(), "rg-a");
        assert_eq!(group.exported_capacity(), 100_000);
    }
}
