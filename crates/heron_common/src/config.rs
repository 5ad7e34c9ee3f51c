use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, HeronResult};

/// Top-level node configuration (`heron.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeronConfig {
    #[serde(default)]
    pub site: SiteSectionConfig,
    #[serde(default)]
    pub dr: DrSectionConfig,
}

impl Default for HeronConfig {
    fn default() -> Self {
        Self {
            site: SiteSectionConfig::default(),
            dr: DrSectionConfig::default(),
        }
    }
}

/// Execution-site configuration section in heron.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSectionConfig {
    /// Idle wait between empty polls of the site task queue, in milliseconds.
    /// The queue itself never blocks; this bounds the runner's poll cadence
    /// when no work is pending.
    pub idle_wait_ms: u64,
    /// During rejoin catch-up, how many logged tasks are replayed per live
    /// task pulled (replay is favored replay_ratio : 1).
    pub replay_ratio: u32,
    /// Queue depth at which the runner logs a warning (0 = never).
    #[serde(default)]
    pub queue_warn_depth: usize,
}

impl Default for SiteSectionConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 1,
            replay_ratio: 10,
            queue_warn_depth: 10_000,
        }
    }
}

/// DR (cross-datacenter replication) configuration section in heron.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrSectionConfig {
    /// Whether this node consumes a replicated stream.
    pub enabled: bool,
    /// Tag identifying THIS cluster in packed sequence identifiers.
    /// Must fit the 8-bit tag field, i.e. `[0, 255]`.
    pub cluster_tag: u16,
}

impl Default for DrSectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cluster_tag: 0,
        }
    }
}

impl HeronConfig {
    /// Parse a TOML document. Unknown fields are tolerated so older nodes
    /// can read configs written by newer ones.
    pub fn load_from_str(text: &str) -> HeronResult<Self> {
        let config: HeronConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants that serde cannot express.
    pub fn validate(&self) -> HeronResult<()> {
        if self.dr.cluster_tag > 0xFF {
            return Err(ConfigError::InvalidValue {
                field: "dr.cluster_tag",
                reason: format!("{} exceeds the 8-bit tag field", self.dr.cluster_tag),
            }
            .into());
        }
        if self.site.idle_wait_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "site.idle_wait_ms",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        if self.site.replay_ratio == 0 {
            return Err(ConfigError::InvalidValue {
                field: "site.replay_ratio",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HeronConfig::default();
        assert_eq!(config.site.idle_wait_ms, 1);
        assert_eq!(config.site.replay_ratio, 10);
        assert!(!config.dr.enabled);
        assert_eq!(config.dr.cluster_tag, 0);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_document() {
        let toml = r#"
            [site]
            idle_wait_ms = 5
            replay_ratio = 4
            queue_warn_depth = 500

            [dr]
            enabled = true
            cluster_tag = 12
        "#;
        let config = HeronConfig::load_from_str(toml).unwrap();
        assert_eq!(config.site.idle_wait_ms, 5);
        assert_eq!(config.site.replay_ratio, 4);
        assert_eq!(config.site.queue_warn_depth, 500);
        assert!(config.dr.enabled);
        assert_eq!(config.dr.cluster_tag, 12);
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let config = HeronConfig::load_from_str("").unwrap();
        assert_eq!(config.site.replay_ratio, 10);
        assert!(!config.dr.enabled);
    }

    #[test]
    fn test_cluster_tag_out_of_range_rejected() {
        let toml = r#"
            [dr]
            enabled = true
            cluster_tag = 256
        "#;
        let err = HeronConfig::load_from_str(toml).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("dr.cluster_tag"));
    }

    #[test]
    fn test_zero_idle_wait_rejected() {
        let toml = r#"
            [site]
            idle_wait_ms = 0
            replay_ratio = 10
        "#;
        let err = HeronConfig::load_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("site.idle_wait_ms"));
    }

    #[test]
    fn test_zero_replay_ratio_rejected() {
        let toml = r#"
            [site]
            idle_wait_ms = 1
            replay_ratio = 0
        "#;
        let err = HeronConfig::load_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("site.replay_ratio"));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = HeronConfig::load_from_str("not = [valid").unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
