use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::{
    bpf::{
        DEFAULT_COOKIE_TAG_MAP_PIN, DEFAULT_IFACE_INDEX_NAME_MAP_PIN, DEFAULT_IFACE_STATS_MAP_PIN,
        DEFAULT_STATS_MAP_PIN,
    },
    unknown_iface::DEFAULT_ALERT_THRESHOLD_BYTES,
};

fn default_detail_pin() -> PathBuf {
    PathBuf::from(DEFAULT_STATS_MAP_PIN)
}

fn default_device_pin() -> PathBuf {
    PathBuf::from(DEFAULT_IFACE_STATS_MAP_PIN)
}

fn default_iface_names_pin() -> PathBuf {
    PathBuf::from(DEFAULT_IFACE_INDEX_NAME_MAP_PIN)
}

fn default_cookie_tags_pin() -> PathBuf {
    PathBuf::from(DEFAULT_COOKIE_TAG_MAP_PIN)
}

fn default_alert_bytes() -> i64 {
    DEFAULT_ALERT_THRESHOLD_BYTES
}

fn default_clean_interval_secs() -> u64 {
    60
}

/// Pin paths of the kernel tables on bpffs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MapPaths {
    /// Per-(uid, tag, interface) counters.
    #[serde(default = "default_detail_pin")]
    pub detail: PathBuf,
    /// Per-interface counters.
    #[serde(default = "default_device_pin")]
    pub device: PathBuf,
    /// ifindex -> interface name.
    #[serde(default = "default_iface_names_pin")]
    pub iface_names: PathBuf,
    /// socket cookie -> (uid, tag).
    #[serde(default = "default_cookie_tags_pin")]
    pub cookie_tags: PathBuf,
}

impl Default for MapPaths {
    fn default() -> Self {
        Self {
            detail: default_detail_pin(),
            device: default_device_pin(),
            iface_names: default_iface_names_pin(),
            cookie_tags: default_cookie_tags_pin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub maps: MapPaths,

    /// Undercount on unnamed interfaces that raises the alert.
    #[serde(default = "default_alert_bytes")]
    pub unknown_iface_alert_bytes: i64,

    /// Owners whose detail rows are reported in the foreground set.
    #[serde(default)]
    pub foreground_owners: Vec<u32>,

    /// Seconds between tag map cleanups in `watch` mode.
    #[serde(default = "default_clean_interval_secs")]
    pub clean_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maps: MapPaths::default(),
            unknown_iface_alert_bytes: default_alert_bytes(),
            foreground_owners: Vec::new(),
            clean_interval_secs: default_clean_interval_secs(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw).context("failed to parse config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.clean_interval_secs.max(1))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.unknown_iface_alert_bytes > 0,
            "unknown_iface_alert_bytes must be greater than zero"
        );
        ensure!(
            self.clean_interval_secs > 0,
            "clean_interval_secs must be greater than zero"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.unknown_iface_alert_bytes, 100_000);
        assert_eq!(cfg.maps.detail, PathBuf::from(DEFAULT_STATS_MAP_PIN));
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let cfg = Config::from_json(
            r#"{"maps": {"device": "/tmp/dev"}, "foreground_owners": [10, 11]}"#,
        )
        .unwrap();
        assert_eq!(cfg.maps.device, PathBuf::from("/tmp/dev"));
        assert_eq!(cfg.maps.iface_names, PathBuf::from(DEFAULT_IFACE_INDEX_NAME_MAP_PIN));
        assert_eq!(cfg.foreground_owners, vec![10, 11]);
    }

    #[test]
    fn rejects_non_positive_threshold() {
        assert!(Config::from_json(r#"{"unknown_iface_alert_bytes": 0}"#).is_err());
        assert!(Config::from_json(r#"{"clean_interval_secs": 0}"#).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Path::new("/nonexistent/netstats.json")).is_err());
    }
}
