use facegate_core::{ConfigError, EngineParams};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one subdirectory of face crops per user to enroll.
    pub enroll_dir: PathBuf,
    /// Directory polled for probe face crops.
    pub probe_dir: PathBuf,
    /// Optional TOML file overriding engine parameters.
    pub params_path: Option<PathBuf>,
    /// Whether to equalize and smooth crops before extraction.
    pub preprocess: bool,
    /// Delay between polls of the probe directory.
    pub poll_interval_ms: u64,
    /// Minimum gap between two recognition attempts.
    pub recognition_cooldown_ms: u64,
    /// Seconds before a status LED switches itself off.
    pub led_timeout_secs: u64,
    /// Seconds without a face before the display blanks.
    pub display_timeout_secs: u64,
    /// File or FIFO that receives one line per granted access.
    pub unlock_path: Option<PathBuf>,
    /// Whether to expose the D-Bus interface.
    pub dbus_enabled: bool,
    /// Use the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let parse_u64 = |key: &str, default: u64| {
            lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        let flag = |key: &str, default: bool| lookup(key).map(|v| v != "0").unwrap_or(default);

        Self {
            enroll_dir: lookup("FACEGATE_ENROLL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("enroll")),
            probe_dir: lookup("FACEGATE_PROBE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("probes")),
            params_path: lookup("FACEGATE_PARAMS").map(PathBuf::from),
            preprocess: flag("FACEGATE_PREPROCESS", true),
            poll_interval_ms: parse_u64("FACEGATE_POLL_INTERVAL_MS", 50),
            recognition_cooldown_ms: parse_u64("FACEGATE_COOLDOWN_MS", 3000),
            led_timeout_secs: parse_u64("FACEGATE_LED_TIMEOUT_SECS", 10),
            display_timeout_secs: parse_u64("FACEGATE_DISPLAY_TIMEOUT_SECS", 15),
            unlock_path: lookup("FACEGATE_UNLOCK_PATH").map(PathBuf::from),
            dbus_enabled: flag("FACEGATE_DBUS", true),
            session_bus: flag("FACEGATE_SESSION_BUS", false),
        }
    }

    /// Engine parameters from `params_path`, or the defaults.
    pub fn engine_params(&self) -> Result<EngineParams, ConfigError> {
        match &self.params_path {
            Some(path) => EngineParams::load(path),
            None => Ok(EngineParams::default()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn recognition_cooldown(&self) -> Duration {
        Duration::from_millis(self.recognition_cooldown_ms)
    }

    pub fn led_timeout(&self) -> Duration {
        Duration::from_secs(self.led_timeout_secs)
    }

    pub fn display_timeout(&self) -> Duration {
        Duration::from_secs(self.display_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("HOME", "/home/u")]);
        assert_eq!(cfg.enroll_dir, PathBuf::from("/home/u/.local/share/facegate/enroll"));
        assert_eq!(cfg.probe_dir, PathBuf::from("/home/u/.local/share/facegate/probes"));
        assert_eq!(cfg.recognition_cooldown(), Duration::from_secs(3));
        assert_eq!(cfg.led_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.display_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
        assert!(cfg.preprocess);
        assert!(cfg.dbus_enabled);
        assert!(!cfg.session_bus);
        assert!(cfg.params_path.is_none());
        assert!(cfg.unlock_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("XDG_DATA_HOME", "/data"),
            ("FACEGATE_PROBE_DIR", "/run/probes"),
            ("FACEGATE_COOLDOWN_MS", "500"),
            ("FACEGATE_PREPROCESS", "0"),
            ("FACEGATE_DBUS", "0"),
        ]);
        assert_eq!(cfg.enroll_dir, PathBuf::from("/data/facegate/enroll"));
        assert_eq!(cfg.probe_dir, PathBuf::from("/run/probes"));
        assert_eq!(cfg.recognition_cooldown_ms, 500);
        assert!(!cfg.preprocess);
        assert!(!cfg.dbus_enabled);
    }

    #[test]
    fn test_unparsable_number_falls_back() {
        let cfg = config(&[("FACEGATE_POLL_INTERVAL_MS", "soon")]);
        assert_eq!(cfg.poll_interval_ms, 50);
    }

    #[test]
    fn test_engine_params_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "faces_per_user = 2\n").unwrap();
        let path_str = path.to_string_lossy().into_owned();
        let cfg = config(&[("FACEGATE_PARAMS", path_str.as_str())]);
        assert_eq!(cfg.engine_params().unwrap().faces_per_user, 2);
        assert_eq!(config(&[]).engine_params().unwrap(), EngineParams::default());
    }
}
