use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("設定値が不正です: {key}={value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Configuration {
    pub capture: CaptureConfig,
    pub detection: DetectionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureConfig {
    // 未指定の場合は起動時に選択する
    pub interface: Option<String>,
    // 指定された場合はライブキャプチャの代わりにファイルを読む
    pub pcap_file: Option<PathBuf>,
    pub promiscuous: bool,
    pub read_timeout_ms: u64,
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionConfig {
    pub rules_file: Option<PathBuf>,
    pub default_rules: bool,
    pub dns_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                interface: None,
                pcap_file: None,
                promiscuous: true,
                read_timeout_ms: 500,
                buffer_size: 65535,
            },
            detection: DetectionConfig {
                rules_file: None,
                default_rules: true,
                dns_port: 53,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    // インターフェース名に .pcap を含む場合もファイルとして扱う
    pub fn offline_file(&self) -> Option<PathBuf> {
        self.pcap_file.clone().or_else(|| {
            self.interface
                .as_deref()
                .filter(|name| name.contains(".pcap"))
                .map(PathBuf::from)
        })
    }
}

impl Configuration {
    pub fn from_env() -> Result<Self, ConfigError> {
        // .env は任意
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Configuration {
            capture: CaptureConfig {
                interface: text("INSPECTOR_INTERFACE"),
                pcap_file: text("INSPECTOR_PCAP_FILE").map(PathBuf::from),
                promiscuous: parse_bool("INSPECTOR_PROMISCUOUS", text("INSPECTOR_PROMISCUOUS"), defaults.capture.promiscuous)?,
                read_timeout_ms: parse_number("INSPECTOR_READ_TIMEOUT_MS", text("INSPECTOR_READ_TIMEOUT_MS"), defaults.capture.read_timeout_ms)?,
                buffer_size: parse_number("INSPECTOR_BUFFER_SIZE", text("INSPECTOR_BUFFER_SIZE"), defaults.capture.buffer_size)?,
            },
            detection: DetectionConfig {
                rules_file: text("INSPECTOR_RULES_FILE").map(PathBuf::from),
                default_rules: parse_bool("INSPECTOR_DEFAULT_RULES", text("INSPECTOR_DEFAULT_RULES"), defaults.detection.default_rules)?,
                dns_port: parse_number("INSPECTOR_DNS_PORT", text("INSPECTOR_DNS_PORT"), defaults.detection.dns_port)?,
            },
            logging: LoggingConfig {
                level: text("INSPECTOR_LOG_LEVEL").unwrap_or(defaults.logging.level),
                file: text("INSPECTOR_LOG_FILE").map(PathBuf::from),
            },
        })
    }
}

fn parse_bool(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Configuration::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Configuration::default());
        assert_eq!(config.capture.read_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn values_are_read() {
        let config = Configuration::from_lookup(lookup(&[
            ("INSPECTOR_INTERFACE", "eth1"),
            ("INSPECTOR_PROMISCUOUS", "off"),
            ("INSPECTOR_RULES_FILE", "rules/web.json"),
            ("INSPECTOR_DEFAULT_RULES", "false"),
            ("INSPECTOR_DNS_PORT", "5353"),
            ("INSPECTOR_LOG_LEVEL", "debug"),
            ("INSPECTOR_LOG_FILE", " "),
        ]))
        .unwrap();

        assert_eq!(config.capture.interface.as_deref(), Some("eth1"));
        assert!(!config.capture.promiscuous);
        assert_eq!(config.detection.rules_file, Some(PathBuf::from("rules/web.json")));
        assert!(!config.detection.default_rules);
        assert_eq!(config.detection.dns_port, 5353);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, None, "空白のみの値は未設定として扱います");
    }

    #[test]
    fn offline_file_selection() {
        let live = Configuration::from_lookup(lookup(&[("INSPECTOR_INTERFACE", "eth0")])).unwrap();
        assert_eq!(live.capture.offline_file(), None);

        let by_name = Configuration::from_lookup(lookup(&[("INSPECTOR_INTERFACE", "captures/web.pcap")])).unwrap();
        assert_eq!(by_name.capture.offline_file(), Some(PathBuf::from("captures/web.pcap")));

        let explicit = Configuration::from_lookup(lookup(&[
            ("INSPECTOR_INTERFACE", "eth0"),
            ("INSPECTOR_PCAP_FILE", "dump.pcap"),
        ]))
        .unwrap();
        assert_eq!(explicit.capture.offline_file(), Some(PathBuf::from("dump.pcap")));
    }

    #[test]
    fn invalid_values_are_reported() {
        let error = Configuration::from_lookup(lookup(&[("INSPECTOR_DNS_PORT", "70000")])).unwrap_err();
        assert_eq!(
            error,
            ConfigError::Invalid {
                key: "INSPECTOR_DNS_PORT",
                value: "70000".to_string()
            }
        );
        assert!(Configuration::from_lookup(lookup(&[("INSPECTOR_PROMISCUOUS", "maybe")])).is_err());
    }
}
