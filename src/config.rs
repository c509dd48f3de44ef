//! Harness configuration loaded from `fpprobe.toml`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::kernel::SourceFormat;

/// File name searched for when no `--config` is given.
pub const CONFIG_FILE: &str = "fpprobe.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub source: SourceFormat,
    pub device: DeviceConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    #[default]
    All,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendChoice::All => "all",
            BackendChoice::Vulkan => "vulkan",
            BackendChoice::Metal => "metal",
            BackendChoice::Dx12 => "dx12",
            BackendChoice::Gl => "gl",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerChoice {
    #[default]
    High,
    Low,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub backend: BackendChoice,
    pub power_preference: PowerChoice,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub format: ReportFormat,
    /// Overrides the per-test decimal count when set.
    pub decimals: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from `path`. The file must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Find `fpprobe.toml` in `start_dir` or its ancestors.
    pub fn find(start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load the explicit file if given, else a discovered one, else defaults.
    pub fn resolve(explicit: Option<&Path>, start_dir: &Path) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::find(start_dir) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = HarnessConfig::from_toml_str("", Path::new("fpprobe.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.source.delimiter, "@@");
        assert_eq!(config.source.directive, "#version");
        assert_eq!(config.device.backend, BackendChoice::All);
        assert_eq!(config.report.format, ReportFormat::Text);
        assert_eq!(config.report.decimals, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[source]
delimiter = "%%"

[device]
backend = "vulkan"
power_preference = "low"

[report]
format = "json"
decimals = 6

[logging]
level = "debug"
"#,
        )
        .unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.source.delimiter, "%%");
        assert_eq!(config.source.directive, "#version");
        assert_eq!(config.device.backend, BackendChoice::Vulkan);
        assert_eq!(config.device.power_preference, PowerChoice::Low);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.report.decimals, Some(6));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = HarnessConfig::from_toml_str("[device]\nbackend = \"cuda\"\n", Path::new("x.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        let err = HarnessConfig::from_toml_str("[report]\nprecision = 3\n", Path::new("x.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("x.toml"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = HarnessConfig::resolve(Some(&missing), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_discovered_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[report]\ndecimals = 3\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            HarnessConfig::find(&nested),
            Some(dir.path().join(CONFIG_FILE))
        );
        let config = HarnessConfig::resolve(None, &nested).unwrap();
        assert_eq!(config.report.decimals, Some(3));
    }

    #[test]
    fn test_no_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        // tempdir ancestors could in principle hold a config; only assert
        // when none is found.
        if HarnessConfig::find(dir.path()).is_none() {
            let config = HarnessConfig::resolve(None, dir.path()).unwrap();
            assert_eq!(config, HarnessConfig::default());
        }
    }
}
