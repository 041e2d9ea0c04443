use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Environment variable that points at an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "UPSCALE_BRIDGE_CONFIG";

/// File name looked up inside the per-user configuration directory.
pub const CONFIG_FILE_NAME: &str = "bridge.toml";

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How colour values are treated while the scaler reconstructs new pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorProcessing {
    /// Filter in a gamma-encoded, vision-weighted space.
    #[default]
    Perceptual,
    /// Filter the stored values as linear light.
    Linear,
    /// Tonemap around the filter so bright values do not ring.
    Hdr,
}

impl<'de> Deserialize<'de> for ColorProcessing {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Case-insensitive; `default` and `gamma` are accepted for `perceptual`.
impl FromStr for ColorProcessing {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "perceptual" | "default" | "gamma" => Ok(ColorProcessing::Perceptual),
            "linear" => Ok(ColorProcessing::Linear),
            "hdr" => Ok(ColorProcessing::Hdr),
            other => Err(format!(
                "invalid color processing mode '{other}'; expected perceptual, linear, or hdr"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub upscale: UpscaleSection,
    #[serde(default)]
    pub fallback: FallbackSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpscaleSection {
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub color_processing: ColorProcessing,
    #[serde(default = "default_true")]
    pub wait_for_completion: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FallbackSection {
    #[serde(default = "default_pattern_time")]
    pub time: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingSection {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_true")]
    pub forward_to_host: bool,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_scale() -> f32 {
    2.0
}

fn default_pattern_time() -> f32 {
    4.0
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            upscale: UpscaleSection::default(),
            fallback: FallbackSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for UpscaleSection {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            color_processing: ColorProcessing::default(),
            wait_for_completion: true,
        }
    }
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self {
            time: default_pattern_time(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            forward_to_host: true,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BridgeConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads the configuration from the first location that exists.
    ///
    /// Returns the defaults together with `None` when no file is found.
    pub fn discover() -> Result<(Self, Option<PathBuf>), ConfigError> {
        match discover_path() {
            Some(path) => Self::load(&path).map(|config| (config, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CURRENT_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CURRENT_VERSION}",
                self.version
            )));
        }

        let scale = self.upscale.scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "upscale.scale must be a positive number, got {scale}"
            )));
        }

        if !self.fallback.time.is_finite() {
            return Err(ConfigError::Invalid(
                "fallback.time must be a finite number".into(),
            ));
        }

        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.filter may not be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Resolves the configuration file path, honouring [`CONFIG_ENV_VAR`] first.
///
/// An explicit path from the environment is returned even if it does not
/// exist so the caller surfaces the read error instead of silently falling
/// back to defaults.
pub fn discover_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_ENV_VAR) {
        if !explicit.is_empty() {
            return Some(PathBuf::from(explicit));
        }
    }

    let dirs = directories_next::ProjectDirs::from("", "", "upscale-bridge")?;
    let candidate = dirs.config_dir().join(CONFIG_FILE_NAME);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[upscale]
scale = 1.5
color_processing = "hdr"
wait_for_completion = false

[fallback]
time = 0.25

[logging]
filter = "upscaler=debug"
forward_to_host = false
"#;

    #[test]
    fn parses_sample_config() {
        let config = BridgeConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.upscale.scale, 1.5);
        assert_eq!(config.upscale.color_processing, ColorProcessing::Hdr);
        assert!(!config.upscale.wait_for_completion);
        assert_eq!(config.fallback.time, 0.25);
        assert_eq!(config.logging.filter, "upscaler=debug");
        assert!(!config.logging.forward_to_host);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = BridgeConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.upscale.scale, 2.0);
        assert_eq!(config.upscale.color_processing, ColorProcessing::Perceptual);
        assert!(config.upscale.wait_for_completion);
        assert_eq!(config.fallback.time, 4.0);
    }

    #[test]
    fn accepts_color_processing_aliases() {
        let config = BridgeConfig::from_toml_str(
            r#"
[upscale]
color_processing = " Gamma "
"#,
        )
        .unwrap();
        assert_eq!(config.upscale.color_processing, ColorProcessing::Perceptual);
    }

    #[test]
    fn rejects_unknown_color_processing() {
        let err = BridgeConfig::from_toml_str(
            r#"
[upscale]
color_processing = "vivid"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn color_processing_parses_from_str() {
        assert_eq!("HDR".parse::<ColorProcessing>(), Ok(ColorProcessing::Hdr));
        assert_eq!(" gamma ".parse::<ColorProcessing>(), Ok(ColorProcessing::Perceptual));
        assert_eq!("linear".parse::<ColorProcessing>(), Ok(ColorProcessing::Linear));
        assert!("".parse::<ColorProcessing>().is_err());
    }

    #[test]
    fn rejects_non_positive_scale() {
        for scale in ["0.0", "-2.0"] {
            let err = BridgeConfig::from_toml_str(&format!("[upscale]\nscale = {scale}\n"))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "scale {scale}");
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let err = BridgeConfig::from_toml_str("version = 7").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();
        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.upscale.scale, 1.5);
    }
}
