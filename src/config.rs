use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::link::{SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_DEVICE};
use crate::session::{
    CaptureMode, SessionConfig, DEFAULT_ACK_WAIT, DEFAULT_OUTPUT_PATH, DEFAULT_TRANSFER_WAIT,
};

pub const CONFIG_ENV: &str = "FPCAPTURE_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    device: Option<String>,
    baud_rate: Option<u32>,
    output_path: Option<PathBuf>,
    mode: Option<String>,
    ack_wait_ms: Option<u64>,
    transfer_wait_ms: Option<u64>,
}

/// Command-line values. Each `Some` replaces whatever file and env produced.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub device: Option<String>,
    pub baud_rate: Option<u32>,
    pub output_path: Option<PathBuf>,
    pub mode: Option<CaptureMode>,
    pub ack_wait_ms: Option<u64>,
    pub transfer_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: String,
    pub baud_rate: u32,
    pub output_path: PathBuf,
    pub mode: CaptureMode,
    pub ack_wait: Duration,
    pub transfer_wait: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            mode: CaptureMode::Image,
            ack_wait: DEFAULT_ACK_WAIT,
            transfer_wait: DEFAULT_TRANSFER_WAIT,
        }
    }
}

impl CaptureConfig {
    /// Defaults, then the file named by `FPCAPTURE_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        Self::resolve(None, &ConfigOverrides::default())
    }

    /// Like `load`, but with an explicit config file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::resolve(Some(path), &ConfigOverrides::default())
    }

    /// Defaults, then the config file (`path`, else `FPCAPTURE_CONFIG`), then
    /// env, then `overrides`. Validated once, after every layer is applied.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let file_cfg = match path.or(env_path.as_deref()) {
            Some(path) => read_config_file(path)?,
            None => CaptureConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let mode = match file.mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => defaults.mode,
        };
        Ok(Self {
            device: file.device.unwrap_or(defaults.device),
            baud_rate: file.baud_rate.unwrap_or(defaults.baud_rate),
            output_path: file.output_path.unwrap_or(defaults.output_path),
            mode,
            ack_wait: file
                .ack_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.ack_wait),
            transfer_wait: file
                .transfer_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.transfer_wait),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("FPCAPTURE_DEVICE") {
            if !device.trim().is_empty() {
                self.device = device;
            }
        }
        if let Ok(baud) = std::env::var("FPCAPTURE_BAUD_RATE") {
            self.baud_rate = baud
                .parse()
                .map_err(|_| anyhow!("FPCAPTURE_BAUD_RATE must be an integer baud rate"))?;
        }
        if let Ok(path) = std::env::var("FPCAPTURE_OUTPUT") {
            if !path.trim().is_empty() {
                self.output_path = PathBuf::from(path);
            }
        }
        if let Ok(mode) = std::env::var("FPCAPTURE_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode.parse()?;
            }
        }
        if let Ok(ms) = std::env::var("FPCAPTURE_ACK_WAIT_MS") {
            self.ack_wait = parse_millis("FPCAPTURE_ACK_WAIT_MS", &ms)?;
        }
        if let Ok(ms) = std::env::var("FPCAPTURE_TRANSFER_WAIT_MS") {
            self.transfer_wait = parse_millis("FPCAPTURE_TRANSFER_WAIT_MS", &ms)?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(device) = &overrides.device {
            self.device = device.clone();
        }
        if let Some(baud_rate) = overrides.baud_rate {
            self.baud_rate = baud_rate;
        }
        if let Some(output_path) = &overrides.output_path {
            self.output_path = output_path.clone();
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(ms) = overrides.ack_wait_ms {
            self.ack_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.transfer_wait_ms {
            self.transfer_wait = Duration::from_millis(ms);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(anyhow!("device path must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(anyhow!("baud rate must be greater than zero"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(anyhow!("output path must not be empty"));
        }
        if self.ack_wait.is_zero() || self.transfer_wait.is_zero() {
            return Err(anyhow!("wait windows must be greater than zero"));
        }
        Ok(())
    }

    pub fn serial(&self) -> SerialConfig {
        SerialConfig {
            path: self.device.clone(),
            baud_rate: self.baud_rate,
            ..SerialConfig::default()
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            mode: self.mode,
            output_path: self.output_path.clone(),
            ack_wait: self.ack_wait,
            transfer_wait: self.transfer_wait,
        }
    }
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    let ms: u64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of milliseconds", name))?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_scanner_setup() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.device, "/dev/ttyACM0");
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.output_path, PathBuf::from("fingerprint.png"));
        assert_eq!(cfg.mode, CaptureMode::Image);
        assert_eq!(cfg.ack_wait, Duration::from_secs(1));
        assert_eq!(cfg.transfer_wait, Duration::from_secs(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let cfg = CaptureConfig {
            baud_rate: 0,
            ..CaptureConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = CaptureConfig {
            transfer_wait: Duration::ZERO,
            ..CaptureConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut cfg = CaptureConfig {
            device: "/dev/ttyUSB0".to_string(),
            mode: CaptureMode::Dump,
            ..CaptureConfig::default()
        };
        cfg.apply_overrides(&ConfigOverrides {
            baud_rate: Some(115_200),
            transfer_wait_ms: Some(2500),
            ..ConfigOverrides::default()
        });
        assert_eq!(cfg.device, "/dev/ttyUSB0");
        assert_eq!(cfg.mode, CaptureMode::Dump);
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.transfer_wait, Duration::from_millis(2500));
        assert_eq!(cfg.ack_wait, Duration::from_secs(1));
    }

    #[test]
    fn parse_millis_rejects_garbage() {
        assert_eq!(
            parse_millis("X", " 250 ").unwrap(),
            Duration::from_millis(250)
        );
        assert!(parse_millis("X", "soon").is_err());
    }
}
