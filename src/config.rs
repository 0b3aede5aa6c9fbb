/*
 * This file is part of Panelio.
 *
 * Copyright (C) 2025 Panelio contributors
 *
 * Panelio is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Panelio is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Panelio. If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::HashSet;
use std::env;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};
use crate::registry::GroupRole;
use crate::smoothing::Easing;

pub const DEFAULT_CONSUMER: &str = "panelio";

/// Full-scale ADC code and the millivolts it maps to on the stock front end
pub const DEFAULT_SCALE_NUM: i64 = 13325;
pub const DEFAULT_SCALE_DEN: i64 = 4095;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelConfig {
    /// Consumer label attached to every requested line
    #[serde(default = "default_consumer")]
    pub consumer: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Line groups in claim order
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub analog: Option<AnalogConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,
    pub role: GroupRole,
    pub lines: Vec<LineConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineConfig {
    pub chip: String,
    pub line: u32,
    pub label: String,
    #[serde(default)]
    pub default_value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalogConfig {
    /// IIO device name, as found in the device's `name` attribute
    pub device: String,
    pub channels: Vec<ChannelConfig>,
    #[serde(default = "default_scale_num")]
    pub scale_num: i64,
    #[serde(default = "default_scale_den")]
    pub scale_den: i64,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
    #[serde(default)]
    pub easing: Easing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub legend: String,
}

fn default_consumer() -> String { DEFAULT_CONSUMER.to_string() }
fn default_poll_interval_ms() -> u64 { 100 }
fn default_scale_num() -> i64 { DEFAULT_SCALE_NUM }
fn default_scale_den() -> i64 { DEFAULT_SCALE_DEN }
fn default_sample_interval_ms() -> u64 { 100 }
fn default_transition_ms() -> u64 { 300 }

impl PanelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AnalogConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }
}

fn line(chip: &str, line: u32, label: &str) -> LineConfig {
    LineConfig { chip: chip.to_string(), line, label: label.to_string(), default_value: false }
}

fn channel(name: &str, legend: &str) -> ChannelConfig {
    ChannelConfig { name: name.to_string(), legend: legend.to_string() }
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            device: "2198000.adc".to_string(),
            channels: vec![
                channel("voltage5", "ADC 5"),
                channel("voltage8", "ADC 8"),
                channel("voltage9", "ADC 9"),
                channel("voltage0", "ADC 0"),
            ],
            scale_num: DEFAULT_SCALE_NUM,
            scale_den: DEFAULT_SCALE_DEN,
            sample_interval_ms: default_sample_interval_ms(),
            transition_ms: default_transition_ms(),
            easing: Easing::default(),
        }
    }
}

impl Default for PanelConfig {
    /// Stock catalog of the reference touch-panel board
    fn default() -> Self {
        Self {
            consumer: default_consumer(),
            poll_interval_ms: default_poll_interval_ms(),
            groups: vec![
                GroupConfig {
                    name: "relays".to_string(),
                    role: GroupRole::Output,
                    lines: vec![
                        line("/dev/gpiochip4", 4, "Relay 1"),
                        line("/dev/gpiochip4", 5, "Relay 2"),
                    ],
                },
                GroupConfig {
                    name: "low_side".to_string(),
                    role: GroupRole::Output,
                    lines: vec![
                        line("/dev/gpiochip5", 0, "GPIO 5 0"),
                        line("/dev/gpiochip5", 1, "GPIO 5 1"),
                        line("/dev/gpiochip6", 13, "GPIO 6 13"),
                    ],
                },
                GroupConfig {
                    name: "high_side".to_string(),
                    role: GroupRole::Output,
                    lines: vec![line("/dev/gpiochip5", 15, "GPIO 5 15")],
                },
                GroupConfig {
                    name: "status".to_string(),
                    role: GroupRole::Input,
                    lines: vec![
                        line("/dev/gpiochip5", 2, "GPIO 5 2"),
                        line("/dev/gpiochip5", 3, "GPIO 5 3"),
                        line("/dev/gpiochip5", 4, "GPIO 5 4"),
                    ],
                },
                // Low selects the 0-12 V range, high the 0-20 mA range
                GroupConfig {
                    name: "adc_mode".to_string(),
                    role: GroupRole::ModeSelect,
                    lines: vec![
                        line("/dev/gpiochip5", 9, "ADC 5 mode"),
                        line("/dev/gpiochip5", 10, "ADC 8 mode"),
                        line("/dev/gpiochip5", 11, "ADC 9 mode"),
                        line("/dev/gpiochip5", 14, "ADC 0 mode"),
                    ],
                },
            ],
            analog: Some(AnalogConfig::default()),
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(explicit) = env::var("PANELIO_CONFIG") {
        return PathBuf::from(explicit);
    }
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("panelio").join("panel.json");
    }
    system_config_path()
}

pub fn system_config_path() -> PathBuf { PathBuf::from("/etc/panelio/panel.json") }

/// Load and validate a config file
pub fn load_config(path: &Path) -> Result<PanelConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: PanelConfig = serde_json::from_str(&data)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Like [`load_config`], but a missing file yields the stock catalog
pub fn load_or_default(path: &Path) -> Result<PanelConfig> {
    match load_config(path) {
        Err(PanelError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(PanelConfig::default()),
        other => other,
    }
}

pub fn write_config(path: &Path, cfg: &PanelConfig) -> Result<()> {
    validate_config(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json)?;
    // Best-effort set permissions to 0644
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o644));
    Ok(())
}

fn is_safe_label(s: &str) -> bool {
    if s.trim().is_empty() || s.len() > 64 { return false; }
    s.chars().all(|c| !c.is_control())
}

pub fn validate_config(cfg: &PanelConfig) -> Result<()> {
    if cfg.consumer.trim().is_empty() || cfg.consumer.len() > 31 {
        return Err(PanelError::invalid_config("consumer", "must be 1-31 characters"));
    }
    if cfg.poll_interval_ms == 0 {
        return Err(PanelError::invalid_config("poll_interval_ms", "must be greater than zero"));
    }
    if cfg.groups.is_empty() {
        return Err(PanelError::invalid_config("groups", "at least one group is required"));
    }

    let mut names = HashSet::new();
    let mut lines = HashSet::new();
    for group in &cfg.groups {
        if group.name.trim().is_empty() {
            return Err(PanelError::invalid_config("groups.name", "must not be empty"));
        }
        if !names.insert(group.name.as_str()) {
            return Err(PanelError::invalid_config(
                "groups.name",
                format!("duplicate group '{}'", group.name),
            ));
        }
        for l in &group.lines {
            let field = format!("groups.{}.lines", group.name);
            if l.chip.trim().is_empty() {
                return Err(PanelError::invalid_config(field, "chip path must not be empty"));
            }
            if !is_safe_label(&l.label) {
                return Err(PanelError::invalid_config(field, format!("invalid label {:?}", l.label)));
            }
            if !lines.insert((l.chip.as_str(), l.line)) {
                return Err(PanelError::invalid_config(
                    field,
                    format!("line {}:{} appears more than once", l.chip, l.line),
                ));
            }
        }
    }

    if let Some(analog) = &cfg.analog {
        if analog.device.trim().is_empty() {
            return Err(PanelError::invalid_config("analog.device", "must not be empty"));
        }
        if analog.scale_den == 0 {
            return Err(PanelError::invalid_config("analog.scale_den", "must not be zero"));
        }
        if analog.sample_interval_ms == 0 {
            return Err(PanelError::invalid_config("analog.sample_interval_ms", "must be greater than zero"));
        }
        if analog.transition_ms == 0 {
            return Err(PanelError::invalid_config("analog.transition_ms", "must be greater than zero"));
        }
        let mut seen = HashSet::new();
        for ch in &analog.channels {
            if ch.name.trim().is_empty() {
                return Err(PanelError::invalid_config("analog.channels", "channel name must not be empty"));
            }
            if !seen.insert(ch.name.as_str()) {
                return Err(PanelError::invalid_config(
                    "analog.channels",
                    format!("duplicate channel '{}'", ch.name),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_catalog_is_valid() {
        let cfg = PanelConfig::default();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.groups.len(), 5);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
        let analog = cfg.analog.as_ref().unwrap();
        assert_eq!(analog.channels.len(), 4);
        assert_eq!(analog.transition(), Duration::from_millis(300));
        assert_eq!((analog.scale_num, analog.scale_den), (13325, 4095));
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "groups": [
                { "name": "relays", "role": "output",
                  "lines": [ { "chip": "/dev/gpiochip4", "line": 4, "label": "Relay 1" } ] }
            ],
            "analog": { "device": "2198000.adc", "channels": [ { "name": "voltage5" } ] }
        }"#;
        let cfg: PanelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.consumer, "panelio");
        assert_eq!(cfg.poll_interval_ms, 100);
        assert!(!cfg.groups[0].lines[0].default_value);
        let analog = cfg.analog.unwrap();
        assert_eq!(analog.sample_interval_ms, 100);
        assert_eq!(analog.easing, Easing::Linear);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{ "groups": [], "colour": "red" }"#;
        assert!(serde_json::from_str::<PanelConfig>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_lines() {
        let mut cfg = PanelConfig::default();
        cfg.groups[1].lines.push(line("/dev/gpiochip4", 4, "Relay 1 again"));
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("/dev/gpiochip4:4"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = PanelConfig::default();
        cfg.poll_interval_ms = 0;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = PanelConfig::default();
        cfg.analog.as_mut().unwrap().scale_den = 0;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = PanelConfig::default();
        cfg.groups[0].name = cfg.groups[1].name.clone();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = PanelConfig::default();
        cfg.groups[0].lines[0].label = "bad\nlabel".to_string();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = PanelConfig::default();
        cfg.groups.clear();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_write_then_load_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("panel.json");
        let cfg = PanelConfig::default();
        write_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let cfg = load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg, PanelConfig::default());
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panel.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_or_default(&path).unwrap_err();
        assert!(matches!(err, PanelError::JsonParse(_)));
    }
}
