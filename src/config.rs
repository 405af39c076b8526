/*
 * This file is part of fan-controller.
 *
 * Copyright (C) 2025 fan-controller contributors
 *
 * fan-controller is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * fan-controller is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with fan-controller. If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{control, gpu, paths};
use crate::curves::Curve;
use crate::error::{FanControlError, Result};

/// One named curve: the sensor it follows and its control points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveConfig {
    #[serde(default)]
    pub sensor: String,
    /// `[temperature, speed]` pairs, any order
    #[serde(default)]
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Lowest percent sent to NVIDIA fans
    pub nvidia_min_fan_speed: u8,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self { nvidia_min_fan_speed: gpu::DEFAULT_MIN_FAN_SPEED }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub interval_ms: u64,
    /// Largest change in percent per tick
    pub max_step: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval_ms: control::DEFAULT_INTERVAL_MS,
            max_step: control::DEFAULT_MAX_STEP,
        }
    }
}

/// The configuration document shared by the editor and the daemon.
///
/// Unknown keys are ignored so the editor can keep its own state in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub curves: BTreeMap<String, CurveConfig>,
    /// fan id -> curve name
    pub fans: BTreeMap<String, String>,
    /// device id -> display name
    pub aliases: BTreeMap<String, String>,
    pub hidden_sensors: BTreeSet<String>,
    pub hidden_fans: BTreeSet<String>,
    pub hardware: HardwareConfig,
    pub control: ControlConfig,
}

impl Configuration {
    /// Load and validate. Missing or malformed files are configuration errors.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FanControlError::configuration(path, "file not found"),
            _ => FanControlError::configuration(path, e.to_string()),
        })?;
        let cfg: Configuration = serde_json::from_str(&data)
            .map_err(|e| FanControlError::configuration(path, format!("parse error: {}", e)))?;
        cfg.validate()
            .map_err(|reason| FanControlError::configuration(path, reason))?;
        Ok(cfg)
    }

    /// Pretty JSON written to a temporary sibling, then renamed into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.control.interval_ms < control::MIN_INTERVAL_MS {
            return Err(format!(
                "control.interval_ms must be at least {} (got {})",
                control::MIN_INTERVAL_MS,
                self.control.interval_ms
            ));
        }
        if !self.control.max_step.is_finite() || self.control.max_step < 0.0 {
            return Err(format!("control.max_step must be a non-negative number (got {})", self.control.max_step));
        }
        if u32::from(self.hardware.nvidia_min_fan_speed) > gpu::PERCENT_RANGE_MAX {
            return Err(format!(
                "hardware.nvidia_min_fan_speed must be 0..=100 (got {})",
                self.hardware.nvidia_min_fan_speed
            ));
        }
        for (name, curve) in &self.curves {
            if curve.points.iter().any(|(t, s)| !t.is_finite() || !s.is_finite()) {
                return Err(format!("curve '{}' has a non-numeric point", name));
            }
        }
        Ok(())
    }

    /// Normalized curve by name.
    pub fn curve(&self, name: &str) -> Option<Curve> {
        self.curves
            .get(name)
            .map(|c| Curve::from_points(c.points.iter().copied()))
    }

    pub fn alias_for(&self, id: &str) -> Option<&str> {
        self.aliases.get(id).map(String::as_str)
    }

    pub fn is_sensor_hidden(&self, id: &str) -> bool {
        self.hidden_sensors.contains(id)
    }

    pub fn is_fan_hidden(&self, id: &str) -> bool {
        self.hidden_fans.contains(id)
    }
}

/// Write `bytes` to a temporary sibling of `path` and rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Per-user configuration directory.
pub fn user_config_dir() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Path::new(&xdg).join(paths::CONFIG_DIR_NAME);
        }
    }
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Path::new(&home).join(".config").join(paths::CONFIG_DIR_NAME);
        }
    }
    PathBuf::from(paths::SYSTEM_CONFIG_DIR)
}

/// Directory holding the configuration and status files.
///
/// In order: `arg` when it is an existing directory; the working directory
/// when it already holds a `config.json`; the per-user directory.
pub fn resolve_config_dir(arg: Option<&str>) -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_config_dir_from(arg, &cwd)
}

pub fn resolve_config_dir_from(arg: Option<&str>, cwd: &Path) -> PathBuf {
    if let Some(dir) = arg.map(Path::new).filter(|p| p.is_dir()) {
        return dir.to_path_buf();
    }
    if cwd.join(paths::CONFIG_FILE).is_file() {
        return cwd.to_path_buf();
    }
    user_config_dir()
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(paths::CONFIG_FILE)
}

pub fn status_path(dir: &Path) -> PathBuf {
    dir.join(paths::STATUS_FILE)
}
