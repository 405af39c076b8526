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

//! Sensor and fan access through hwmon sysfs, with NVIDIA devices folded in.
//!
//! Everything outside this module talks to hardware through [`Hardware`] and
//! the typed [`SensorRef`] / [`FanRef`] handles; raw sysfs paths stay here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::constants::{gpu as gpu_const, paths, pwm};
use crate::error::{DiscoveryWarning, FanControlError, Result};
use crate::gpu::GpuTools;

lazy_static! {
    static ref PWM_FILE: Regex = Regex::new(r"^pwm(\d+)$").expect("valid regex");
    static ref TEMP_INPUT_FILE: Regex = Regex::new(r"^temp(\d+)_input$").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorKind {
    /// Absolute path of a `tempN_input` file
    Hwmon(PathBuf),
    /// GPU index as understood by `nvidia-smi -i`
    Gpu(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FanKind {
    /// Absolute path of a `pwmN` file
    Hwmon(PathBuf),
    /// Fan index as understood by `nvidia-settings [fan:N]`
    Gpu(u32),
}

/// A temperature source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorRef {
    pub kind: SensorKind,
    pub alias: Option<String>,
    pub hidden: bool,
}

/// A fan speed actuator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FanRef {
    pub kind: FanKind,
    pub alias: Option<String>,
    pub hidden: bool,
}

impl SensorRef {
    pub fn new(kind: SensorKind) -> Self {
        Self { kind, alias: None, hidden: false }
    }

    /// Parse a configuration id: an absolute `tempN_input` path, `nvidia-smi` or
    /// `nvidia-smi:N`.
    pub fn from_id(id: &str) -> Result<Self> {
        if let Some(index) = parse_tool_id(id, gpu_const::QUERY_TOOL) {
            return Ok(Self::new(SensorKind::Gpu(index)));
        }
        let path = Path::new(id);
        let valid = path.is_absolute()
            && file_name(path).map_or(false, |n| TEMP_INPUT_FILE.is_match(n));
        if valid {
            Ok(Self::new(SensorKind::Hwmon(path.to_path_buf())))
        } else {
            Err(FanControlError::UnknownDevice(id.to_string()))
        }
    }

    /// Stable id used in the configuration and status files.
    pub fn id(&self) -> String {
        match &self.kind {
            SensorKind::Hwmon(path) => path.display().to_string(),
            SensorKind::Gpu(index) => tool_id(gpu_const::QUERY_TOOL, *index),
        }
    }

    /// Alias if set, else the id.
    pub fn display_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.id())
    }
}

impl FanRef {
    pub fn new(kind: FanKind) -> Self {
        Self { kind, alias: None, hidden: false }
    }

    /// Parse a configuration id: an absolute `pwmN` path, `nvidia-settings` or
    /// `nvidia-settings:N`. Auxiliary files such as `pwmN_enable` are rejected.
    pub fn from_id(id: &str) -> Result<Self> {
        if let Some(index) = parse_tool_id(id, gpu_const::SETTINGS_TOOL) {
            return Ok(Self::new(FanKind::Gpu(index)));
        }
        let path = Path::new(id);
        if path.is_absolute() && file_name(path).map_or(false, is_pwm_control_file) {
            Ok(Self::new(FanKind::Hwmon(path.to_path_buf())))
        } else {
            Err(FanControlError::UnknownDevice(id.to_string()))
        }
    }

    pub fn id(&self) -> String {
        match &self.kind {
            FanKind::Hwmon(path) => path.display().to_string(),
            FanKind::Gpu(index) => tool_id(gpu_const::SETTINGS_TOOL, *index),
        }
    }

    pub fn display_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.id())
    }
}

fn tool_id(tool: &str, index: u32) -> String {
    if index == 0 {
        tool.to_string()
    } else {
        format!("{}:{}", tool, index)
    }
}

fn parse_tool_id(id: &str, tool: &str) -> Option<u32> {
    let rest = id.strip_prefix(tool)?;
    if rest.is_empty() {
        return Some(0);
    }
    rest.strip_prefix(':')?.parse().ok()
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// True for `pwm1`, `pwm12`; false for `pwm1_enable`, `pwm1_max`, `pwm`.
pub fn is_pwm_control_file(name: &str) -> bool {
    PWM_FILE.is_match(name)
}

/// Raw PWM value range of one fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmRange {
    pub min: u32,
    pub max: u32,
}

impl Default for PwmRange {
    fn default() -> Self {
        Self { min: pwm::DEFAULT_MIN, max: pwm::DEFAULT_MAX }
    }
}

impl PwmRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Range used for GPU fans, which take a percent directly.
    pub fn percent() -> Self {
        Self { min: 0, max: gpu_const::PERCENT_RANGE_MAX }
    }

    /// Map 0..=100 % onto the raw range, rounding to nearest.
    pub fn percent_to_raw(&self, percent: f64) -> u32 {
        if self.max <= self.min {
            return self.min;
        }
        let pct = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        let span = f64::from(self.max - self.min);
        let raw = f64::from(self.min) + (pct / 100.0 * span).round();
        (raw as u32).clamp(self.min, self.max)
    }

    pub fn raw_to_percent(&self, raw: u32) -> f64 {
        if self.max <= self.min {
            return 0.0;
        }
        let raw = raw.clamp(self.min, self.max);
        f64::from(raw - self.min) / f64::from(self.max - self.min) * 100.0
    }
}

/// Device access used by the control loop.
#[cfg_attr(test, mockall::automock)]
pub trait Hardware {
    /// All readable temperature sources. Never fails; problems are logged.
    fn discover_sensors(&self) -> Vec<SensorRef>;

    /// All controllable fans. Never fails; problems are logged.
    fn discover_fans(&self) -> Vec<FanRef>;

    /// Current temperature in °C.
    fn read_temperature(&self, sensor: &SensorRef) -> Result<f64>;

    /// Raw range for a fan; falls back to the default range.
    fn detect_pwm_range(&self, fan: &FanRef) -> PwmRange;

    /// Current fan output in percent.
    fn read_fan_speed(&self, fan: &FanRef, range: PwmRange) -> Result<f64>;

    /// Take the fan out of automatic mode.
    fn enable_manual_control(&self, fan: &FanRef) -> Result<()>;

    /// Write `percent`, returning the raw value actually sent.
    fn write_fan_speed(&self, fan: &FanRef, range: PwmRange, percent: f64) -> Result<u32>;
}

const GPU_DISABLED: &str = "GPU support disabled";

/// Hardware backed by hwmon sysfs and, optionally, the NVIDIA tools.
#[derive(Debug, Clone)]
pub struct SysfsHardware {
    hwmon_root: PathBuf,
    gpu: Option<GpuTools>,
}

impl SysfsHardware {
    /// Real system: `/sys/class/hwmon` plus NVIDIA devices when the tools exist.
    pub fn new(nvidia_min_fan_speed: u8) -> Self {
        Self {
            hwmon_root: PathBuf::from(paths::HWMON_BASE),
            gpu: Some(GpuTools::new(nvidia_min_fan_speed)),
        }
    }

    /// hwmon only, rooted at `root`. Used against fake trees.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { hwmon_root: root.into(), gpu: None }
    }
}

impl Hardware for SysfsHardware {
    fn discover_sensors(&self) -> Vec<SensorRef> {
        let (mut sensors, warnings) = scan_sensors(&self.hwmon_root);
        log_warnings(&warnings);

        if let Some(gpu) = &self.gpu {
            match gpu.probe_gpus() {
                Ok(count) => {
                    let (gpus, warnings) =
                        scan_gpu_sensors(count, |index, id| gpu.query_temperature(index, id));
                    log_warnings(&warnings);
                    sensors.extend(gpus);
                }
                Err(w) => debug!("{}", w),
            }
        }

        info!(count = sensors.len(), "Discovered temperature sensors");
        sensors
    }

    fn discover_fans(&self) -> Vec<FanRef> {
        let (mut fans, warnings) = scan_fans(&self.hwmon_root);
        log_warnings(&warnings);

        if let Some(gpu) = &self.gpu {
            match gpu.probe_settings() {
                Ok(()) => fans.push(FanRef::new(FanKind::Gpu(0))),
                Err(w) => debug!("{}", w),
            }
        }

        info!(count = fans.len(), "Discovered fans");
        fans
    }

    fn read_temperature(&self, sensor: &SensorRef) -> Result<f64> {
        match &sensor.kind {
            SensorKind::Hwmon(path) => read_millidegrees(path)
                .map_err(|e| FanControlError::sensor_read(sensor.id(), e)),
            SensorKind::Gpu(index) => self
                .gpu
                .as_ref()
                .ok_or_else(|| FanControlError::sensor_read(sensor.id(), GPU_DISABLED))?
                .query_temperature(*index, &sensor.id()),
        }
    }

    fn detect_pwm_range(&self, fan: &FanRef) -> PwmRange {
        match &fan.kind {
            FanKind::Hwmon(path) => {
                let (range, warning) = probe_pwm_range(path);
                if let Some(w) = warning {
                    warn!("{}", w);
                }
                range
            }
            FanKind::Gpu(_) => PwmRange::percent(),
        }
    }

    fn read_fan_speed(&self, fan: &FanRef, range: PwmRange) -> Result<f64> {
        match &fan.kind {
            FanKind::Hwmon(path) => {
                let raw = read_trimmed(path)
                    .map_err(|e| FanControlError::sensor_read(fan.id(), e))?
                    .parse::<u32>()
                    .map_err(|e| FanControlError::sensor_read(fan.id(), e))?;
                Ok(range.raw_to_percent(raw))
            }
            // nvidia-smi only reports the first fan of each GPU
            FanKind::Gpu(_) => self
                .gpu
                .as_ref()
                .ok_or_else(|| FanControlError::sensor_read(fan.id(), GPU_DISABLED))?
                .query_fan_speed(0, &fan.id()),
        }
    }

    fn enable_manual_control(&self, fan: &FanRef) -> Result<()> {
        match &fan.kind {
            FanKind::Hwmon(path) => {
                let enable = sibling(path, "enable");
                if enable.exists() {
                    fs::write(&enable, pwm::ENABLE_MANUAL)
                        .map_err(|e| FanControlError::actuator_write(fan.id(), e))?;
                    debug!(fan = %fan.id(), "Manual PWM control enabled");
                }
                Ok(())
            }
            // every settings invocation carries GPUFanControlState=1
            FanKind::Gpu(_) => Ok(()),
        }
    }

    fn write_fan_speed(&self, fan: &FanRef, range: PwmRange, percent: f64) -> Result<u32> {
        match &fan.kind {
            FanKind::Hwmon(path) => {
                let raw = range.percent_to_raw(percent);
                fs::write(path, raw.to_string())
                    .map_err(|e| FanControlError::actuator_write(fan.id(), e))?;
                Ok(raw)
            }
            FanKind::Gpu(index) => self
                .gpu
                .as_ref()
                .ok_or_else(|| FanControlError::actuator_write(fan.id(), GPU_DISABLED))?
                .set_fan_speed(*index, percent, &fan.id()),
        }
    }
}

fn log_warnings(warnings: &[DiscoveryWarning]) {
    for w in warnings {
        warn!("{}", w);
    }
}

/// Sorted `hwmon*` directories under `root`.
fn hwmon_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && file_name(p).map_or(false, |n| n.starts_with("hwmon")))
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut files: Vec<(String, PathBuf)> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                Some((name, e.path()))
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

/// Readable `tempN_input` files under `root`, plus a warning for each candidate
/// that failed to read.
pub fn scan_sensors(root: &Path) -> (Vec<SensorRef>, Vec<DiscoveryWarning>) {
    let mut sensors = Vec::new();
    let mut warnings = Vec::new();

    let dirs = match hwmon_dirs(root) {
        Ok(dirs) => dirs,
        Err(e) => {
            warnings.push(DiscoveryWarning::HwmonUnavailable {
                root: root.to_path_buf(),
                reason: e.to_string(),
            });
            return (sensors, warnings);
        }
    };

    for dir in dirs {
        for (name, path) in dir_files(&dir) {
            if !TEMP_INPUT_FILE.is_match(&name) {
                continue;
            }
            match read_millidegrees(&path) {
                Ok(_) => sensors.push(SensorRef::new(SensorKind::Hwmon(path))),
                Err(reason) => warnings.push(DiscoveryWarning::UnreadableSensor { path, reason }),
            }
        }
    }

    (sensors, warnings)
}

/// GPU sensors `0..count` that return a temperature on a trial read.
pub fn scan_gpu_sensors<F>(count: u32, read: F) -> (Vec<SensorRef>, Vec<DiscoveryWarning>)
where
    F: Fn(u32, &str) -> Result<f64>,
{
    let mut sensors = Vec::new();
    let mut warnings = Vec::new();

    for index in 0..count {
        let sensor = SensorRef::new(SensorKind::Gpu(index));
        let id = sensor.id();
        match read(index, &id) {
            Ok(_) => sensors.push(sensor),
            Err(e) => {
                let reason = match e {
                    FanControlError::SensorRead { reason, .. } => reason,
                    other => other.to_string(),
                };
                warnings.push(DiscoveryWarning::UnreadableGpu { sensor: id, reason });
            }
        }
    }

    (sensors, warnings)
}

/// `pwmN` files under `root`. Auxiliary `pwmN_*` files are never returned.
pub fn scan_fans(root: &Path) -> (Vec<FanRef>, Vec<DiscoveryWarning>) {
    let mut fans = Vec::new();
    let mut warnings = Vec::new();

    let dirs = match hwmon_dirs(root) {
        Ok(dirs) => dirs,
        Err(e) => {
            warnings.push(DiscoveryWarning::HwmonUnavailable {
                root: root.to_path_buf(),
                reason: e.to_string(),
            });
            return (fans, warnings);
        }
    };

    for dir in dirs {
        for (name, path) in dir_files(&dir) {
            if is_pwm_control_file(&name) {
                fans.push(FanRef::new(FanKind::Hwmon(path)));
            }
        }
    }

    (fans, warnings)
}

/// Range from `pwmN_min` / `pwmN_max` siblings. An unreadable, zero or
/// not-above-minimum maximum falls back to the default range with a warning.
pub fn probe_pwm_range(pwm_path: &Path) -> (PwmRange, Option<DiscoveryWarning>) {
    let min = read_trimmed(sibling(pwm_path, "min"))
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(pwm::DEFAULT_MIN);

    let max_path = sibling(pwm_path, "max");
    let max = if max_path.exists() {
        read_trimmed(&max_path)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0)
    } else {
        pwm::DEFAULT_MAX
    };

    if max == 0 || max <= min {
        let warning = DiscoveryWarning::ImplausiblePwmRange {
            fan: pwm_path.display().to_string(),
            min,
            max,
        };
        return (PwmRange::default(), Some(warning));
    }

    (PwmRange::new(min, max), None)
}

/// `pwm1` + `enable` -> `pwm1_enable` in the same directory.
fn sibling(pwm_path: &Path, suffix: &str) -> PathBuf {
    let name = file_name(pwm_path).unwrap_or_default();
    pwm_path.with_file_name(format!("{}_{}", name, suffix))
}

fn read_millidegrees(path: &Path) -> std::result::Result<f64, String> {
    let raw = read_trimmed(path).map_err(|e| e.to_string())?;
    let milli = raw
        .parse::<i64>()
        .map_err(|_| format!("malformed temperature {:?}", raw))?;
    Ok(milli as f64 / 1000.0)
}

fn read_trimmed<P: AsRef<Path>>(p: P) -> io::Result<String> {
    Ok(fs::read_to_string(p)?.trim().to_string())
}
