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

//! NVIDIA GPU temperature and fan control
//!
//! Telemetry via `nvidia-smi`, fan control via `nvidia-settings`.
//! Fan control requires X11 and Coolbits; when the daemon is not root the
//! settings tool is run through `sudo`.

use std::process::{Command, Output};

use tracing::{debug, trace};

use crate::constants::gpu as gpu_const;
use crate::error::{DiscoveryWarning, FanControlError, Result};

/// Invocation settings for the NVIDIA command line tools.
#[derive(Debug, Clone)]
pub struct GpuTools {
    /// Lowest percent ever sent to the settings tool
    pub min_fan_speed: u8,
    /// Prefix settings invocations with `sudo`
    pub elevate: bool,
}

impl GpuTools {
    pub fn new(min_fan_speed: u8) -> Self {
        // SAFETY: geteuid has no preconditions and cannot fail
        let elevate = unsafe { libc::geteuid() } != 0;
        Self { min_fan_speed, elevate }
    }

    /// Number of GPUs reported by the query tool.
    pub fn probe_gpus(&self) -> std::result::Result<u32, DiscoveryWarning> {
        let output = Command::new(gpu_const::QUERY_TOOL)
            .args(["--query-gpu=index", "--format=csv,noheader,nounits"])
            .output()
            .map_err(|e| DiscoveryWarning::GpuToolUnavailable {
                tool: gpu_const::QUERY_TOOL,
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(DiscoveryWarning::GpuToolUnavailable {
                tool: gpu_const::QUERY_TOOL,
                reason: failure_reason(&output),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let count = stdout
            .lines()
            .filter(|l| l.trim().parse::<u32>().is_ok())
            .count() as u32;
        debug!(gpus = count, "{} reported GPUs", gpu_const::QUERY_TOOL);
        Ok(count)
    }

    /// Whether the settings tool runs at all.
    pub fn probe_settings(&self) -> std::result::Result<(), DiscoveryWarning> {
        let output = Command::new(gpu_const::SETTINGS_TOOL)
            .arg("-v")
            .output()
            .map_err(|e| DiscoveryWarning::GpuToolUnavailable {
                tool: gpu_const::SETTINGS_TOOL,
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DiscoveryWarning::GpuToolUnavailable {
                tool: gpu_const::SETTINGS_TOOL,
                reason: failure_reason(&output),
            })
        }
    }

    /// GPU core temperature in °C.
    pub fn query_temperature(&self, gpu_index: u32, sensor_id: &str) -> Result<f64> {
        self.query_field(gpu_index, "temperature.gpu", sensor_id)
    }

    /// Current fan speed in percent as reported by the driver.
    pub fn query_fan_speed(&self, gpu_index: u32, fan_id: &str) -> Result<f64> {
        self.query_field(gpu_index, "fan.speed", fan_id)
            .map(|v| v.clamp(0.0, gpu_const::PERCENT_RANGE_MAX as f64))
    }

    fn query_field(&self, gpu_index: u32, field: &str, device_id: &str) -> Result<f64> {
        let output = Command::new(gpu_const::QUERY_TOOL)
            .args(query_args(gpu_index, field))
            .output()
            .map_err(|e| FanControlError::sensor_read(device_id, e))?;

        if !output.status.success() {
            return Err(FanControlError::sensor_read(device_id, failure_reason(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(gpu = gpu_index, field, raw = %stdout.trim(), "GPU query");
        parse_query_value(&stdout).ok_or_else(|| {
            FanControlError::sensor_read(device_id, format!("unusable {} value {:?}", field, stdout.trim()))
        })
    }

    /// Set a GPU fan to `percent`, enabling manual control on GPU 0 in the same call.
    pub fn set_fan_speed(&self, fan_index: u32, percent: f64, fan_id: &str) -> Result<u32> {
        let percent = clamp_percent(percent, self.min_fan_speed);
        let (program, args) = settings_command(self.elevate, fan_index, percent);

        let output = Command::new(program)
            .args(&args)
            .output()
            .map_err(|e| FanControlError::actuator_write(fan_id, format!("failed to run {}: {}", gpu_const::SETTINGS_TOOL, e)))?;

        if !output.status.success() {
            return Err(FanControlError::actuator_write(fan_id, failure_reason(&output)));
        }

        debug!(fan = fan_id, percent, "GPU fan speed set");
        Ok(percent)
    }
}

fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}

/// Arguments for a single-field `nvidia-smi` query.
pub fn query_args(gpu_index: u32, field: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        gpu_index.to_string(),
        format!("--query-gpu={}", field),
        "--format=csv,noheader,nounits".to_string(),
    ]
}

/// Arguments for `nvidia-settings` to take manual control and set one fan.
pub fn settings_args(fan_index: u32, percent: u32) -> Vec<String> {
    vec![
        "-a".to_string(),
        "[gpu:0]/GPUFanControlState=1".to_string(),
        "-a".to_string(),
        format!("[fan:{}]/GPUTargetFanSpeed={}", fan_index, percent),
    ]
}

/// Program and arguments for one settings call, going through `sudo` when
/// `elevate` is set.
pub fn settings_command(elevate: bool, fan_index: u32, percent: u32) -> (&'static str, Vec<String>) {
    let args = settings_args(fan_index, percent);
    if elevate {
        let mut elevated = Vec::with_capacity(args.len() + 1);
        elevated.push(gpu_const::SETTINGS_TOOL.to_string());
        elevated.extend(args);
        (gpu_const::ELEVATE_TOOL, elevated)
    } else {
        (gpu_const::SETTINGS_TOOL, args)
    }
}

/// Round to an integer percent inside `[min_speed, 100]`.
pub fn clamp_percent(percent: f64, min_speed: u8) -> u32 {
    let max = gpu_const::PERCENT_RANGE_MAX;
    let min = u32::from(min_speed).min(max);
    if percent.is_nan() {
        return min;
    }
    let rounded = percent.round().clamp(0.0, max as f64) as u32;
    rounded.clamp(min, max)
}

/// First line of `nvidia-smi` CSV output as a number.
///
/// `N/A`, `[N/A]` and `[Not Supported]` yield `None`.
pub fn parse_query_value(output: &str) -> Option<f64> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let field = line.split(',').next()?.trim();
    if field == "N/A" || field == "[N/A]" || field == "[Not Supported]" {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}
