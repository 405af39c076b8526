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

//! Error types shared by the hardware layer, the configuration loader and the
//! control loop.

use std::io;
use std::path::PathBuf;

/// Result type alias using FanControlError
pub type Result<T> = std::result::Result<T, FanControlError>;

#[derive(thiserror::Error, Debug)]
pub enum FanControlError {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("Configuration error in {path}: {reason}")]
    Configuration {
        path: PathBuf,
        reason: String,
    },

    /// A temperature source could not be read this tick.
    #[error("Failed to read temperature from {sensor}: {reason}")]
    SensorRead {
        sensor: String,
        reason: String,
    },

    /// A PWM file or the GPU settings tool rejected a write.
    #[error("Failed to set fan speed on {fan}: {reason}")]
    ActuatorWrite {
        fan: String,
        reason: String,
    },

    #[error("Unknown device id: {0}")]
    UnknownDevice(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl FanControlError {
    pub fn configuration(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn sensor_read(sensor: impl Into<String>, reason: impl ToString) -> Self {
        Self::SensorRead {
            sensor: sensor.into(),
            reason: reason.to_string(),
        }
    }

    pub fn actuator_write(fan: impl Into<String>, reason: impl ToString) -> Self {
        Self::ActuatorWrite {
            fan: fan.into(),
            reason: reason.to_string(),
        }
    }
}

/// Something unexpected seen while enumerating devices.
///
/// Informational only; emitted once per daemon start, never per tick.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryWarning {
    /// The hwmon class directory is missing entirely.
    #[error("hwmon root {root} not usable: {reason}")]
    HwmonUnavailable { root: PathBuf, reason: String },

    /// A `tempN_input` exists but could not be read or parsed.
    #[error("skipping sensor {path}: {reason}")]
    UnreadableSensor { path: PathBuf, reason: String },

    /// A GPU is listed by the query tool but its temperature cannot be read.
    #[error("skipping GPU sensor {sensor}: {reason}")]
    UnreadableGpu { sensor: String, reason: String },

    /// The GPU query tool is not installed or failed.
    #[error("{tool} unavailable: {reason}")]
    GpuToolUnavailable { tool: &'static str, reason: String },

    /// `pwmN_max` was present but implausible; the default range is used instead.
    #[error("implausible PWM range {min}..={max} on {fan}, using default")]
    ImplausiblePwmRange { fan: String, min: u32, max: u32 },
}
