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

//! fan-controller - curve-driven fan control daemon for Linux
//!
//! This library reads hwmon temperature sensors (and NVIDIA GPUs), maps them
//! through user-defined temperature curves and drives PWM fans, rate limited
//! so speeds never jump.

pub mod constants;
pub mod error;
pub mod hwmon;
pub mod gpu;
pub mod curves;
pub mod smoothing;
pub mod config;
pub mod status;
pub mod service;
pub mod logger;

#[cfg(test)]
pub mod test_utils;

pub use error::{FanControlError, Result};
