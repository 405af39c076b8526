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

//! Paths, defaults and limits used across the crate.

/// Filesystem locations
pub mod paths {
    /// Base path for hwmon devices
    pub const HWMON_BASE: &str = "/sys/class/hwmon";

    /// Directory name under the per-user config base
    pub const CONFIG_DIR_NAME: &str = "fan_controller";

    pub const CONFIG_FILE: &str = "config.json";

    /// Written next to the config file, read by the editor
    pub const STATUS_FILE: &str = ".fan_controller_status.json";

    /// Used when neither XDG_CONFIG_HOME nor HOME is set
    pub const SYSTEM_CONFIG_DIR: &str = "/etc/fan_controller";

    /// Presence of this socket means journald is running
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Raw PWM handling
pub mod pwm {
    /// Range assumed when the device exposes no `pwmN_max`
    pub const DEFAULT_MIN: u32 = 0;
    pub const DEFAULT_MAX: u32 = 255;

    /// Value written to `pwmN_enable` for manual control
    pub const ENABLE_MANUAL: &str = "1";
}

/// GPU tooling
pub mod gpu {
    pub const QUERY_TOOL: &str = "nvidia-smi";
    pub const SETTINGS_TOOL: &str = "nvidia-settings";
    /// Prefix for settings calls when not running as root
    pub const ELEVATE_TOOL: &str = "sudo";

    /// Many NVIDIA boards refuse lower targets
    pub const DEFAULT_MIN_FAN_SPEED: u8 = 26;

    /// GPU fans take a percent directly
    pub const PERCENT_RANGE_MAX: u32 = 100;
}

/// Curve engine
pub mod curve {
    pub const MIN_SPEED: f64 = 0.0;
    pub const MAX_SPEED: f64 = 100.0;

    /// `remove_point` matches within this many degrees
    pub const REMOVE_TOLERANCE_CELSIUS: f64 = 0.5;

    /// Temperatures closer than this are the same point
    pub const FLOAT_EPSILON: f64 = 1e-6;
}

/// Control loop timing and smoothing
pub mod control {
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;
    pub const MIN_INTERVAL_MS: u64 = 100;

    /// Largest change in percent applied per tick
    pub const DEFAULT_MAX_STEP: f64 = 10.0;

    /// Granularity of the inter-tick sleep, bounds shutdown latency
    pub const SLEEP_SLICE_MS: u64 = 50;

    /// Log a persistent per-fan failure on the first and every Nth occurrence
    pub const FAILURE_LOG_EVERY: u32 = 10;
}

/// Environment variables
pub mod env {
    /// Log filter, tracing-subscriber syntax
    pub const LOG_FILTER: &str = "FAN_CONTROLLER_LOG";
    pub const DEFAULT_LOG_FILTER: &str = "info";
}
