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

//! Tracing subscriber setup: systemd journal when available, else the terminal.

use std::env;
use std::path::Path;

use tracing_subscriber::prelude::*;

use crate::constants::{env as env_const, paths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stdout,
}

impl LogTarget {
    pub fn describe(&self) -> &'static str {
        match self {
            LogTarget::Journald => "systemd journal",
            LogTarget::Stdout => "stdout",
        }
    }
}

/// Filter directive from `FAN_CONTROLLER_LOG`, defaulting to `info`.
pub fn log_filter() -> String {
    env::var(env_const::LOG_FILTER)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| env_const::DEFAULT_LOG_FILTER.to_string())
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init_logging() -> LogTarget {
    let filter = log_filter();

    if Path::new(paths::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                let _ = tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .try_init();
                return LogTarget::Journald;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(tracing_subscriber::EnvFilter::new(&filter))
        .try_init();
    LogTarget::Stdout
}
