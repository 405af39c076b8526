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

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::{error, info, warn};

use fan_controller::config::{self, Configuration};
use fan_controller::hwmon::SysfsHardware;
use fan_controller::logger;
use fan_controller::service::Daemon;
use fan_controller::status::StatusReport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set by the signal handler
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn print_help() {
    eprintln!("fan-controller {} - curve-driven fan control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    fan-controller [OPTIONS] [CONFIG_DIR]");
    eprintln!();
    eprintln!("ARGS:");
    eprintln!("    CONFIG_DIR          Directory holding config.json (used if it exists)");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -V, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    FAN_CONTROLLER_LOG  Log filter (trace, debug, info, warn, error)");
    eprintln!("    XDG_CONFIG_HOME     Base for the default config directory");
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_arg: Option<String> = None;
    for arg in &args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-V" | "--version" => {
                println!("fan-controller {}", VERSION);
                return Ok(());
            }
            flag if flag.starts_with('-') => {
                eprintln!("Unknown argument: {}", flag);
                print_help();
                std::process::exit(2);
            }
            dir if config_arg.is_none() => config_arg = Some(dir.to_string()),
            extra => {
                eprintln!("Unexpected argument: {}", extra);
                print_help();
                std::process::exit(2);
            }
        }
    }

    let target = logger::init_logging();
    info!("fan-controller {} starting, logging to {}", VERSION, target.describe());

    let dir = config::resolve_config_dir(config_arg.as_deref());
    let config_path = config::config_path(&dir);
    let status_path = config::status_path(&dir);
    info!(config = %config_path.display(), "Using configuration");

    let config = match Configuration::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Cannot start without a valid configuration");
            if let Err(write_err) = StatusReport::error(e.to_string()).write(&status_path) {
                warn!(path = %status_path.display(), error = %write_err, "Failed to write status file");
            }
            return Err(e).with_context(|| format!("loading {}", config_path.display()));
        }
    };

    if let Err(e) = ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let hardware = SysfsHardware::new(config.hardware.nvidia_min_fan_speed);
    let mut daemon = Daemon::init(hardware, &config, Some(status_path));
    daemon.run(&SHUTDOWN);

    info!("fan-controller stopped");
    Ok(())
}
