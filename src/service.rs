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

//! Control loop
//!
//! Single-threaded polling loop driving every assigned fan from its curve:
//!
//! - **INIT**: discover devices, resolve each assignment once, detect PWM
//!   ranges, take manual control and seed the current speed from hardware
//! - **POLLING**: per tick read each needed sensor once, evaluate, smooth and
//!   write; a fault on one fan never affects the others
//! - **SHUTDOWN**: the shutdown flag is honoured at the top of each tick,
//!   between fans and during the sliced inter-tick sleep
//!
//! Fans keep their last applied speed when the loop stops.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::constants::control;
use crate::curves::Curve;
use crate::error::{FanControlError, Result};
use crate::hwmon::{FanRef, Hardware, PwmRange, SensorRef};
use crate::smoothing::next_speed;
use crate::status::{self, DaemonStatus, StatusReport};

/// What happened to one fan during a tick.
#[derive(Debug)]
pub struct FanOutcome {
    pub fan: String,
    pub result: Result<AppliedSpeed>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedSpeed {
    pub temperature: f64,
    /// Curve output before smoothing
    pub target: f64,
    /// Percent written this tick
    pub speed: f64,
    /// Raw value sent to the device
    pub raw: u32,
}

/// A fan under control with its resolved curve and runtime state.
#[derive(Debug)]
struct ControlledFan {
    fan: FanRef,
    curve_name: String,
    curve: Curve,
    sensor: SensorRef,
    range: PwmRange,
    current: f64,
    failures: u32,
    /// False when the sensor was already missing at init
    sensor_discovered: bool,
}

pub struct Daemon<H: Hardware> {
    hardware: H,
    fans: Vec<ControlledFan>,
    /// Discovered sensors reported in the status file
    visible_sensors: Vec<SensorRef>,
    max_step: f64,
    interval: Duration,
    status_path: Option<PathBuf>,
}

impl<H: Hardware> Daemon<H> {
    /// Discover hardware and resolve every fan assignment in `config`.
    ///
    /// Assignments that cannot be honoured (unknown fan, unknown or empty
    /// curve, unparsable sensor id) are reported once and left uncontrolled.
    /// An empty curve name means "no curve" and is skipped silently.
    pub fn init(hardware: H, config: &Configuration, status_path: Option<PathBuf>) -> Self {
        if let Some(path) = &status_path {
            if let Err(e) = StatusReport::new(DaemonStatus::Starting).write(path) {
                warn!(path = %path.display(), error = %e, "Failed to write status file");
            }
        }

        let sensors: Vec<SensorRef> = hardware
            .discover_sensors()
            .into_iter()
            .map(|mut s| {
                let id = s.id();
                s.alias = config.alias_for(&id).map(str::to_string);
                s.hidden = config.is_sensor_hidden(&id);
                s
            })
            .collect();
        let discovered_fans: HashMap<String, FanRef> = hardware
            .discover_fans()
            .into_iter()
            .map(|mut f| {
                let id = f.id();
                f.alias = config.alias_for(&id).map(str::to_string);
                f.hidden = config.is_fan_hidden(&id);
                (id, f)
            })
            .collect();

        info!(
            sensors = sensors.len(),
            fans = discovered_fans.len(),
            assignments = config.fans.len(),
            "Hardware discovered"
        );

        let mut fans = Vec::new();
        for (fan_id, curve_name) in &config.fans {
            if curve_name.is_empty() {
                debug!(fan = %fan_id, "No curve selected");
                continue;
            }
            if let Err(e) = FanRef::from_id(fan_id) {
                warn!(fan = %fan_id, error = %e, "Ignoring assignment");
                continue;
            }
            let Some(fan) = discovered_fans.get(fan_id).cloned() else {
                warn!(fan = %fan_id, "Assigned fan not present, ignoring");
                continue;
            };
            let (Some(curve), Some(curve_cfg)) = (config.curve(curve_name), config.curves.get(curve_name)) else {
                warn!(fan = %fan_id, curve = %curve_name, "Assigned curve does not exist, ignoring");
                continue;
            };
            if curve.is_empty() {
                warn!(fan = %fan_id, curve = %curve_name, "Assigned curve has no points, ignoring");
                continue;
            }
            let sensor = match SensorRef::from_id(&curve_cfg.sensor) {
                Ok(mut s) => {
                    s.alias = config.alias_for(&curve_cfg.sensor).map(str::to_string);
                    s.hidden = config.is_sensor_hidden(&curve_cfg.sensor);
                    s
                }
                Err(e) => {
                    warn!(curve = %curve_name, error = %e, "Curve sensor invalid, ignoring fan {}", fan_id);
                    continue;
                }
            };
            let sensor_discovered = sensors.iter().any(|s| s.kind == sensor.kind);
            if !sensor_discovered {
                // not fatal: reads fail quietly per tick until the sensor shows up
                warn!(curve = %curve_name, sensor = %sensor.id(), "Curve sensor was not discovered");
            }

            let range = hardware.detect_pwm_range(&fan);
            if let Err(e) = hardware.enable_manual_control(&fan) {
                warn!(fan = %fan_id, error = %e, "Failed to enable manual control");
            }
            let current = match hardware.read_fan_speed(&fan, range) {
                Ok(pct) => pct,
                Err(e) => {
                    debug!(fan = %fan_id, error = %e, "Current speed unreadable, assuming 0");
                    0.0
                }
            };

            info!(
                fan = %fan.display_name(),
                curve = %curve_name,
                sensor = %sensor.display_name(),
                min = range.min,
                max = range.max,
                current,
                "Fan under curve control"
            );

            fans.push(ControlledFan {
                fan,
                curve_name: curve_name.clone(),
                curve,
                sensor,
                range,
                current,
                failures: 0,
                sensor_discovered,
            });
        }

        let interval = Duration::from_millis(config.control.interval_ms.max(control::MIN_INTERVAL_MS));
        Self {
            hardware,
            fans,
            visible_sensors: sensors.into_iter().filter(|s| !s.hidden).collect(),
            max_step: config.control.max_step,
            interval,
            status_path,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ids of fans under control, in control order.
    pub fn controlled_fans(&self) -> Vec<String> {
        self.fans.iter().map(|f| f.fan.id()).collect()
    }

    /// Last applied speed of a controlled fan.
    pub fn current_speed(&self, fan_id: &str) -> Option<f64> {
        self.fans
            .iter()
            .find(|f| f.fan.id() == fan_id)
            .map(|f| f.current)
    }

    /// Consecutive failed ticks for a controlled fan.
    pub fn failure_count(&self, fan_id: &str) -> Option<u32> {
        self.fans
            .iter()
            .find(|f| f.fan.id() == fan_id)
            .map(|f| f.failures)
    }

    /// One pass over all controlled fans.
    pub fn tick(&mut self, shutdown: &AtomicBool) -> Vec<FanOutcome> {
        let mut outcomes = Vec::with_capacity(self.fans.len());
        if shutdown.load(Ordering::SeqCst) {
            return outcomes;
        }

        // sensor id -> reading, each sensor read at most once per tick
        let mut readings: HashMap<String, std::result::Result<f64, String>> = HashMap::new();

        for i in 0..self.fans.len() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            let sensor_id = self.fans[i].sensor.id();
            let reading = match readings.get(&sensor_id) {
                Some(r) => r.clone(),
                None => {
                    let r = self
                        .hardware
                        .read_temperature(&self.fans[i].sensor)
                        .map_err(failure_reason);
                    readings.insert(sensor_id.clone(), r.clone());
                    r
                }
            };

            let result = reading
                .map_err(|reason| FanControlError::SensorRead { sensor: sensor_id, reason })
                .and_then(|temperature| self.apply(i, temperature));

            let entry = &mut self.fans[i];
            match &result {
                Ok(applied) => {
                    if entry.failures > 0 {
                        info!(fan = %entry.fan.display_name(), after = entry.failures, "Fan control recovered");
                    }
                    entry.failures = 0;
                    entry.sensor_discovered = true;
                    debug!(
                        fan = %entry.fan.display_name(),
                        curve = %entry.curve_name,
                        temp = applied.temperature,
                        target = applied.target,
                        speed = applied.speed,
                        raw = applied.raw,
                        "Fan updated"
                    );
                }
                Err(e) => {
                    entry.failures += 1;
                    let missing_since_init =
                        !entry.sensor_discovered && matches!(e, FanControlError::SensorRead { .. });
                    if missing_since_init {
                        // reported once at init
                        debug!(
                            fan = %entry.fan.display_name(),
                            sensor = %entry.sensor.id(),
                            failures = entry.failures,
                            "Curve sensor still missing"
                        );
                    } else if entry.failures == 1 || entry.failures % control::FAILURE_LOG_EVERY == 0 {
                        warn!(
                            fan = %entry.fan.display_name(),
                            failures = entry.failures,
                            error = %e,
                            "Fan update failed"
                        );
                    }
                }
            }

            outcomes.push(FanOutcome { fan: entry.fan.id(), result });
        }

        if let Some(path) = self.status_path.clone() {
            self.publish_status(&path, &mut readings);
        }

        outcomes
    }

    /// Evaluate, smooth and write one fan. Current speed only moves on success.
    fn apply(&mut self, index: usize, temperature: f64) -> Result<AppliedSpeed> {
        let entry = &self.fans[index];
        let target = entry.curve.evaluate(temperature);
        let speed = next_speed(entry.current, target, self.max_step);
        let raw = self.hardware.write_fan_speed(&entry.fan, entry.range, speed)?;
        self.fans[index].current = speed;
        Ok(AppliedSpeed { temperature, target, speed, raw })
    }

    fn publish_status(
        &self,
        path: &std::path::Path,
        readings: &mut HashMap<String, std::result::Result<f64, String>>,
    ) {
        let mut report = StatusReport::new(DaemonStatus::Running);

        for sensor in &self.visible_sensors {
            let id = sensor.id();
            let reading = readings
                .entry(id.clone())
                .or_insert_with(|| self.hardware.read_temperature(sensor).map_err(failure_reason));
            report.sensors.insert(id, reading.as_ref().ok().copied());
        }
        report.fans = self
            .fans
            .iter()
            .filter(|f| !f.fan.hidden)
            .map(|f| (f.fan.id(), f.current))
            .collect::<BTreeMap<_, _>>();

        if let Err(e) = report.write(path) {
            warn!(path = %path.display(), error = %e, "Failed to write status file");
        }
    }

    /// Tick until `shutdown` is set, sleeping in short slices between ticks.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            fans = self.fans.len(),
            interval_ms = self.interval.as_millis() as u64,
            max_step = self.max_step,
            "Control loop started"
        );
        if self.fans.is_empty() {
            warn!("No fan is under curve control; only publishing status");
        }

        while !shutdown.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick(shutdown);
            self.sleep_until(started + self.interval, shutdown);
        }

        info!("Control loop stopped; fans keep their last speed");
        self.shutdown();
    }

    fn sleep_until(&self, deadline: Instant, shutdown: &AtomicBool) {
        let slice = Duration::from_millis(control::SLEEP_SLICE_MS);
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }

    /// Remove the status file.
    pub fn shutdown(&self) {
        if let Some(path) = &self.status_path {
            if let Err(e) = status::remove(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove status file");
            }
        }
    }
}

fn failure_reason(err: FanControlError) -> String {
    match err {
        FanControlError::SensorRead { reason, .. } => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwmon::{FanKind, MockHardware, SensorKind};
    use crate::test_utils::{capture_warnings, config_with, silent_points};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const CPU_TEMP: &str = "/sys/class/hwmon/hwmon0/temp1_input";
    const CASE_TEMP: &str = "/sys/class/hwmon/hwmon1/temp1_input";
    const CPU_FAN: &str = "/sys/class/hwmon/hwmon0/pwm1";
    const CASE_FAN: &str = "/sys/class/hwmon/hwmon0/pwm2";
    const SPARE_FAN: &str = "/sys/class/hwmon/hwmon0/pwm3";

    type Writes = Arc<Mutex<Vec<(String, f64)>>>;

    /// Mock with three fans and two sensors; temps keyed by sensor id, `None`
    /// means the read fails. Writes to `failing_fan` fail.
    fn mock(temps: Vec<(&'static str, Option<f64>)>, failing_fan: Option<&'static str>) -> (MockHardware, Writes) {
        let mut hw = MockHardware::new();
        hw.expect_discover_sensors().returning(|| {
            vec![
                SensorRef::new(SensorKind::Hwmon(CPU_TEMP.into())),
                SensorRef::new(SensorKind::Hwmon(CASE_TEMP.into())),
            ]
        });
        hw.expect_discover_fans().returning(|| {
            [CPU_FAN, CASE_FAN, SPARE_FAN]
                .iter()
                .map(|p| FanRef::new(FanKind::Hwmon((*p).into())))
                .collect()
        });
        hw.expect_detect_pwm_range().returning(|_| PwmRange::default());
        hw.expect_enable_manual_control().returning(|_| Ok(()));
        hw.expect_read_fan_speed().returning(|_, _| Ok(0.0));
        hw.expect_read_temperature().returning(move |s: &SensorRef| {
            let id = s.id();
            match temps.iter().find(|(k, _)| *k == id) {
                Some((_, Some(t))) => Ok(*t),
                _ => Err(FanControlError::sensor_read(id, "No such device")),
            }
        });

        let writes: Writes = Arc::new(Mutex::new(Vec::new()));
        let log = writes.clone();
        hw.expect_write_fan_speed().returning(move |f: &FanRef, r: PwmRange, pct: f64| {
            let id = f.id();
            if Some(id.as_str()) == failing_fan {
                return Err(FanControlError::actuator_write(id, "Permission denied"));
            }
            log.lock().unwrap().push((id, pct));
            Ok(r.percent_to_raw(pct))
        });
        (hw, writes)
    }

    fn two_fan_config() -> Configuration {
        config_with(
            &[("Silent", CPU_TEMP, silent_points()), ("Case", CASE_TEMP, vec![(30.0, 40.0)])],
            &[(CPU_FAN, "Silent"), (CASE_FAN, "Case")],
        )
    }

    fn running() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_tick_applies_smoothed_curve_speed() {
        let (hw, writes) = mock(vec![(CPU_TEMP, Some(40.0)), (CASE_TEMP, Some(35.0))], None);
        let mut daemon = Daemon::init(hw, &two_fan_config(), None);
        let flag = running();

        let outcomes = daemon.tick(&flag);
        assert_eq!(outcomes.len(), 2);
        let cpu = outcomes.iter().find(|o| o.fan == CPU_FAN).unwrap();
        let applied = cpu.result.as_ref().unwrap();
        assert_eq!(applied.target, 25.0);
        assert_eq!(applied.speed, 10.0);
        assert_eq!(applied.raw, 26);

        daemon.tick(&flag);
        daemon.tick(&flag);
        assert_eq!(daemon.current_speed(CPU_FAN), Some(25.0));
        assert_eq!(daemon.current_speed(CASE_FAN), Some(30.0));

        let cpu_writes: Vec<f64> = writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == CPU_FAN)
            .map(|(_, pct)| *pct)
            .collect();
        assert_eq!(cpu_writes, vec![10.0, 20.0, 25.0]);
    }

    #[test]
    fn test_unassigned_fan_never_written() {
        let (hw, writes) = mock(vec![(CPU_TEMP, Some(70.0)), (CASE_TEMP, Some(70.0))], None);
        let mut daemon = Daemon::init(hw, &two_fan_config(), None);
        let flag = running();
        for _ in 0..5 {
            daemon.tick(&flag);
        }
        assert!(!daemon.controlled_fans().contains(&SPARE_FAN.to_string()));
        assert!(writes.lock().unwrap().iter().all(|(id, _)| id != SPARE_FAN));
    }

    #[test]
    fn test_sensor_failure_isolated_to_its_fans() {
        let (hw, writes) = mock(vec![(CASE_TEMP, Some(50.0))], None);
        let mut daemon = Daemon::init(hw, &two_fan_config(), None);
        let flag = running();

        for _ in 0..3 {
            let outcomes = daemon.tick(&flag);
            let cpu = outcomes.iter().find(|o| o.fan == CPU_FAN).unwrap();
            assert!(matches!(cpu.result, Err(FanControlError::SensorRead { .. })));
            let case = outcomes.iter().find(|o| o.fan == CASE_FAN).unwrap();
            assert!(case.result.is_ok());
        }
        assert_eq!(daemon.failure_count(CPU_FAN), Some(3));
        assert_eq!(daemon.current_speed(CPU_FAN), Some(0.0));
        assert_eq!(writes.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_failed_write_keeps_current_speed() {
        let (hw, _writes) = mock(vec![(CPU_TEMP, Some(80.0)), (CASE_TEMP, Some(80.0))], Some(CPU_FAN));
        let mut daemon = Daemon::init(hw, &two_fan_config(), None);
        let flag = running();

        let outcomes = daemon.tick(&flag);
        let cpu = outcomes.iter().find(|o| o.fan == CPU_FAN).unwrap();
        assert!(matches!(cpu.result, Err(FanControlError::ActuatorWrite { .. })));
        assert_eq!(daemon.current_speed(CPU_FAN), Some(0.0));
        assert_eq!(daemon.current_speed(CASE_FAN), Some(10.0));
        assert_eq!(daemon.failure_count(CPU_FAN), Some(1));
    }

    #[test]
    fn test_invalid_assignments_are_dropped() {
        let config = config_with(
            &[("Silent", CPU_TEMP, silent_points()), ("Empty", CPU_TEMP, vec![]), ("Bad", "temp1", silent_points())],
            &[
                (CPU_FAN, "Empty"),
                (CASE_FAN, "Missing"),
                (SPARE_FAN, "Bad"),
                ("/sys/class/hwmon/hwmon9/pwm1", "Silent"),
                ("/sys/class/hwmon/hwmon0/pwm1_enable", "Silent"),
            ],
        );
        let (hw, writes) = mock(vec![(CPU_TEMP, Some(60.0))], None);
        let mut daemon = Daemon::init(hw, &config, None);

        assert!(daemon.controlled_fans().is_empty());
        assert!(daemon.tick(&running()).is_empty());
        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_shared_sensor_read_once_per_tick() {
        let config = config_with(
            &[("A", CPU_TEMP, silent_points()), ("B", CPU_TEMP, vec![(0.0, 50.0)])],
            &[(CPU_FAN, "A"), (CASE_FAN, "B"), (SPARE_FAN, "A")],
        );
        let reads = Arc::new(Mutex::new(0u32));
        let counter = reads.clone();

        let mut hw = MockHardware::new();
        hw.expect_discover_sensors()
            .returning(|| vec![SensorRef::new(SensorKind::Hwmon(CPU_TEMP.into()))]);
        hw.expect_discover_fans().returning(|| {
            [CPU_FAN, CASE_FAN, SPARE_FAN]
                .iter()
                .map(|p| FanRef::new(FanKind::Hwmon((*p).into())))
                .collect()
        });
        hw.expect_detect_pwm_range().returning(|_| PwmRange::default());
        hw.expect_enable_manual_control().returning(|_| Ok(()));
        hw.expect_read_fan_speed().returning(|_, _| Ok(0.0));
        hw.expect_read_temperature().returning(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(45.0)
        });
        hw.expect_write_fan_speed().returning(|_, r, pct| Ok(r.percent_to_raw(pct)));

        let mut daemon = Daemon::init(hw, &config, None);
        let flag = running();
        daemon.tick(&flag);
        assert_eq!(*reads.lock().unwrap(), 1);
        daemon.tick(&flag);
        assert_eq!(*reads.lock().unwrap(), 2);
    }

    #[test]
    fn test_init_seeds_current_speed_and_takes_control() {
        let mut hw = MockHardware::new();
        hw.expect_discover_sensors()
            .returning(|| vec![SensorRef::new(SensorKind::Hwmon(CPU_TEMP.into()))]);
        hw.expect_discover_fans().returning(|| {
            vec![
                FanRef::new(FanKind::Hwmon(CPU_FAN.into())),
                FanRef::new(FanKind::Hwmon(CASE_FAN.into())),
            ]
        });
        hw.expect_detect_pwm_range().times(2).returning(|_| PwmRange::new(0, 100));
        hw.expect_enable_manual_control()
            .times(2)
            .returning(|f| if f.id() == CASE_FAN { Err(FanControlError::actuator_write(f.id(), "busy")) } else { Ok(()) });
        hw.expect_read_fan_speed().returning(|f, _| {
            if f.id() == CPU_FAN {
                Ok(35.0)
            } else {
                Err(FanControlError::sensor_read(f.id(), "gone"))
            }
        });

        let config = config_with(
            &[("Silent", CPU_TEMP, silent_points())],
            &[(CPU_FAN, "Silent"), (CASE_FAN, "Silent")],
        );
        let daemon = Daemon::init(hw, &config, None);
        assert_eq!(daemon.current_speed(CPU_FAN), Some(35.0));
        assert_eq!(daemon.current_speed(CASE_FAN), Some(0.0));
    }

    #[test]
    fn test_shutdown_flag_stops_tick() {
        let (hw, writes) = mock(vec![(CPU_TEMP, Some(60.0)), (CASE_TEMP, Some(60.0))], None);
        let mut daemon = Daemon::init(hw, &two_fan_config(), None);
        let flag = AtomicBool::new(true);

        assert!(daemon.tick(&flag).is_empty());
        daemon.run(&flag);
        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_recovery_resets_failure_count() {
        let temps: Arc<Mutex<Option<f64>>> = Arc::new(Mutex::new(None));
        let source = temps.clone();

        let mut hw = MockHardware::new();
        hw.expect_discover_sensors().returning(Vec::new);
        hw.expect_discover_fans()
            .returning(|| vec![FanRef::new(FanKind::Hwmon(CPU_FAN.into()))]);
        hw.expect_detect_pwm_range().returning(|_| PwmRange::default());
        hw.expect_enable_manual_control().returning(|_| Ok(()));
        hw.expect_read_fan_speed().returning(|_, _| Ok(0.0));
        hw.expect_read_temperature().returning(move |s| {
            source
                .lock()
                .unwrap()
                .ok_or_else(|| FanControlError::sensor_read(s.id(), "EIO"))
        });
        hw.expect_write_fan_speed().returning(|_, r, pct| Ok(r.percent_to_raw(pct)));

        let config = config_with(&[("Silent", CPU_TEMP, silent_points())], &[(CPU_FAN, "Silent")]);
        let mut daemon = Daemon::init(hw, &config, None);
        let flag = running();

        for _ in 0..12 {
            daemon.tick(&flag);
        }
        assert_eq!(daemon.failure_count(CPU_FAN), Some(12));

        *temps.lock().unwrap() = Some(70.0);
        let outcomes = daemon.tick(&flag);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(daemon.failure_count(CPU_FAN), Some(0));
    }

    #[test]
    fn test_status_file_written_and_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".fan_controller_status.json");

        let mut config = two_fan_config();
        config.hidden_fans.insert(CASE_FAN.to_string());
        config.hidden_sensors.insert(CASE_TEMP.to_string());

        let (hw, _writes) = mock(vec![(CPU_TEMP, Some(40.0)), (CASE_TEMP, Some(30.0))], None);
        let mut daemon = Daemon::init(hw, &config, Some(path.clone()));
        let starting = StatusReport::read(&path).unwrap();
        assert_eq!(starting.status, DaemonStatus::Starting);

        daemon.tick(&running());
        let report = StatusReport::read(&path).unwrap();
        assert_eq!(report.status, DaemonStatus::Running);
        assert_eq!(report.sensors.get(CPU_TEMP), Some(&Some(40.0)));
        assert!(!report.sensors.contains_key(CASE_TEMP));
        assert_eq!(report.fans.get(CPU_FAN), Some(&10.0));
        assert!(!report.fans.contains_key(CASE_FAN));

        daemon.shutdown();
        assert!(!path.exists());
    }

    #[test]
    fn test_sensor_missing_at_init_warns_once() {
        const GONE_TEMP: &str = "/sys/class/hwmon/hwmon0/temp9_input";
        let config = config_with(
            &[("Silent", CPU_TEMP, silent_points()), ("Ghost", GONE_TEMP, silent_points())],
            &[(CPU_FAN, "Ghost")],
        );
        let (hw, writes) = mock(vec![(CPU_TEMP, Some(40.0))], None);

        let (failures, logs) = capture_warnings(|| {
            let mut daemon = Daemon::init(hw, &config, None);
            let flag = running();
            for _ in 0..60 {
                daemon.tick(&flag);
            }
            daemon.failure_count(CPU_FAN)
        });

        assert_eq!(failures, Some(60));
        assert!(writes.lock().unwrap().is_empty());
        assert_eq!(logs.matches("Curve sensor was not discovered").count(), 1);
        assert_eq!(logs.matches("Fan update failed").count(), 0, "{}", logs);
    }

    #[test]
    fn test_discovered_sensor_failures_are_throttled() {
        let (hw, _writes) = mock(vec![(CASE_TEMP, Some(40.0))], None);
        let config = config_with(&[("Silent", CPU_TEMP, silent_points())], &[(CPU_FAN, "Silent")]);

        let (_, logs) = capture_warnings(|| {
            let mut daemon = Daemon::init(hw, &config, None);
            let flag = running();
            for _ in 0..60 {
                daemon.tick(&flag);
            }
        });

        // ticks 1, 10, 20, 30, 40, 50, 60
        assert_eq!(logs.matches("Fan update failed").count(), 7, "{}", logs);
    }

    #[test]
    fn test_empty_curve_name_is_unassigned_without_warning() {
        let config = config_with(
            &[("Silent", CPU_TEMP, silent_points())],
            &[(CPU_FAN, "Silent"), (CASE_FAN, "")],
        );
        let (hw, writes) = mock(vec![(CPU_TEMP, Some(40.0))], None);

        let (controlled, logs) = capture_warnings(|| {
            let mut daemon = Daemon::init(hw, &config, None);
            daemon.tick(&running());
            daemon.controlled_fans()
        });

        assert_eq!(controlled, vec![CPU_FAN.to_string()]);
        assert!(writes.lock().unwrap().iter().all(|(id, _)| id != CASE_FAN));
        assert!(logs.is_empty(), "{}", logs);
    }

    #[test]
    fn test_interval_from_config() {
        let (hw, _) = mock(vec![], None);
        let mut config = two_fan_config();
        config.control.interval_ms = 2500;
        let daemon = Daemon::init(hw, &config, None);
        assert_eq!(daemon.interval(), Duration::from_millis(2500));
    }
}
