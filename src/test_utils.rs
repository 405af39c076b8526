/*
 * Test utilities for fan-controller
 *
 * Builds throwaway hwmon trees and configurations so hardware and control
 * loop code can be exercised without real devices.
 */

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::config::{Configuration, CurveConfig};

/// A fake `/sys/class/hwmon` rooted in a temporary directory.
pub struct FakeHwmon {
    dir: TempDir,
}

impl FakeHwmon {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("class/hwmon")).unwrap();
        Self { dir }
    }

    /// Directory passed to `SysfsHardware::with_root`.
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("class/hwmon")
    }

    /// Create `hwmonN` with a `name` file.
    pub fn chip(&self, index: u32, name: &str) -> FakeChip {
        let path = self.root().join(format!("hwmon{}", index));
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("name"), name).unwrap();
        FakeChip { path }
    }
}

/// One `hwmonN` directory.
pub struct FakeChip {
    path: PathBuf,
}

impl FakeChip {
    pub fn path(&self, file: &str) -> PathBuf {
        self.path.join(file)
    }

    /// Id string for a file in this chip, as used in configurations.
    pub fn id(&self, file: &str) -> String {
        self.path(file).display().to_string()
    }

    pub fn file(&self, name: &str, content: &str) -> &Self {
        fs::write(self.path.join(name), content).unwrap();
        self
    }

    pub fn temp(&self, index: u32, millidegrees: i64) -> &Self {
        self.file(&format!("temp{}_input", index), &millidegrees.to_string())
    }

    pub fn pwm(&self, index: u32, raw: u32) -> &Self {
        self.file(&format!("pwm{}", index), &raw.to_string())
    }

    pub fn pwm_enable(&self, index: u32, mode: u32) -> &Self {
        self.file(&format!("pwm{}_enable", index), &mode.to_string())
    }

    pub fn pwm_max(&self, index: u32, max: u32) -> &Self {
        self.file(&format!("pwm{}_max", index), &max.to_string())
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path.join(name)).unwrap().trim().to_string()
    }
}

/// `[(20,0),(60,50),(80,100)]`, a quiet profile.
pub fn silent_points() -> Vec<(f64, f64)> {
    vec![(20.0, 0.0), (60.0, 50.0), (80.0, 100.0)]
}

/// Configuration with one curve per `(name, sensor id, points)` and the given
/// fan assignments.
pub fn config_with(
    curves: &[(&str, &str, Vec<(f64, f64)>)],
    fans: &[(&str, &str)],
) -> Configuration {
    let curves: BTreeMap<String, CurveConfig> = curves
        .iter()
        .map(|(name, sensor, points)| {
            (
                name.to_string(),
                CurveConfig {
                    sensor: sensor.to_string(),
                    points: points.clone(),
                },
            )
        })
        .collect();
    let fans = fans
        .iter()
        .map(|(fan, curve)| (fan.to_string(), curve.to_string()))
        .collect();

    Configuration {
        curves,
        fans,
        ..Configuration::default()
    }
}

/// Shared buffer for captured log output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return its result together with
/// every WARN and ERROR line it logged.
pub fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_hwmon_layout() {
        let hw = FakeHwmon::new();
        let chip = hw.chip(3, "nct6775");
        chip.temp(1, 41000).pwm(1, 128).pwm_enable(1, 2);

        assert!(hw.root().join("hwmon3/name").exists());
        assert_eq!(chip.read("temp1_input"), "41000");
        assert_eq!(chip.read("pwm1"), "128");
        assert_eq!(chip.read("pwm1_enable"), "2");
        assert!(chip.id("pwm1").ends_with("hwmon3/pwm1"));
        assert_eq!(chip.path("pwm1"), hw.root().join("hwmon3/pwm1"));
    }

    #[test]
    fn test_config_with() {
        let cfg = config_with(&[("Silent", "nvidia-smi", silent_points())], &[("nvidia-settings", "Silent")]);
        assert_eq!(cfg.curves["Silent"].points.len(), 3);
        assert_eq!(cfg.fans["nvidia-settings"], "Silent");
    }

    #[test]
    fn test_capture_warnings_filters_below_warn() {
        let (value, logs) = capture_warnings(|| {
            tracing::info!("quiet");
            tracing::warn!("loud");
            7
        });
        assert_eq!(value, 7);
        assert!(logs.contains("loud"));
        assert!(!logs.contains("quiet"));
    }
}
