use std::{fs, path::PathBuf};

use tracing::warn;

use heatpump_common::{EnvironmentSensor, Reading};

/// Reads `temperature,humidity` from a file kept fresh by an external DHT22
/// poller. Either field may be empty when that read failed.
pub struct FileSensor {
    path: PathBuf,
}

impl FileSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EnvironmentSensor for FileSensor {
    fn read(&mut self) -> Reading {
        match fs::read_to_string(&self.path) {
            Ok(raw) => parse_reading(&raw),
            Err(err) => {
                warn!("failed to read sensor file {}: {err}", self.path.display());
                Reading::default()
            }
        }
    }
}

pub fn parse_reading(raw: &str) -> Reading {
    let mut fields = raw.trim().splitn(2, ',').map(|field| field.trim().parse::<f64>().ok());
    Reading {
        temperature: fields.next().flatten(),
        humidity: fields.next().flatten(),
    }
}

/// Slowly drifting readings for running without hardware.
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    tick: u64,
}

impl EnvironmentSensor for SimulatedSensor {
    fn read(&mut self) -> Reading {
        self.tick = self.tick.wrapping_add(1);
        let step = (self.tick / 3) % 40;
        let offset = step.min(40 - step) as f64;
        Reading::new(15.0 + offset * 0.5, 45.0 + (self.tick % 6) as f64 * 0.5)
    }
}
