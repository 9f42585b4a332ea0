use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SamplingConfig;

/// Temperature and humidity, either of which may be missing. Doubles as the
/// partial `reported` payload, so absent fields are not serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

impl Reading {
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }

    pub fn complete(&self) -> Option<Sample> {
        Some(Sample {
            temperature: self.temperature?,
            humidity: self.humidity?,
        })
    }
}

/// A reading with both dimensions present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature: f64,
    pub humidity: f64,
}

impl From<Sample> for Reading {
    fn from(sample: Sample) -> Self {
        Reading::new(sample.temperature, sample.humidity)
    }
}

/// One raw read of a temperature/humidity sensor. Drivers report a failed
/// dimension as `None`.
pub trait EnvironmentSensor: Send {
    fn read(&mut self) -> Reading;
}

/// Collects a quorum of raw reads and reduces each dimension to its median.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplingConfig,
}

impl Sampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    pub fn sample(&self, sensor: &mut dyn EnvironmentSensor) -> Reading {
        let mut temperatures = Vec::new();
        let mut humidities = Vec::new();
        let mut attempts = 0;

        while attempts < self.config.max_attempts
            && temperatures.len().min(humidities.len()) < self.config.min_samples
        {
            attempts += 1;
            let raw = sensor.read();
            if let Some(temperature) = raw.temperature.filter(|value| value.is_finite()) {
                temperatures.push(temperature);
            }
            if let Some(humidity) = raw.humidity.filter(|value| value.is_finite()) {
                humidities.push(humidity);
            }
        }

        debug!(
            attempts,
            temperatures = temperatures.len(),
            humidities = humidities.len(),
            "sensor sampling finished"
        );

        Reading {
            temperature: rounded_median(&mut temperatures),
            humidity: rounded_median(&mut humidities),
        }
    }
}

fn rounded_median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };

    Some((median * 10.0).round() / 10.0)
}
