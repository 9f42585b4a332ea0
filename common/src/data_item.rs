use serde::Serialize;

use crate::error::{Error, Result};

/// Direction of change between two consecutive accepted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Down,
    Flat,
    Up,
}

impl Trend {
    pub fn between(previous: f64, current: f64) -> Self {
        if current > previous {
            Self::Up
        } else if current < previous {
            Self::Down
        } else {
            Self::Flat
        }
    }

    pub fn sign(self) -> i8 {
        match self {
            Self::Down => -1,
            Self::Flat => 0,
            Self::Up => 1,
        }
    }

    pub fn is_directional(self) -> bool {
        self != Self::Flat
    }
}

/// One measured quantity together with its single-sample trend memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DataItem {
    value: f64,
    previous_value: Option<f64>,
    trend: Option<Trend>,
    last_update_ms: u64,
}

impl DataItem {
    pub fn new(value: f64, now_ms: u64) -> Result<Self> {
        ensure_finite(value)?;
        Ok(Self {
            value,
            previous_value: None,
            trend: None,
            last_update_ms: now_ms,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn previous_value(&self) -> Option<f64> {
        self.previous_value
    }

    pub fn trend(&self) -> Option<Trend> {
        self.trend
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    pub fn set_value(&mut self, value: f64, now_ms: u64) -> Result<()> {
        ensure_finite(value)?;
        self.previous_value = Some(self.value);
        self.trend = Some(Trend::between(self.value, value));
        self.value = value;
        self.last_update_ms = now_ms;
        Ok(())
    }

    pub fn compute_trend(&self, candidate: f64) -> Trend {
        Trend::between(self.value, candidate)
    }

    /// A candidate is noise when it moves against the established trend by
    /// less than `band`. Without a directional trend nothing is noise.
    pub fn is_noise(&self, candidate: f64, band: f64) -> bool {
        let Some(trend) = self.trend.filter(|trend| trend.is_directional()) else {
            return false;
        };

        if self.compute_trend(candidate) == trend {
            return false;
        }

        (candidate - self.value).abs() < band
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, last_update_ms: u64) {
        self.last_update_ms = last_update_ms;
    }
}

fn ensure_finite(value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidValue(value))
    }
}
