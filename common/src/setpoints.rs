use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointKey {
    HeatingStart,
    HeatingStop,
    CoolingStop,
    CoolingStart,
}

impl SetpointKey {
    pub const ALL: [SetpointKey; 4] = [
        Self::HeatingStart,
        Self::HeatingStop,
        Self::CoolingStop,
        Self::CoolingStart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeatingStart => "heating_start",
            Self::HeatingStop => "heating_stop",
            Self::CoolingStop => "cooling_stop",
            Self::CoolingStart => "cooling_start",
        }
    }
}

impl fmt::Display for SetpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four-threshold band. A freshly built heat pump has none configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Setpoints {
    pub heating_start: Option<f64>,
    pub heating_stop: Option<f64>,
    pub cooling_stop: Option<f64>,
    pub cooling_start: Option<f64>,
}

impl Setpoints {
    pub fn new(
        heating_start: f64,
        heating_stop: f64,
        cooling_stop: f64,
        cooling_start: f64,
    ) -> Self {
        Self {
            heating_start: Some(heating_start),
            heating_stop: Some(heating_stop),
            cooling_stop: Some(cooling_stop),
            cooling_start: Some(cooling_start),
        }
    }

    pub fn get(&self, key: SetpointKey) -> Option<f64> {
        match key {
            SetpointKey::HeatingStart => self.heating_start,
            SetpointKey::HeatingStop => self.heating_stop,
            SetpointKey::CoolingStop => self.cooling_stop,
            SetpointKey::CoolingStart => self.cooling_start,
        }
    }

    /// Both heating thresholds, when present.
    pub fn heating(&self) -> Option<(f64, f64)> {
        self.heating_start.zip(self.heating_stop)
    }

    /// Both cooling thresholds, when present.
    pub fn cooling(&self) -> Option<(f64, f64)> {
        self.cooling_stop.zip(self.cooling_start)
    }

    /// Overlays `update` on `self` and validates the result as a whole.
    pub fn merge(&self, update: &SetpointsUpdate) -> Result<Setpoints> {
        let merged = Setpoints {
            heating_start: update.heating_start.unwrap_or(self.heating_start),
            heating_stop: update.heating_stop.unwrap_or(self.heating_stop),
            cooling_stop: update.cooling_stop.unwrap_or(self.cooling_stop),
            cooling_start: update.cooling_start.unwrap_or(self.cooling_start),
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<()> {
        for key in SetpointKey::ALL {
            if self.get(key).is_none() {
                return Err(Error::MissingSetpoint(key));
            }
        }

        let ordered = [
            (SetpointKey::HeatingStart, SetpointKey::HeatingStop),
            (SetpointKey::CoolingStop, SetpointKey::CoolingStart),
            (SetpointKey::HeatingStop, SetpointKey::CoolingStop),
        ];
        for (lower, upper) in ordered {
            if let (Some(low), Some(high)) = (self.get(lower), self.get(upper)) {
                if low >= high {
                    return Err(Error::SetpointOrder { lower, upper });
                }
            }
        }

        Ok(())
    }
}

/// Partial setpoint document. The outer `Option` says whether a key was
/// supplied at all; an explicit `null` arrives as `Some(None)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct SetpointsUpdate {
    #[serde(default, deserialize_with = "supplied")]
    pub heating_start: Option<Option<f64>>,
    #[serde(default, deserialize_with = "supplied")]
    pub heating_stop: Option<Option<f64>>,
    #[serde(default, deserialize_with = "supplied")]
    pub cooling_stop: Option<Option<f64>>,
    #[serde(default, deserialize_with = "supplied")]
    pub cooling_start: Option<Option<f64>>,
}

impl SetpointsUpdate {
    pub fn is_empty(&self) -> bool {
        self.heating_start.is_none()
            && self.heating_stop.is_none()
            && self.cooling_stop.is_none()
            && self.cooling_start.is_none()
    }
}

fn supplied<'de, D>(deserializer: D) -> std::result::Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}
