use serde::Serialize;
use serde_json::Value;

use crate::{data_item::Trend, setpoints::Setpoints};

/// Inbound work for the control loop, serialized through a single consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Desired-state document carrying setpoint changes.
    DesiredState(Value),
    /// The shadow service refused one of our updates.
    UpdateRejected,
    /// Shadow document published by the gas heater device.
    GasHeaterReport(Value),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStatus {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(rename = "temperatureTrend")]
    pub temperature_trend: Option<Trend>,
    pub function: Option<&'static str>,
    #[serde(rename = "currentAction")]
    pub current_action: Option<&'static str>,
    pub setpoints: Setpoints,
    #[serde(rename = "gasHeaterActive")]
    pub gas_heater_active: bool,
    #[serde(rename = "gasHeaterTemp")]
    pub gas_heater_temp: Option<f64>,
    #[serde(rename = "lastUpdateMs")]
    pub last_update_ms: Option<u64>,
}
