use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::GasHeaterConfig,
    data_item::DataItem,
    error::Result,
    heatpump::AuxHeaterStatus,
    shadow::{document_state, ShadowTopics},
};

/// Tracks the gas heater through the thermocouple its own device reports.
#[derive(Debug, Clone)]
pub struct GasHeater {
    config: GasHeaterConfig,
    thermocouple: Option<DataItem>,
}

impl GasHeater {
    pub fn new(config: GasHeaterConfig) -> Self {
        Self {
            config,
            thermocouple: None,
        }
    }

    pub fn topics(&self) -> ShadowTopics {
        ShadowTopics::for_thing(&self.config.thing_name)
    }

    pub fn thermocouple_temperature(&self) -> Option<f64> {
        self.thermocouple.as_ref().map(DataItem::value)
    }

    /// Applies a shadow document of the gas heater device. Documents without
    /// a reported temperature are ignored; returns whether one was applied.
    pub fn apply_report(&mut self, document: &Value, now_ms: u64) -> Result<bool> {
        let Some(temperature) = document_state(document)
            .and_then(|state| state.get("reported"))
            .and_then(|reported| reported.get("temperature"))
            .and_then(Value::as_f64)
        else {
            debug!("gas heater document without reported temperature");
            return Ok(false);
        };

        let was_active = self.is_active();
        match self.thermocouple.as_mut() {
            Some(item) => item.set_value(temperature, now_ms)?,
            None => self.thermocouple = Some(DataItem::new(temperature, now_ms)?),
        }

        if self.is_active() != was_active {
            info!(
                temperature,
                active = self.is_active(),
                "gas heater state changed"
            );
        }
        Ok(true)
    }

    /// Forgets a thermocouple reading older than the configured staleness.
    pub fn expire_stale(&mut self, now_ms: u64) {
        let stale = self.thermocouple.as_ref().is_some_and(|item| {
            now_ms.saturating_sub(item.last_update_ms()) > self.config.stale_after_ms
        });
        if stale {
            info!("gas heater report is stale, assuming heater is off");
            self.thermocouple = None;
        }
    }
}

impl AuxHeaterStatus for GasHeater {
    fn is_active(&self) -> bool {
        self.thermocouple_temperature()
            .is_some_and(|temperature| temperature >= self.config.active_temp_c)
    }
}

/// Decides when the gas heater device publishes its thermocouple reading:
/// on the first reading, on any change, and as a heartbeat.
#[derive(Debug, Clone)]
pub struct ThermocoupleReporter {
    resync_interval_ms: u64,
    temperature: Option<DataItem>,
    last_publish_ms: Option<u64>,
}

impl ThermocoupleReporter {
    pub fn new(resync_interval_ms: u64) -> Self {
        Self {
            resync_interval_ms,
            temperature: None,
            last_publish_ms: None,
        }
    }

    /// Returns the temperature to publish, if any.
    pub fn observe(&mut self, temperature: f64, now_ms: u64) -> Result<Option<f64>> {
        let publish = match self.temperature.as_mut() {
            None => {
                self.temperature = Some(DataItem::new(temperature, now_ms)?);
                true
            }
            Some(item) if item.value() != temperature => {
                item.set_value(temperature, now_ms)?;
                true
            }
            Some(_) => self.last_publish_ms.map_or(true, |last| {
                now_ms.saturating_sub(last) > self.resync_interval_ms
            }),
        };

        if !publish {
            return Ok(None);
        }
        self.last_publish_ms = Some(now_ms);
        Ok(Some(temperature))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn heater() -> GasHeater {
        GasHeater::new(GasHeaterConfig::default())
    }

    fn report(temperature: f64) -> Value {
        json!({ "state": { "reported": { "temperature": temperature, "thing": "gas-heater" } } })
    }

    #[test]
    fn hot_thermocouple_means_active() {
        let mut heater = heater();
        assert!(!heater.is_active());

        assert!(heater.apply_report(&report(65.0), 0).unwrap());
        assert!(heater.is_active());

        heater.apply_report(&report(25.0), 10).unwrap();
        assert!(!heater.is_active());
    }

    #[test]
    fn documents_without_temperature_are_ignored() {
        let mut heater = heater();
        let applied = heater
            .apply_report(&json!({ "state": { "reported": { "thing": "gas-heater" } } }), 0)
            .unwrap();
        assert!(!applied);
        assert_eq!(heater.thermocouple_temperature(), None);
    }

    #[test]
    fn stale_reports_expire() {
        let mut heater = heater();
        heater.apply_report(&report(65.0), 1_000).unwrap();

        heater.expire_stale(1_000 + GasHeaterConfig::default().stale_after_ms);
        assert!(heater.is_active());

        heater.expire_stale(1_001 + GasHeaterConfig::default().stale_after_ms);
        assert!(!heater.is_active());
    }

    #[test]
    fn reporter_publishes_changes_and_heartbeats() {
        let mut reporter = ThermocoupleReporter::new(60_000);

        assert_eq!(reporter.observe(30.0, 0).unwrap(), Some(30.0));
        assert_eq!(reporter.observe(30.0, 2_000).unwrap(), None);
        assert_eq!(reporter.observe(31.5, 4_000).unwrap(), Some(31.5));
        assert_eq!(reporter.observe(31.5, 64_000).unwrap(), None);
        assert_eq!(reporter.observe(31.5, 64_001).unwrap(), Some(31.5));
        assert_eq!(reporter.observe(31.5, 66_000).unwrap(), None);
    }
}
