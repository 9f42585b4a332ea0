use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    config::ControllerConfig,
    data_item::DataItem,
    error::Result,
    gas::GasHeater,
    heatpump::{AuxHeaterStatus, Heatpump, HeatpumpAction},
    sampling::{Reading, Sample},
    setpoints::SetpointsUpdate,
    shadow::{document_state, ShadowClient},
    state::ReconciledState,
    types::{ControlEvent, ControllerStatus},
};

/// Ties sampling, the hysteresis engine and shadow reporting together. Owns
/// all mutable controller state; callers feed it samples and events from a
/// single thread.
pub struct Controller {
    config: ControllerConfig,
    heatpump: Heatpump,
    state: ReconciledState,
    gas_heater: GasHeater,
    shadow: ShadowClient,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        heatpump: Heatpump,
        gas_heater: GasHeater,
        shadow: ShadowClient,
    ) -> Self {
        Self {
            config,
            heatpump,
            state: ReconciledState::default(),
            gas_heater,
            shadow,
        }
    }

    pub fn heatpump(&self) -> &Heatpump {
        &self.heatpump
    }

    pub fn state(&self) -> &ReconciledState {
        &self.state
    }

    /// Verifies the transmitter, reports the setpoints and asks the gas
    /// heater device for its current state.
    pub fn start(&mut self) -> Result<()> {
        self.heatpump.self_test()?;
        self.send_setpoints();

        let topic = self.gas_heater.topics().get;
        debug!("asking for gas heater state on {topic}");
        if let Err(err) = self.shadow.publish_raw(&topic, b"") {
            warn!("gas heater state request failed: {err}");
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: ControlEvent, now_ms: u64) {
        match event {
            ControlEvent::DesiredState(document) => {
                if let Err(err) = self.update_setpoints(&document) {
                    warn!("rejected desired state: {err}");
                }
            }
            ControlEvent::UpdateRejected => {
                warn!("state update rejected, clearing local state");
                self.state.reset();
            }
            ControlEvent::GasHeaterReport(document) => {
                if let Err(err) = self.gas_heater.apply_report(&document, now_ms) {
                    warn!("invalid gas heater report: {err}");
                }
            }
        }
    }

    /// Applies the setpoints in a desired-state document and reports the
    /// resulting band.
    pub fn update_setpoints(&mut self, document: &Value) -> Result<()> {
        let Some(desired) = document_state(document) else {
            warn!("desired state document without state: {document}");
            return Ok(());
        };
        debug!(%desired, "received desired state");

        let update: SetpointsUpdate = serde_json::from_value(desired.clone())?;
        if update.is_empty() {
            debug!("desired state carries no setpoints");
            return Ok(());
        }

        self.heatpump.set_setpoints(&update)?;
        self.send_setpoints();
        Ok(())
    }

    pub fn send_setpoints(&mut self) {
        let setpoints = *self.heatpump.setpoints();
        self.publish_reported(&setpoints);
    }

    /// One sampling cycle. Incomplete readings are skipped.
    pub fn run_cycle(&mut self, reading: Reading, now_ms: u64) -> bool {
        self.gas_heater.expire_stale(now_ms);

        let Some(sample) = reading.complete() else {
            debug!(?reading, "incomplete sample, skipping cycle");
            return false;
        };

        self.process_state(&sample);
        self.send_sample(&sample, now_ms);
        true
    }

    /// Decides on a heat pump command for `sample` and sends it, unless it
    /// repeats what the heat pump is already doing. Returns the action sent.
    pub fn process_state(&mut self, sample: &Sample) -> Option<HeatpumpAction> {
        debug!(state = ?self.state, ?sample, "processing state");

        let Some(action) = self
            .heatpump
            .get_action(sample.temperature, Some(&self.gas_heater as &dyn AuxHeaterStatus))
        else {
            debug!("nothing to do");
            return None;
        };

        if Some(action) == self.heatpump.current_action() {
            if let Some(held) = self.state.temperature() {
                if !self.should_repeat(held, action, sample.temperature) {
                    return None;
                }
            }
        }

        info!("sending command to heatpump: {}", action.function());
        if let Err(err) = self.heatpump.send_command(action) {
            warn!("could not send command to heat pump: {err}");
            return None;
        }

        self.state.set_function(action);
        self.publish_reported(&json!({ "function": action.function() }));
        Some(action)
    }

    fn should_repeat(&self, held: &DataItem, action: HeatpumpAction, temperature: f64) -> bool {
        if held.is_noise(temperature, self.config.noise_band) {
            debug!(temperature, "noise");
            return false;
        }

        let trend = held.compute_trend(temperature);
        if trend.is_directional() && trend == action.trend() {
            debug!(?trend, "trend persists, repeating {}", action.function());
            true
        } else {
            debug!("heat pump is already {}", action.function());
            false
        }
    }

    /// Reports the part of `sample` the shadow does not know yet, or all of
    /// it when a resync is due. Returns what was reported.
    pub fn send_sample(&mut self, sample: &Sample, now_ms: u64) -> Option<Reading> {
        let reading = Reading::from(*sample);
        let report = match self.state.plan_report(
            &reading,
            now_ms,
            self.config.resync_interval_ms,
            self.config.delta_threshold,
        ) {
            Ok(report) => report,
            Err(err) => {
                warn!("could not update local state: {err}");
                return None;
            }
        };

        debug!(
            now_ms,
            last_update_ms = ?self.state.last_update_ms(),
            temperature = sample.temperature,
            humidity = sample.humidity,
            "sample reconciled"
        );

        if report.is_empty() {
            return None;
        }

        self.publish_reported(&report);
        Some(report)
    }

    pub fn status(&self) -> ControllerStatus {
        let temperature = self.state.temperature();
        ControllerStatus {
            temperature: temperature.map(DataItem::value),
            humidity: self.state.humidity().map(DataItem::value),
            temperature_trend: temperature.and_then(DataItem::trend),
            function: self.state.function().map(HeatpumpAction::function),
            current_action: self.heatpump.current_action().map(HeatpumpAction::function),
            setpoints: *self.heatpump.setpoints(),
            gas_heater_active: self.gas_heater.is_active(),
            gas_heater_temp: self.gas_heater.thermocouple_temperature(),
            last_update_ms: self.state.last_update_ms(),
        }
    }

    fn publish_reported<T: Serialize>(&mut self, reported: &T) {
        if let Err(err) = self.shadow.publish_reported(reported) {
            warn!("publish failed ({err}), clearing local state");
            self.state.reset();
        }
    }

    #[cfg(test)]
    pub(crate) fn parts_mut(&mut self) -> (&mut Heatpump, &mut ReconciledState) {
        (&mut self.heatpump, &mut self.state)
    }
}
