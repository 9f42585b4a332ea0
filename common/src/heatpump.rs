use serde::Serialize;
use tracing::{debug, info};

use crate::{
    data_item::Trend,
    error::{Error, Result},
    setpoints::{Setpoints, SetpointsUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatpumpAction {
    #[serde(rename = "heating")]
    StartHeating,
    #[serde(rename = "cooling")]
    StartCooling,
    Shutdown,
}

impl HeatpumpAction {
    /// Label reported as the shadow's `function`.
    pub fn function(self) -> &'static str {
        match self {
            Self::StartHeating => "heating",
            Self::StartCooling => "cooling",
            Self::Shutdown => "shutdown",
        }
    }

    /// Button name in the heat pump's LIRC remote definition.
    pub fn command(self) -> &'static str {
        match self {
            Self::StartHeating => "stokesheat",
            Self::StartCooling => "maxcold",
            Self::Shutdown => "stokesoff",
        }
    }

    /// Temperature direction that keeps this action relevant.
    pub fn trend(self) -> Trend {
        match self {
            Self::StartHeating => Trend::Down,
            Self::StartCooling => Trend::Up,
            Self::Shutdown => Trend::Flat,
        }
    }
}

/// Executes a physical heat pump command.
pub trait CommandSink: Send {
    fn send(&mut self, action: HeatpumpAction) -> Result<()>;
}

/// Independent read-back of the transmitter, e.g. a latch on the IR LED line.
pub trait HardwareVerifier: Send {
    fn self_test(&mut self) -> Result<()>;

    /// Clears the latch before a transmission.
    fn arm(&mut self) -> Result<()>;

    /// Whether a transmission was observed since the last `arm`.
    fn confirm(&mut self) -> Result<bool>;
}

/// Reports whether an auxiliary heater is currently running.
pub trait AuxHeaterStatus {
    fn is_active(&self) -> bool;
}

pub struct Heatpump {
    setpoints: Setpoints,
    current_action: Option<HeatpumpAction>,
    sink: Box<dyn CommandSink>,
    verifier: Option<Box<dyn HardwareVerifier>>,
}

impl Heatpump {
    pub fn new(sink: Box<dyn CommandSink>) -> Self {
        Self {
            setpoints: Setpoints::default(),
            current_action: None,
            sink,
            verifier: None,
        }
    }

    /// Installs a complete band, e.g. the configured defaults.
    pub fn with_setpoints(mut self, setpoints: Setpoints) -> Result<Self> {
        setpoints.validate()?;
        self.setpoints = setpoints;
        Ok(self)
    }

    pub fn with_verifier(mut self, verifier: Box<dyn HardwareVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn setpoints(&self) -> &Setpoints {
        &self.setpoints
    }

    pub fn current_action(&self) -> Option<HeatpumpAction> {
        self.current_action
    }

    /// Merges `update` into the current setpoints. Nothing changes unless the
    /// merged band is complete and strictly ordered.
    pub fn set_setpoints(&mut self, update: &SetpointsUpdate) -> Result<&Setpoints> {
        self.setpoints = self.setpoints.merge(update)?;
        info!(setpoints = ?self.setpoints, "setpoints updated");
        Ok(&self.setpoints)
    }

    pub fn get_action(
        &self,
        temperature: f64,
        aux_heater: Option<&dyn AuxHeaterStatus>,
    ) -> Option<HeatpumpAction> {
        let heating = self.setpoints.heating();
        let cooling = self.setpoints.cooling();

        if let Some((_, cooling_start)) = cooling {
            if temperature > cooling_start {
                if aux_heater.is_some_and(|heater| heater.is_active()) {
                    debug!(temperature, "too hot, but the auxiliary heater is running");
                } else {
                    return Some(HeatpumpAction::StartCooling);
                }
            }
        }

        if let Some((heating_start, _)) = heating {
            if temperature < heating_start {
                return Some(HeatpumpAction::StartHeating);
            }
        }

        let shutdown = match (heating, cooling) {
            (Some((_, heating_stop)), Some((cooling_stop, _))) => {
                temperature > heating_stop && temperature < cooling_stop
            }
            (Some((_, heating_stop)), None) => temperature > heating_stop,
            (None, Some((cooling_stop, _))) => temperature < cooling_stop,
            (None, None) => false,
        };

        shutdown.then_some(HeatpumpAction::Shutdown)
    }

    pub fn send_command(&mut self, action: HeatpumpAction) -> Result<()> {
        if let Some(verifier) = self.verifier.as_mut() {
            verifier.arm()?;
        }

        self.sink.send(action)?;

        if let Some(verifier) = self.verifier.as_mut() {
            if !verifier.confirm()? {
                return Err(Error::HardwareIo(format!(
                    "no transmission observed after sending {}",
                    action.command()
                )));
            }
        }

        self.current_action = Some(action);
        Ok(())
    }

    pub fn self_test(&mut self) -> Result<()> {
        match self.verifier.as_mut() {
            Some(verifier) => verifier.self_test(),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn force_current_action(&mut self, action: Option<HeatpumpAction>) {
        self.current_action = action;
    }
}
