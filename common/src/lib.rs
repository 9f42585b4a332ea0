pub mod config;
pub mod controller;
pub mod data_item;
pub mod error;
pub mod gas;
pub mod heatpump;
pub mod sampling;
pub mod setpoints;
pub mod shadow;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{
    ControllerConfig, GasHeaterConfig, IrConfig, LatchConfig, NetworkConfig, RuntimeConfig,
    SamplingConfig,
};
pub use controller::Controller;
pub use data_item::{DataItem, Trend};
pub use error::{Error, Result};
pub use gas::{GasHeater, ThermocoupleReporter};
pub use heatpump::{AuxHeaterStatus, CommandSink, HardwareVerifier, Heatpump, HeatpumpAction};
pub use sampling::{EnvironmentSensor, Reading, Sample, Sampler};
pub use setpoints::{SetpointKey, Setpoints, SetpointsUpdate};
pub use shadow::{document_state, ShadowClient, ShadowTopics, ShadowTransport};
pub use state::ReconciledState;
pub use types::{ControlEvent, ControllerStatus};
