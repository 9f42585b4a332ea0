use serde::{Deserialize, Serialize};

use crate::setpoints::Setpoints;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub thing_name: String,
    pub sample_interval_ms: u64,
    pub resync_interval_ms: u64,
    pub delta_threshold: f64,
    pub noise_band: f64,
    pub publish_retry_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            thing_name: "heatpump-controller".to_string(),
            sample_interval_ms: 2_000,
            resync_interval_ms: 60_000,
            delta_threshold: 0.2,
            noise_band: 0.2,
            publish_retry_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub min_samples: usize,
    pub max_attempts: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasHeaterConfig {
    pub thing_name: String,
    pub active_temp_c: f64,
    pub stale_after_ms: u64,
    pub sample_interval_ms: u64,
}

impl Default for GasHeaterConfig {
    fn default() -> Self {
        Self {
            thing_name: "gas-heater".to_string(),
            active_temp_c: 40.0,
            stale_after_ms: 300_000,
            sample_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub keep_alive_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IrConfig {
    /// Remote name in the LIRC configuration.
    pub remote: String,
    /// Log commands instead of invoking `irsend`.
    pub dry_run: bool,
    /// Transmission latch wired to the IR LED line, if fitted.
    #[serde(default)]
    pub latch: Option<LatchConfig>,
}

impl Default for IrConfig {
    fn default() -> Self {
        Self {
            remote: "heat_pump".to_string(),
            dry_run: true,
            latch: None,
        }
    }
}

/// BCM pin numbers of a 74HC373 latch: latch enable, D0 and Q0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LatchConfig {
    pub le_pin: u32,
    pub d0_pin: u32,
    pub q0_pin: u32,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
}

fn default_gpio_root() -> String {
    "/sys/class/gpio".to_string()
}

fn default_pulse_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub sampling: SamplingConfig,
    pub setpoints: Setpoints,
    #[serde(default)]
    pub gas_heater: GasHeaterConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub ir: IrConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            sampling: SamplingConfig::default(),
            setpoints: Setpoints::new(16.0, 18.0, 22.0, 24.0),
            gas_heater: GasHeaterConfig::default(),
            network: NetworkConfig::default(),
            ir: IrConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.controller.sanitize();
        self.sampling.sanitize();
        self.gas_heater.sanitize();
        self.network.sanitize();

        if self.setpoints.validate().is_err() {
            self.setpoints = RuntimeConfig::default().setpoints;
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        if self.thing_name.trim().is_empty() {
            self.thing_name = ControllerConfig::default().thing_name;
        }
        self.sample_interval_ms = self.sample_interval_ms.clamp(500, 60_000);
        self.resync_interval_ms = self.resync_interval_ms.max(self.sample_interval_ms);
        if !self.delta_threshold.is_finite() || self.delta_threshold < 0.0 {
            self.delta_threshold = 0.2;
        }
        if !self.noise_band.is_finite() || self.noise_band < 0.0 {
            self.noise_band = 0.2;
        }
        self.publish_retry_delay_ms = self.publish_retry_delay_ms.min(30_000);
    }
}

impl SamplingConfig {
    pub fn sanitize(&mut self) {
        self.min_samples = self.min_samples.clamp(1, 20);
        self.max_attempts = self.max_attempts.max(self.min_samples as u32);
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        if self.mqtt_port == 0 {
            self.mqtt_port = 1883;
        }
        self.keep_alive_secs = self.keep_alive_secs.clamp(5, 3_600);
    }
}

impl GasHeaterConfig {
    pub fn sanitize(&mut self) {
        if self.thing_name.trim().is_empty() {
            self.thing_name = GasHeaterConfig::default().thing_name;
        }
        if !self.active_temp_c.is_finite() {
            self.active_temp_c = 40.0;
        }
        self.sample_interval_ms = self.sample_interval_ms.clamp(500, 60_000);
    }
}
