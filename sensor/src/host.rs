use std::{io::ErrorKind, path::PathBuf, thread, time::Duration};

use anyhow::Context;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::json;
use tracing::{debug, info, warn};

use heatpump_common::{Error, RuntimeConfig, ShadowClient, ShadowTransport, ThermocoupleReporter};

use crate::thermocouple::Thermocouple;

struct MqttTransport {
    client: AsyncClient,
}

impl ShadowTransport for MqttTransport {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> heatpump_common::Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|err| {
                debug!("mqtt publish failed: {err}");
                Error::PublishTimeout {
                    topic: topic.to_string(),
                }
            })
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("HEATPUMP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.heatpump/runtime.json"));
    let mut runtime = match tokio::fs::read(&config_path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).unwrap_or_else(|err| {
            warn!("invalid runtime config {}: {err}", config_path.display());
            RuntimeConfig::default()
        }),
        Err(err) => {
            if err.kind() != ErrorKind::NotFound {
                warn!("failed to read runtime config {}: {err}", config_path.display());
            }
            RuntimeConfig::default()
        }
    };
    runtime.sanitize();
    let gas_heater = runtime.gas_heater.clone();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new(gas_heater.thing_name.clone(), mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(runtime.network.keep_alive_secs));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("mqtt connected"),
                Ok(_) => {}
                Err(err) => {
                    warn!("gas sensor mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let shadow = ShadowClient::new(
        gas_heater.thing_name.clone(),
        Box::new(MqttTransport { client: mqtt }),
        Duration::from_millis(runtime.controller.publish_retry_delay_ms),
    );
    let reporter = ThermocoupleReporter::new(runtime.controller.resync_interval_ms);
    let interval = Duration::from_millis(gas_heater.sample_interval_ms);

    info!("gas sensor publisher started for {}", gas_heater.thing_name);
    let reporting = tokio::task::spawn_blocking(move || {
        run_reporter_loop(shadow, reporter, Thermocouple::from_env(), interval)
    });

    tokio::select! {
        finished = reporting => finished.context("reporter loop panicked")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutting down");
        }
    }
    Ok(())
}

fn run_reporter_loop(
    mut shadow: ShadowClient,
    mut reporter: ThermocoupleReporter,
    mut thermocouple: Thermocouple,
    interval: Duration,
) {
    loop {
        if let Some(temperature) = thermocouple.read() {
            report(&mut shadow, &mut reporter, temperature, now_ms());
        } else {
            debug!("no thermocouple reading");
        }
        thread::sleep(interval);
    }
}

/// Publishes `temperature` when the reporter asks for it.
fn report(
    shadow: &mut ShadowClient,
    reporter: &mut ThermocoupleReporter,
    temperature: f64,
    now_ms: u64,
) -> bool {
    let temperature = match reporter.observe(temperature, now_ms) {
        Ok(Some(temperature)) => temperature,
        Ok(None) => return false,
        Err(err) => {
            warn!("discarding thermocouple reading: {err}");
            return false;
        }
    };

    match shadow.publish_reported(&json!({ "temperature": temperature })) {
        Ok(()) => true,
        Err(err) => {
            warn!("publish timeout: {err}");
            false
        }
    }
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
