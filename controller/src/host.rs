use std::{
    future::IntoFuture,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{
        mpsc::{self, error::TryRecvError},
        watch,
    },
};
use tracing::{debug, info, warn};

use heatpump_common::{
    ControlEvent, Controller, ControllerStatus, EnvironmentSensor, Error, GasHeater, Heatpump,
    RuntimeConfig, Sampler, SetpointsUpdate, ShadowClient, ShadowTopics, ShadowTransport,
};

use crate::{
    ir::{command_sink, SysfsLatchVerifier},
    sensor::{FileSensor, SimulatedSensor},
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 16 * 1024;

#[derive(Clone)]
struct AppState {
    events: mpsc::UnboundedSender<ControlEvent>,
    status: watch::Receiver<ControllerStatus>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Shadow topics the controller listens on.
#[derive(Debug, Clone)]
struct Subscriptions {
    own: ShadowTopics,
    gas_heater: ShadowTopics,
}

impl Subscriptions {
    fn topics(&self) -> [&str; 4] {
        [
            self.own.update_delta.as_str(),
            self.own.update_rejected.as_str(),
            self.gas_heater.update_accepted.as_str(),
            self.gas_heater.get_accepted.as_str(),
        ]
    }

    /// Maps an inbound publish onto a control loop event. Topics we do not
    /// act on yield `None`.
    fn route(&self, topic: &str, payload: &[u8]) -> anyhow::Result<Option<ControlEvent>> {
        if topic == self.own.update_rejected {
            return Ok(Some(ControlEvent::UpdateRejected));
        }

        let event = if topic == self.own.update_delta {
            ControlEvent::DesiredState(parse_document(topic, payload)?)
        } else if topic == self.gas_heater.update_accepted || topic == self.gas_heater.get_accepted
        {
            ControlEvent::GasHeaterReport(parse_document(topic, payload)?)
        } else {
            return Ok(None);
        };
        Ok(Some(event))
    }
}

/// Publishes through the MQTT client without blocking the control thread. A
/// full request queue counts as a timeout.
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
    let mut runtime = load_runtime_config(&config_path).await.unwrap_or_else(|err| {
        warn!(
            "failed to load runtime config from {}: {err:#}",
            config_path.display()
        );
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options =
        MqttOptions::new(runtime.controller.thing_name.clone(), mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(runtime.network.keep_alive_secs));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let subscriptions = Subscriptions {
        own: ShadowTopics::for_thing(&runtime.controller.thing_name),
        gas_heater: ShadowTopics::for_thing(&runtime.gas_heater.thing_name),
    };
    subscribe_topics(&mqtt, &subscriptions)
        .await
        .context("failed to subscribe to shadow topics")?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ControllerStatus::default());
    spawn_mqtt_loop(subscriptions, eventloop, events_tx.clone());

    let controller = build_controller(&runtime, mqtt)?;
    let sampler = Sampler::new(runtime.sampling.clone());
    let sensor = environment_sensor();
    let interval = Duration::from_millis(runtime.controller.sample_interval_ms);
    let control = tokio::task::spawn_blocking(move || {
        run_control_loop(controller, sampler, sensor, events_rx, status_tx, interval)
    });

    let app_state = AppState {
        events: events_tx,
        status: status_rx,
    };
    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/setpoints", put(handle_put_setpoints))
        .with_state(app_state);

    let port = std::env::var("HEATPUMP_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;
    info!("controller listening on http://{addr}");

    tokio::select! {
        served = axum::serve(listener, app).into_future() => served.context("http server failed")?,
        finished = control => finished.context("control loop panicked")??,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutting down");
        }
    }
    Ok(())
}

fn build_controller(runtime: &RuntimeConfig, mqtt: AsyncClient) -> anyhow::Result<Controller> {
    let mut heatpump = Heatpump::new(command_sink(&runtime.ir))
        .with_setpoints(runtime.setpoints)
        .context("invalid default setpoints")?;
    if let Some(latch) = &runtime.ir.latch {
        let verifier = SysfsLatchVerifier::open(latch).context("failed to open IR latch")?;
        heatpump = heatpump.with_verifier(Box::new(verifier));
    }

    let shadow = ShadowClient::new(
        runtime.controller.thing_name.clone(),
        Box::new(MqttTransport { client: mqtt }),
        Duration::from_millis(runtime.controller.publish_retry_delay_ms),
    );

    Ok(Controller::new(
        runtime.controller.clone(),
        heatpump,
        GasHeater::new(runtime.gas_heater.clone()),
        shadow,
    ))
}

fn environment_sensor() -> Box<dyn EnvironmentSensor> {
    match std::env::var("HEATPUMP_SENSOR_FILE") {
        Ok(path) => {
            info!("reading environment from {path}");
            Box::new(FileSensor::new(path))
        }
        Err(_) => {
            warn!("HEATPUMP_SENSOR_FILE not set, using simulated readings");
            Box::new(SimulatedSensor::default())
        }
    }
}

fn run_control_loop(
    mut controller: Controller,
    sampler: Sampler,
    mut sensor: Box<dyn EnvironmentSensor>,
    mut events: mpsc::UnboundedReceiver<ControlEvent>,
    status: watch::Sender<ControllerStatus>,
    interval: Duration,
) -> anyhow::Result<()> {
    controller
        .start()
        .context("heat pump hardware self test failed")?;
    status.send_replace(controller.status());

    loop {
        loop {
            match events.try_recv() {
                Ok(event) => controller.handle_event(event, now_ms()),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("event channel closed, stopping control loop");
                    return Ok(());
                }
            }
        }

        let reading = sampler.sample(sensor.as_mut());
        controller.run_cycle(reading, now_ms());
        status.send_replace(controller.status());

        thread::sleep(interval);
    }
}

async fn subscribe_topics(mqtt: &AsyncClient, subscriptions: &Subscriptions) -> anyhow::Result<()> {
    for topic in subscriptions.topics() {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(
    subscriptions: Subscriptions,
    mut eventloop: rumqttc::EventLoop,
    events: mpsc::UnboundedSender<ControlEvent>,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized MQTT payload on topic {} ({} bytes)",
                            message.topic,
                            message.payload.len()
                        );
                        continue;
                    }
                    match subscriptions.route(&message.topic, &message.payload) {
                        Ok(Some(event)) => {
                            if events.send(event).is_err() {
                                warn!("control loop is gone, stopping mqtt loop");
                                return;
                            }
                        }
                        Ok(None) => debug!("ignoring message on {}", message.topic),
                        Err(err) => warn!("mqtt message handling error: {err:#}"),
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.borrow().clone();
    Json(status)
}

async fn handle_put_setpoints(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    if !body.is_object() {
        return error_response(StatusCode::BAD_REQUEST, "Expected a JSON object");
    }
    if let Err(err) = serde_json::from_value::<SetpointsUpdate>(body.clone()) {
        return error_response(StatusCode::BAD_REQUEST, &format!("Invalid setpoints: {err}"));
    }

    let event = ControlEvent::DesiredState(json!({ "state": body }));
    if state.events.send(event).is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Control loop is not running");
    }
    StatusCode::ACCEPTED.into_response()
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn parse_document(topic: &str, payload: &[u8]) -> anyhow::Result<Value> {
    serde_json::from_slice(payload).with_context(|| format!("invalid JSON on {topic}"))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn subscriptions() -> Subscriptions {
        Subscriptions {
            own: ShadowTopics::for_thing("lounge-heatpump"),
            gas_heater: ShadowTopics::for_thing("gas-heater"),
        }
    }

    fn app_state() -> (AppState, mpsc::UnboundedReceiver<ControlEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (_status_tx, status) = watch::channel(ControllerStatus::default());
        (AppState { events, status }, events_rx)
    }

    #[test]
    fn delta_becomes_desired_state() {
        let event = subscriptions()
            .route(
                "$aws/things/lounge-heatpump/shadow/update/delta",
                br#"{"state":{"heating_start":15},"version":3}"#,
            )
            .unwrap();

        assert_eq!(
            event,
            Some(ControlEvent::DesiredState(
                json!({ "state": { "heating_start": 15 }, "version": 3 })
            ))
        );
    }

    #[test]
    fn rejection_ignores_payload() {
        let event = subscriptions()
            .route("$aws/things/lounge-heatpump/shadow/update/rejected", b"not json")
            .unwrap();
        assert_eq!(event, Some(ControlEvent::UpdateRejected));
    }

    #[test]
    fn gas_heater_documents_are_forwarded() {
        let subscriptions = subscriptions();
        for topic in [
            "$aws/things/gas-heater/shadow/update/accepted",
            "$aws/things/gas-heater/shadow/get/accepted",
        ] {
            let event = subscriptions
                .route(topic, br#"{"state":{"reported":{"temperature":55.5}}}"#)
                .unwrap();
            assert_eq!(
                event,
                Some(ControlEvent::GasHeaterReport(
                    json!({ "state": { "reported": { "temperature": 55.5 } } })
                ))
            );
        }
    }

    #[test]
    fn unknown_topics_and_bad_json() {
        let subscriptions = subscriptions();
        assert_eq!(
            subscriptions
                .route("$aws/things/other/shadow/update/delta", b"{}")
                .unwrap(),
            None
        );
        assert!(subscriptions
            .route("$aws/things/lounge-heatpump/shadow/update/delta", b"{")
            .is_err());
    }

    #[test]
    fn subscribes_to_own_and_gas_heater_topics() {
        assert_eq!(
            subscriptions().topics(),
            [
                "$aws/things/lounge-heatpump/shadow/update/delta",
                "$aws/things/lounge-heatpump/shadow/update/rejected",
                "$aws/things/gas-heater/shadow/update/accepted",
                "$aws/things/gas-heater/shadow/get/accepted",
            ]
        );
    }

    #[tokio::test]
    async fn setpoints_are_queued_for_the_loop() {
        let (state, mut events) = app_state();

        let response =
            handle_put_setpoints(State(state), Json(json!({ "cooling_start": 25.5 }))).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            events.try_recv().unwrap(),
            ControlEvent::DesiredState(json!({ "state": { "cooling_start": 25.5 } }))
        );
    }

    #[tokio::test]
    async fn malformed_setpoints_are_rejected() {
        let (state, mut events) = app_state();

        let response = handle_put_setpoints(
            State(state.clone()),
            Json(json!({ "heating_start": "warm" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handle_put_setpoints(State(state), Json(json!([16, 18]))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_config_file_yields_defaults() {
        let config = load_runtime_config(Path::new("/nonexistent/heatpump/runtime.json"))
            .await
            .unwrap();
        assert_eq!(config.controller.thing_name, "heatpump-controller");
    }
}
