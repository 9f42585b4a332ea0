use std::{thread, time::Duration};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Device shadow topics for one thing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopics {
    pub update: String,
    pub update_accepted: String,
    pub update_rejected: String,
    pub update_delta: String,
    pub update_documents: String,
    pub get: String,
    pub get_accepted: String,
    pub get_rejected: String,
}

impl ShadowTopics {
    pub fn for_thing(thing_name: &str) -> Self {
        let prefix = format!("$aws/things/{thing_name}/shadow");
        Self {
            update: format!("{prefix}/update"),
            update_accepted: format!("{prefix}/update/accepted"),
            update_rejected: format!("{prefix}/update/rejected"),
            update_delta: format!("{prefix}/update/delta"),
            update_documents: format!("{prefix}/update/documents"),
            get: format!("{prefix}/get"),
            get_accepted: format!("{prefix}/get/accepted"),
            get_rejected: format!("{prefix}/get/rejected"),
        }
    }
}

/// Hands a payload to the broker. A transient failure is reported as
/// [`Error::PublishTimeout`].
pub trait ShadowTransport: Send {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// Frames reported state as shadow documents for a single thing.
pub struct ShadowClient {
    thing_name: String,
    topics: ShadowTopics,
    transport: Box<dyn ShadowTransport>,
    retry_delay: Duration,
}

impl ShadowClient {
    pub fn new(
        thing_name: impl Into<String>,
        transport: Box<dyn ShadowTransport>,
        retry_delay: Duration,
    ) -> Self {
        let thing_name = thing_name.into();
        Self {
            topics: ShadowTopics::for_thing(&thing_name),
            thing_name,
            transport,
            retry_delay,
        }
    }

    pub fn thing_name(&self) -> &str {
        &self.thing_name
    }

    pub fn topics(&self) -> &ShadowTopics {
        &self.topics
    }

    /// Publishes `{"state": {"reported": reported}}` on the update topic, with
    /// the originating thing added to the reported object.
    pub fn publish_reported<T: Serialize>(&mut self, reported: &T) -> Result<()> {
        let mut reported = serde_json::to_value(reported)?;
        if let Value::Object(fields) = &mut reported {
            fields.insert("thing".to_string(), Value::String(self.thing_name.clone()));
        }

        let document = json!({ "state": { "reported": reported } });
        debug!(%document, "publishing reported state");
        let payload = serde_json::to_vec(&document)?;
        let topic = self.topics.update.clone();
        self.publish_with_retry(&topic, &payload)
    }

    pub fn publish_raw(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.publish_with_retry(topic, payload)
    }

    fn publish_with_retry(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        match self.transport.publish(topic, payload) {
            Err(Error::PublishTimeout { .. }) => {
                warn!(
                    "publish to {topic} timed out, retrying in {:?}",
                    self.retry_delay
                );
                thread::sleep(self.retry_delay);
                self.transport.publish(topic, payload)
            }
            other => other,
        }
    }
}

/// The `state` object of an inbound shadow document.
pub fn document_state(document: &Value) -> Option<&Value> {
    document.get("state").filter(|state| state.is_object())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::RecordingTransport;

    fn client(transport: &RecordingTransport) -> ShadowClient {
        ShadowClient::new("lounge-heatpump", Box::new(transport.clone()), Duration::ZERO)
    }

    #[test]
    fn topics_follow_shadow_layout() {
        let topics = ShadowTopics::for_thing("gas-heater");
        assert_eq!(topics.update, "$aws/things/gas-heater/shadow/update");
        assert_eq!(topics.update_delta, "$aws/things/gas-heater/shadow/update/delta");
        assert_eq!(
            topics.update_rejected,
            "$aws/things/gas-heater/shadow/update/rejected"
        );
        assert_eq!(topics.get_accepted, "$aws/things/gas-heater/shadow/get/accepted");
    }

    #[test]
    fn reported_documents_carry_thing_tag() {
        let transport = RecordingTransport::default();
        let mut client = client(&transport);

        client
            .publish_reported(&json!({ "function": "heating" }))
            .unwrap();

        let raw = transport.raw();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].0, "$aws/things/lounge-heatpump/shadow/update");
        assert_eq!(
            transport.documents(),
            vec![json!({
                "state": { "reported": { "function": "heating", "thing": "lounge-heatpump" } }
            })]
        );
    }

    #[test]
    fn timeout_is_retried_once() {
        let transport = RecordingTransport::default();
        transport.fail_next(1);
        let mut client = client(&transport);

        client.publish_reported(&json!({ "humidity": 40.0 })).unwrap();

        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.documents().len(), 1);
    }

    #[test]
    fn second_timeout_is_returned() {
        let transport = RecordingTransport::default();
        transport.fail_next(2);
        let mut client = client(&transport);

        let err = client.publish_raw("$aws/things/x/shadow/get", b"").unwrap_err();

        assert!(matches!(err, Error::PublishTimeout { .. }));
        assert_eq!(transport.attempts(), 2);
        assert!(transport.raw().is_empty());
    }

    #[test]
    fn document_state_requires_object() {
        assert!(document_state(&json!({ "state": { "heating_start": 15 } })).is_some());
        assert!(document_state(&json!({ "state": 3 })).is_none());
        assert!(document_state(&json!({ "version": 3 })).is_none());
    }
}
