//! Recording doubles for the controller's hardware and network seams.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::{
    error::{Error, Result},
    heatpump::{CommandSink, HardwareVerifier, HeatpumpAction},
    sampling::{EnvironmentSensor, Reading},
    shadow::ShadowTransport,
};

#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    sent: Arc<Mutex<Vec<HeatpumpAction>>>,
    fail: bool,
}

impl RecordingSink {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<HeatpumpAction> {
        self.sent.lock().unwrap().clone()
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, action: HeatpumpAction) -> Result<()> {
        if self.fail {
            return Err(Error::HardwareIo("irsend exited with status 1".to_string()));
        }
        self.sent.lock().unwrap().push(action);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeVerifier {
    observes: bool,
    armed: Arc<Mutex<u32>>,
    self_tests: Arc<Mutex<u32>>,
}

impl FakeVerifier {
    pub(crate) fn observing() -> Self {
        Self {
            observes: true,
            ..Self::default()
        }
    }

    pub(crate) fn silent() -> Self {
        Self::default()
    }

    pub(crate) fn armed(&self) -> u32 {
        *self.armed.lock().unwrap()
    }

    pub(crate) fn self_tests(&self) -> u32 {
        *self.self_tests.lock().unwrap()
    }
}

impl HardwareVerifier for FakeVerifier {
    fn self_test(&mut self) -> Result<()> {
        *self.self_tests.lock().unwrap() += 1;
        if self.observes {
            Ok(())
        } else {
            Err(Error::HardwareIo("latch did not go high".to_string()))
        }
    }

    fn arm(&mut self) -> Result<()> {
        *self.armed.lock().unwrap() += 1;
        Ok(())
    }

    fn confirm(&mut self) -> Result<bool> {
        Ok(self.observes)
    }
}

/// Records every publish attempt; the first `failures` attempts time out.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    attempts: Arc<Mutex<u32>>,
    failures: Arc<Mutex<u32>>,
}

impl RecordingTransport {
    pub(crate) fn fail_next(&self, failures: u32) {
        *self.failures.lock().unwrap() = failures;
    }

    pub(crate) fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }

    pub(crate) fn raw(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    /// Parsed JSON documents, in publish order.
    pub(crate) fn documents(&self) -> Vec<Value> {
        self.raw()
            .iter()
            .filter_map(|(_, payload)| serde_json::from_slice(payload).ok())
            .collect()
    }

    /// The `state.reported` objects of every JSON document.
    pub(crate) fn reported(&self) -> Vec<Value> {
        self.documents()
            .into_iter()
            .map(|document| document["state"]["reported"].clone())
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.published.lock().unwrap().clear();
        *self.attempts.lock().unwrap() = 0;
    }
}

impl ShadowTransport for RecordingTransport {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;

        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(Error::PublishTimeout {
                topic: topic.to_string(),
            });
        }

        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// Replays a fixed script of raw sensor readings, then reports nothing.
pub(crate) struct ScriptedSensor {
    readings: VecDeque<Reading>,
    pub(crate) reads: u32,
}

impl ScriptedSensor {
    pub(crate) fn new(readings: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            reads: 0,
        }
    }
}

impl EnvironmentSensor for ScriptedSensor {
    fn read(&mut self) -> Reading {
        self.reads += 1;
        self.readings.pop_front().unwrap_or_default()
    }
}
