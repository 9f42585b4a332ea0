use crate::{
    data_item::DataItem,
    error::Result,
    heatpump::HeatpumpAction,
    sampling::Reading,
};

/// What the controller last told the shadow service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledState {
    temperature: Option<DataItem>,
    humidity: Option<DataItem>,
    function: Option<HeatpumpAction>,
}

impl ReconciledState {
    pub fn temperature(&self) -> Option<&DataItem> {
        self.temperature.as_ref()
    }

    pub fn humidity(&self) -> Option<&DataItem> {
        self.humidity.as_ref()
    }

    pub fn function(&self) -> Option<HeatpumpAction> {
        self.function
    }

    pub fn set_function(&mut self, function: HeatpumpAction) {
        self.function = Some(function);
    }

    pub fn set_temperature(&mut self, temperature: f64, now_ms: u64) -> Result<()> {
        upsert(&mut self.temperature, temperature, now_ms)
    }

    pub fn set_humidity(&mut self, humidity: f64, now_ms: u64) -> Result<()> {
        upsert(&mut self.humidity, humidity, now_ms)
    }

    /// Oldest update among the held dimensions.
    pub fn last_update_ms(&self) -> Option<u64> {
        let temperature = self.temperature.as_ref().map(DataItem::last_update_ms);
        let humidity = self.humidity.as_ref().map(DataItem::last_update_ms);
        match (temperature, humidity) {
            (Some(t), Some(h)) => Some(t.min(h)),
            (t, h) => t.or(h),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fields of `sample` that moved at least `threshold` away from the held
    /// values. With nothing held the whole sample is returned.
    pub fn compute_delta(&self, sample: &Reading, threshold: f64) -> Reading {
        if self.temperature.is_none() && self.humidity.is_none() {
            return *sample;
        }

        Reading {
            temperature: changed(self.temperature.as_ref(), sample.temperature, threshold),
            humidity: changed(self.humidity.as_ref(), sample.humidity, threshold),
        }
    }

    /// Chooses the payload to report for `sample` and adopts it as the held
    /// state. A full sample is reported when nothing has been reported yet or
    /// the oldest held value is older than `resync_interval_ms`.
    pub fn plan_report(
        &mut self,
        sample: &Reading,
        now_ms: u64,
        resync_interval_ms: u64,
        threshold: f64,
    ) -> Result<Reading> {
        let delta = self.compute_delta(sample, threshold);
        let resync = match self.last_update_ms() {
            None => true,
            Some(last) => now_ms > last.saturating_add(resync_interval_ms),
        };
        let report = if resync { *sample } else { delta };

        if let Some(temperature) = report.temperature {
            self.set_temperature(temperature, now_ms)?;
        }
        if let Some(humidity) = report.humidity {
            self.set_humidity(humidity, now_ms)?;
        }

        Ok(report)
    }
}

fn upsert(slot: &mut Option<DataItem>, value: f64, now_ms: u64) -> Result<()> {
    match slot {
        Some(item) => item.set_value(value, now_ms),
        None => {
            *slot = Some(DataItem::new(value, now_ms)?);
            Ok(())
        }
    }
}

fn changed(held: Option<&DataItem>, value: Option<f64>, threshold: f64) -> Option<f64> {
    let value = value?;
    match held {
        Some(item) if (item.value() - value).abs() < threshold => None,
        _ => Some(value),
    }
}
