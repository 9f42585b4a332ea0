use std::{fs, path::PathBuf};

use tracing::warn;

/// Hot-junction temperature of the thermocouple on the gas heater flue.
pub enum Thermocouple {
    /// File holding the latest reading written by the I2C poller, either in
    /// °C or as the two raw register bytes (`0x01 0x90`).
    File(PathBuf),
    Simulated { tick: u64 },
}

impl Thermocouple {
    pub fn from_env() -> Self {
        match std::env::var("GAS_SENSOR_FILE") {
            Ok(path) => Self::File(PathBuf::from(path)),
            Err(_) => {
                warn!("GAS_SENSOR_FILE not set, using simulated thermocouple");
                Self::Simulated { tick: 0 }
            }
        }
    }

    pub fn read(&mut self) -> Option<f64> {
        match self {
            Self::File(path) => match fs::read_to_string(&*path) {
                Ok(raw) => parse_celsius(&raw),
                Err(err) => {
                    warn!("failed to read thermocouple file {}: {err}", path.display());
                    None
                }
            },
            Self::Simulated { tick } => {
                *tick = tick.wrapping_add(1);
                // Heater cycles on for a minute out of every three at 2 s reads.
                let burning = (*tick / 30) % 3 == 0;
                Some(if burning { 62.5 } else { 21.0 })
            }
        }
    }
}

fn parse_celsius(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some((msb, lsb)) = raw.split_once(char::is_whitespace) {
        return Some(hot_junction_celsius(parse_byte(msb)?, parse_byte(lsb.trim())?));
    }
    let value = raw.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

fn parse_byte(raw: &str) -> Option<u8> {
    u8::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}

/// Converts the MCP9600 hot-junction register (0x00) to °C.
pub fn hot_junction_celsius(msb: u8, lsb: u8) -> f64 {
    f64::from(i16::from_be_bytes([msb, lsb])) / 16.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trimmed_celsius() {
        assert_eq!(parse_celsius("64.25\n"), Some(64.25));
        assert_eq!(parse_celsius("0"), Some(0.0));
        assert_eq!(parse_celsius("NaN"), None);
        assert_eq!(parse_celsius(""), None);
        assert_eq!(parse_celsius("0x04 0x08\n"), Some(64.5));
        assert_eq!(parse_celsius("4 8"), None);
    }

    #[test]
    fn decodes_hot_junction_register() {
        assert_eq!(hot_junction_celsius(0x01, 0x90), 25.0);
        assert_eq!(hot_junction_celsius(0x04, 0x08), 64.5);
        assert_eq!(hot_junction_celsius(0xFF, 0xF0), -1.0);
    }

    #[test]
    fn simulated_heater_cycles() {
        let mut source = Thermocouple::Simulated { tick: 0 };
        let readings: Vec<f64> = (0..90).filter_map(|_| source.read()).collect();
        assert_eq!(readings.len(), 90);
        assert!(readings.contains(&62.5));
        assert!(readings.contains(&21.0));
    }
}
