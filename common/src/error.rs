use thiserror::Error;

use crate::setpoints::SetpointKey;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value {0}: readings must be finite numbers")]
    InvalidValue(f64),

    #[error("{0} needs to be set")]
    MissingSetpoint(SetpointKey),

    #[error("{lower} needs to be less than {upper}")]
    SetpointOrder {
        lower: SetpointKey,
        upper: SetpointKey,
    },

    #[error("hardware io error: {0}")]
    HardwareIo(String),

    #[error("publish to {topic} timed out")]
    PublishTimeout { topic: String },

    #[error("invalid shadow payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
