use thiserror::Error;
use crate::drivers::Band;
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("window size must be greater than zero")]
    InvalidWindowSize,
    #[error("window length mismatch: expected {expected}, got {actual}")]
    WindowLength { expected: usize, actual: usize },
    #[error("band {band} has an empty or inverted range [{low_hz}, {high_hz})")]
    InvalidBandRange { band: Band, low_hz: f64, high_hz: f64 },
    #[error("phase schedule is invalid: {0}")]
    InvalidSchedule(String),
    #[error("malformed telemetry payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("telemetry payload is not a JSON object")]
    NotAnObject,
    #[error("telemetry field `{0}` is missing")]
    MissingField(String),
    #[error("telemetry field `{field}` is not a finite number: {raw}")]
    NonNumeric { field: String, raw: String },
    #[error("band energy for {band} is negative: {value}")]
    NegativeBand { band: Band, value: f64 },
}
