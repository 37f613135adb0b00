use std::future::Future;
use serde::Deserialize;
use serde_json::Value;
use crate::drivers::{Band, PipelineError};
/// How telemetry messages are interpreted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestMode {
    /// One raw sample per message, read from `field`.
    SingleChannel { field: String },
    /// Five band energies per message; skips windowing and the FFT.
    PreBanded,
}
impl IngestMode {
    pub fn default_field() -> &'static str {
        "channel1"
    }
}
impl Default for IngestMode {
    fn default() -> Self {
        IngestMode::SingleChannel {
            field: Self::default_field().to_owned(),
        }
    }
}
/// A decoded telemetry message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Telemetry {
    Sample(f64),
    Bands([f64; 5]),
}
pub fn decode_payload(payload: &[u8], mode: &IngestMode) -> Result<Telemetry, PipelineError> {
    let value: Value = serde_json::from_slice(payload)?;
    let object = value.as_object().ok_or(PipelineError::NotAnObject)?;
    let field = |name: &str| -> Result<f64, PipelineError> {
        let raw = object
            .get(name)
            .ok_or_else(|| PipelineError::MissingField(name.to_owned()))?;
        numeric(name, raw)
    };
    match mode {
        IngestMode::SingleChannel { field: name } => Ok(Telemetry::Sample(field(name)?)),
        IngestMode::PreBanded => {
            let mut energies = [0.0f64; 5];
            for (slot, band) in energies.iter_mut().zip(Band::ALL) {
                let value = field(band.name())?;
                if value < 0.0 {
                    return Err(PipelineError::NegativeBand { band, value });
                }
                *slot = value;
            }
            Ok(Telemetry::Bands(energies))
        }
    }
}
// Generators publish both plain numbers and `"0.53"` style strings.
fn numeric(name: &str, raw: &Value) -> Result<f64, PipelineError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(PipelineError::NonNumeric {
            field: name.to_owned(),
            raw: raw.to_string(),
        }),
    }
}
/// Something that yields raw telemetry payloads until it runs dry.
pub trait TelemetrySource: Send + 'static {
    /// Next raw payload; `None` once the source is exhausted.
    fn next_payload(&mut self) -> impl Future<Output = Option<Vec<u8>>> + Send;
    /// Releases the underlying connection.
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
/// In-memory source replaying a fixed list of payloads.
#[cfg(test)]
pub struct ManualSource {
    queue: std::collections::VecDeque<Vec<u8>>,
}
#[cfg(test)]
impl ManualSource {
    pub fn new(payloads: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            queue: payloads.into_iter().collect(),
        }
    }
}
#[cfg(test)]
impl TelemetrySource for ManualSource {
    async fn next_payload(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }
}
