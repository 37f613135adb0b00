// src/config.rs
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::alert::{PhaseSchedule, PhaseTiming};
use crate::drivers::{BandLayout, IngestMode, PipelineError, WindowFunction};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Pause before polling again after a connection error.
    pub reconnect_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".into(),
            port: 1883,
            topic: "eeg/data".into(),
            client_id: "neuro-alert".into(),
            keep_alive_secs: 30,
            reconnect_delay_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub window_size: usize,
    pub sample_rate_hz: f64,
    pub window_function: WindowFunction,
    pub bands: BandLayout,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window_size: 512,
            sample_rate_hz: 250.0,
            window_function: WindowFunction::Rectangular,
            bands: BandLayout::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5_000,
        }
    }
}

/// Everything tunable. Every section falls back to its defaults when absent.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub ingest: IngestMode,
    pub signal: SignalConfig,
    pub schedule: PhaseTiming,
    /// Cadence of the phase/dashboard tick.
    pub tick_ms: u64,
    pub webhook: WebhookConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            ingest: IngestMode::default(),
            signal: SignalConfig::default(),
            schedule: PhaseTiming::default(),
            tick_ms: 600,
            webhook: WebhookConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn phase_schedule(&self) -> Result<PhaseSchedule, PipelineError> {
        PhaseSchedule::timeline(&self.schedule)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.signal.window_size == 0 {
            return Err(PipelineError::InvalidWindowSize);
        }
        if !(self.signal.sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidSampleRate);
        }
        self.signal.bands.validate()?;
        if self.tick_ms == 0 {
            return Err(PipelineError::InvalidSchedule(
                "tick cadence must be positive".into(),
            ));
        }
        self.phase_schedule()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::bands::BandRange;
    use crate::drivers::Band;

    #[test]
    fn defaults_match_reference_timeline() {
        let config = AppConfig::default();
        assert_eq!(config.signal.window_size, 512);
        assert_eq!(config.signal.sample_rate_hz, 250.0);
        assert_eq!(config.tick(), Duration::from_millis(600));
        assert_eq!(config.schedule.seizure_start_ms, 15_000);
        assert_eq!(config.schedule.recovery_start(), Duration::from_millis(65_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            tick_ms = 250

            [broker]
            topic = "neuroNexus/eeg"

            [ingest]
            kind = "pre_banded"

            [signal]
            window_function = "hann"

            [signal.bands]
            gamma = { low_hz = 30.0, high_hz = 80.0 }

            [schedule]
            seizure_start_ms = 1000
            stress_beta_fraction = 0.4

            [webhook]
            url = "http://localhost:5678/webhook/eeg"
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_ms, 250);
        assert_eq!(config.broker.topic, "neuroNexus/eeg");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.ingest, IngestMode::PreBanded);
        assert_eq!(config.signal.window_function, WindowFunction::Hann);
        assert_eq!(config.signal.bands.range(Band::Gamma), BandRange::new(30.0, 80.0));
        assert_eq!(config.signal.bands.range(Band::Delta), BandRange::new(0.5, 4.0));
        assert_eq!(config.schedule.seizure_start_ms, 1000);
        assert_eq!(config.schedule.seizure_duration_ms, 20_000);
        assert_eq!(config.schedule.stress_beta_fraction, Some(0.4));
        assert!(config.webhook.url.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = AppConfig::default();
        config.signal.sample_rate_hz = 0.0;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidSampleRate)));

        let mut config = AppConfig::default();
        config.tick_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.signal.bands.alpha = BandRange::new(13.0, 8.0);
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidBandRange { band: Band::Alpha, .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/neuro-alert.toml"))).is_err());
        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    }
}
