// src/simulator.rs
//! Synthetic EEG telemetry that follows the scripted seizure/stress timeline.
//! Used by the `simulate` command (published over MQTT) and by offline runs.

use std::f64::consts::PI;
use std::future::Future;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rumqttc::QoS;
use serde_json::{json, Map, Value};
use tokio::time::{Instant, MissedTickBehavior};

use crate::alert::{AlertPhase, PhaseTiming};
use crate::config::AppConfig;
use crate::drivers::{Band, IngestMode, TelemetrySource};
use crate::mqtt;

const NOISE: f64 = 0.05;

/// Upper bounds of the uniform draw for each band, plus a floor for the
/// band that dominates the phase.
struct BandProfile {
    spread: [f64; 5],
    floor: [f64; 5],
}

fn profile(phase: AlertPhase) -> BandProfile {
    match phase {
        AlertPhase::Normal => BandProfile {
            spread: [1.0, 1.0, 1.2, 1.5, 1.0],
            floor: [0.0; 5],
        },
        AlertPhase::Seizure => BandProfile {
            spread: [0.8, 1.0, 0.6, 2.0, 2.0],
            floor: [0.0, 0.0, 0.0, 0.0, 5.0],
        },
        AlertPhase::Stress => BandProfile {
            spread: [0.5, 0.8, 0.7, 1.5, 0.8],
            floor: [0.0, 0.0, 0.0, 4.0, 0.0],
        },
        // the generator has no cooldown profile; it reuses recovery
        AlertPhase::Cooldown | AlertPhase::Recovery => BandProfile {
            spread: [0.8, 0.9, 0.8, 0.8, 0.6],
            floor: [0.0, 0.0, 1.5, 0.0, 0.0],
        },
    }
}

/// (frequency Hz, amplitude) components of the raw signal per phase.
fn tones(phase: AlertPhase) -> &'static [(f64, f64)] {
    match phase {
        AlertPhase::Normal => &[(10.0, 1.0), (20.0, 0.8), (6.0, 0.4)],
        AlertPhase::Seizure => &[(40.0, 5.0), (20.0, 0.5)],
        AlertPhase::Stress => &[(20.0, 4.0), (10.0, 0.5)],
        AlertPhase::Cooldown | AlertPhase::Recovery => &[(10.0, 2.0), (5.0, 0.3)],
    }
}

pub struct SyntheticGenerator {
    mode: IngestMode,
    timing: PhaseTiming,
    sample_rate_hz: f64,
    rng: StdRng,
    sample_index: u64,
}

impl SyntheticGenerator {
    pub fn new(config: &AppConfig, rng: StdRng) -> Self {
        Self {
            mode: config.ingest.clone(),
            timing: config.schedule.clone(),
            sample_rate_hz: config.signal.sample_rate_hz,
            rng,
            sample_index: 0,
        }
    }

    /// One message per second for band energies, one per sample period otherwise.
    pub fn cadence(&self) -> Duration {
        match self.mode {
            IngestMode::PreBanded => Duration::from_secs(1),
            IngestMode::SingleChannel { .. } => Duration::from_secs_f64(1.0 / self.sample_rate_hz),
        }
    }

    pub fn phase_at(&self, elapsed: Duration) -> AlertPhase {
        self.timing.phase_at(elapsed)
    }

    /// Band energies rounded to two decimals.
    pub fn band_energies(&mut self, phase: AlertPhase) -> [f64; 5] {
        let p = profile(phase);
        let mut energies = [0.0; 5];
        for (i, slot) in energies.iter_mut().enumerate() {
            let v = p.floor[i] + self.rng.gen::<f64>() * p.spread[i];
            *slot = (v * 100.0).round() / 100.0;
        }
        energies
    }

    pub fn raw_sample(&mut self, phase: AlertPhase) -> f64 {
        let t = self.sample_index as f64 / self.sample_rate_hz;
        self.sample_index += 1;
        let signal: f64 = tones(phase)
            .iter()
            .map(|&(freq, amp)| amp * (2.0 * PI * freq * t).sin())
            .sum();
        signal + self.rng.gen_range(-NOISE..NOISE)
    }

    pub fn payload(&mut self, elapsed: Duration) -> Vec<u8> {
        let phase = self.phase_at(elapsed);
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut body = Map::new();
        match self.mode.clone() {
            IngestMode::PreBanded => {
                let energies = self.band_energies(phase);
                for (band, value) in Band::ALL.into_iter().zip(energies) {
                    body.insert(band.name().to_owned(), Value::String(format!("{value:.2}")));
                }
            }
            IngestMode::SingleChannel { field } => {
                body.insert(field, json!(self.raw_sample(phase)));
            }
        }
        body.insert("timestamp".to_owned(), Value::String(timestamp));
        Value::Object(body).to_string().into_bytes()
    }
}

/// In-process generator paced by a tokio interval.
pub struct SyntheticSource {
    generator: SyntheticGenerator,
    interval: tokio::time::Interval,
    started: Instant,
}

impl SyntheticSource {
    pub fn new(config: &AppConfig, rng: StdRng) -> Self {
        let generator = SyntheticGenerator::new(config, rng);
        let mut interval = tokio::time::interval(generator.cadence());
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Self {
            generator,
            interval,
            started: Instant::now(),
        }
    }
}

impl TelemetrySource for SyntheticSource {
    async fn next_payload(&mut self) -> Option<Vec<u8>> {
        self.interval.tick().await;
        Some(self.generator.payload(self.started.elapsed()))
    }
}

/// Publishes synthetic telemetry to the configured topic until `shutdown` resolves.
pub async fn publish(
    config: &AppConfig,
    rng: StdRng,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let (client, mut eventloop) = mqtt::connect(&config.broker, "sim");
    let reconnect_delay = Duration::from_millis(config.broker.reconnect_delay_ms);
    let driver = tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("simulator MQTT connection failed: {err}");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    });

    let mut source = SyntheticSource::new(config, rng);
    let mut current = None;
    info!(
        "publishing synthetic EEG to {} on {}:{}",
        config.broker.topic, config.broker.host, config.broker.port
    );
    tokio::pin!(shutdown);
    loop {
        let payload = tokio::select! {
            _ = &mut shutdown => break,
            payload = source.next_payload() => payload,
        };
        let Some(payload) = payload else { break };
        let phase = source.generator.phase_at(source.started.elapsed());
        if current != Some(phase) {
            info!("simulated phase: {phase}");
            current = Some(phase);
        }
        debug!("publishing {}", String::from_utf8_lossy(&payload));
        client
            .publish(config.broker.topic.clone(), QoS::AtMostOnce, false, payload)
            .await?;
    }
    let _ = client.disconnect().await;
    driver.abort();
    info!("simulator stopped");
    Ok(())
}
