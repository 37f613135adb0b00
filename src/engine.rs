// src/engine.rs
//! Run control. A run owns two tasks: ingestion (telemetry → bands) and the
//! periodic tick (phase machine + display). They share only the latest
//! `BandReading`, published through a `watch` cell written by ingestion alone.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::alert::{AlertPhase, Episode, PhaseMachine, PhaseTransition, Severity};
use crate::broadcast::BroadcastHub;
use crate::config::AppConfig;
use crate::display::{decorate, DisplayState};
use crate::drivers::{
    classify, decode_payload, BandPowers, BandReading, IngestMode, PipelineError,
    SignalPipeline, TelemetrySource,
};
use crate::notifier::{Notification, Notifier};

/// Alert banner changes, pushed to UI subscribers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlertEvent {
    Raised {
        phase: AlertPhase,
        severity: Severity,
        status: String,
        banner: String,
        at: DateTime<Utc>,
    },
    Cleared {
        phase: AlertPhase,
        at: DateTime<Utc>,
    },
}

/// Outlets shared by every run; subscriptions survive stop/start.
#[derive(Default)]
pub struct Hubs {
    pub bands: BroadcastHub<BandPowers>,
    pub display: BroadcastHub<DisplayState>,
    pub alerts: BroadcastHub<AlertEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct IngestReport {
    payloads: u64,
    dropped: u64,
    windows: u64,
    samples_discarded: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub elapsed_ms: u64,
    pub final_phase: AlertPhase,
    pub episodes: Vec<Episode>,
    pub payloads: u64,
    pub payloads_dropped: u64,
    pub windows: u64,
    pub samples_discarded: usize,
}

impl RunSummary {
    pub fn episode(&self, phase: AlertPhase) -> Option<&Episode> {
        self.episodes.iter().rev().find(|e| e.phase == phase)
    }
}

fn clock(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_owned())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run lasted {:.1}s, ended in {}",
            self.elapsed_ms as f64 / 1000.0,
            self.final_phase
        )?;
        for phase in [AlertPhase::Seizure, AlertPhase::Stress] {
            let episode = self.episode(phase);
            write!(
                f,
                "; {}: {} -> {}",
                phase,
                clock(episode.map(|e| e.started_at)),
                clock(episode.and_then(|e| e.stopped_at))
            )?;
        }
        write!(
            f,
            "; {} payloads ({} dropped), {} windows",
            self.payloads, self.payloads_dropped, self.windows
        )
    }
}

struct ActiveRun {
    shutdown: watch::Sender<bool>,
    ingest: JoinHandle<IngestReport>,
    ticker: JoinHandle<PhaseMachine>,
}

pub struct Engine {
    config: Arc<AppConfig>,
    notifier: Arc<dyn Notifier>,
    hubs: Arc<Hubs>,
    active: Option<ActiveRun>,
}

impl Engine {
    pub fn new(config: AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            notifier,
            hubs: Arc::new(Hubs::default()),
            active: None,
        })
    }

    pub fn hubs(&self) -> Arc<Hubs> {
        Arc::clone(&self.hubs)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Starts a run fed by `source`. Returns `Ok(false)` if one is already active.
    pub fn start<S: TelemetrySource>(&mut self, source: S) -> Result<bool, PipelineError> {
        if self.active.is_some() {
            info!("run already active; ignoring start");
            return Ok(false);
        }
        let signal = &self.config.signal;
        let pipeline = SignalPipeline::new(
            signal.window_size,
            signal.sample_rate_hz,
            signal.bands.clone(),
            signal.window_function,
        )?;
        let machine = PhaseMachine::new(self.config.phase_schedule()?, Instant::now());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (latest_tx, latest_rx) = watch::channel(None);

        let ingest = tokio::spawn(ingest_loop(
            source,
            pipeline,
            self.config.ingest.clone(),
            latest_tx,
            Arc::clone(&self.hubs),
            shutdown_rx.clone(),
        ));
        let ticker = tokio::spawn(tick_loop(
            machine,
            self.config.tick(),
            latest_rx,
            Arc::clone(&self.notifier),
            Arc::clone(&self.hubs),
            shutdown_rx,
        ));
        self.active = Some(ActiveRun {
            shutdown,
            ingest,
            ticker,
        });
        info!("run started");
        Ok(true)
    }

    /// Stops the active run and waits for both tasks to finish, so nothing
    /// from this run outlives the call. `None` if no run was active.
    pub async fn stop(&mut self) -> Option<RunSummary> {
        let run = self.active.take()?;
        let _ = run.shutdown.send(true);
        let report = match run.ingest.await {
            Ok(report) => report,
            Err(err) => {
                error!("ingestion task failed: {err}");
                IngestReport::default()
            }
        };
        let machine = match run.ticker.await {
            Ok(machine) => machine,
            Err(err) => {
                error!("tick task failed: {err}");
                return None;
            }
        };
        if machine.session().active_alert().is_some() {
            self.hubs.alerts.publish(AlertEvent::Cleared {
                phase: machine.phase(),
                at: Utc::now(),
            });
        }
        let summary = RunSummary {
            elapsed_ms: machine.session().started_at().elapsed().as_millis() as u64,
            final_phase: machine.phase(),
            episodes: machine.session().episodes().to_vec(),
            payloads: report.payloads,
            payloads_dropped: report.dropped,
            windows: report.windows,
            samples_discarded: report.samples_discarded,
        };
        info!("run stopped: {summary}");
        Some(summary)
    }
}

async fn ingest_loop<S: TelemetrySource>(
    mut source: S,
    mut pipeline: SignalPipeline,
    mode: IngestMode,
    latest: watch::Sender<Option<BandReading>>,
    hubs: Arc<Hubs>,
    mut shutdown: watch::Receiver<bool>,
) -> IngestReport {
    let mut report = IngestReport::default();
    loop {
        let payload = tokio::select! {
            _ = shutdown.changed() => break,
            payload = source.next_payload() => payload,
        };
        let Some(payload) = payload else {
            info!("telemetry source exhausted; waiting for stop");
            let _ = shutdown.changed().await;
            break;
        };
        report.payloads += 1;
        let telemetry = match decode_payload(&payload, &mode) {
            Ok(telemetry) => telemetry,
            Err(err) => {
                report.dropped += 1;
                warn!("dropping telemetry payload: {err}");
                continue;
            }
        };
        match pipeline.ingest(telemetry) {
            Ok(Some(reading)) => {
                match reading.powers() {
                    Some(powers) => {
                        debug!("EEG bands: {powers}");
                        hubs.bands.publish(*powers);
                    }
                    None => warn!("no signal in latest reading; classification skipped"),
                }
                latest.send_replace(Some(reading));
            }
            Ok(None) => {}
            Err(err) => error!("discarding window: {err}"),
        }
    }
    source.close().await;
    report.windows = pipeline.windows_completed();
    report.samples_discarded = pipeline.finish();
    if report.samples_discarded > 0 {
        debug!(
            "discarded {} samples of a partial window",
            report.samples_discarded
        );
    }
    report
}

async fn tick_loop(
    mut machine: PhaseMachine,
    cadence: Duration,
    latest: watch::Receiver<Option<BandReading>>,
    notifier: Arc<dyn Notifier>,
    hubs: Arc<Hubs>,
    mut shutdown: watch::Receiver<bool>,
) -> PhaseMachine {
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }
        let reading = *latest.borrow();
        let bands = reading.as_ref().and_then(BandReading::powers);
        for edge in machine.tick(Instant::now(), bands, Utc::now()) {
            report_transition(&edge, notifier.as_ref(), &hubs);
        }
        let classified = bands.map(classify);
        let shown = decorate(
            machine.phase(),
            bands,
            classified.as_ref(),
            machine.display_override(),
        );
        debug!("display: {} [{}] {}", shown.label, shown.phase, shown.color);
        hubs.display.publish(shown);
    }
    machine
}

fn report_transition(edge: &PhaseTransition, notifier: &dyn Notifier, hubs: &Hubs) {
    let secs = edge.elapsed.as_secs_f64();
    if let Some(cleared) = &edge.cleared {
        info!("{} ended at {secs:.1}s; clearing '{}'", edge.from, cleared.status);
        hubs.alerts.publish(AlertEvent::Cleared {
            phase: edge.from,
            at: edge.at,
        });
    }
    match &edge.raised {
        Some(alert) => {
            warn!(
                "{} -> {} at {secs:.1}s: {} ({} severity)",
                edge.from, edge.to, alert.banner, alert.severity
            );
            hubs.alerts.publish(AlertEvent::Raised {
                phase: edge.to,
                severity: alert.severity,
                status: alert.status.clone(),
                banner: alert.banner.clone(),
                at: edge.at,
            });
            notifier.notify(Notification::for_alert(alert, edge.at));
        }
        None => info!("{} -> {} at {secs:.1}s", edge.from, edge.to),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::classifier::CognitiveState;
    use crate::drivers::source::ManualSource;
    use crate::notifier::testing::RecordingNotifier;
    use crate::notifier::WebhookNotifier;

    fn banded_engine(notifier: &RecordingNotifier) -> Engine {
        let config = AppConfig {
            ingest: IngestMode::PreBanded,
            ..AppConfig::default()
        };
        Engine::new(config, Arc::new(notifier.clone())).unwrap()
    }

    fn relaxed_payload() -> Vec<u8> {
        br#"{"delta":"0.10","theta":"0.10","alpha":"0.90","beta":"0.20","gamma":"0.10"}"#.to_vec()
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_run_raises_two_alerts() {
        let notifier = RecordingNotifier::default();
        let mut engine = banded_engine(&notifier);
        let hubs = engine.hubs();
        let mut display = hubs.display.subscribe();
        let mut alerts = hubs.alerts.subscribe();
        let mut bands = hubs.bands.subscribe();

        let source = ManualSource::new(vec![relaxed_payload(), b"garbage".to_vec()]);
        assert!(engine.start(source).unwrap());
        assert!(!engine.start(ManualSource::new(Vec::new())).unwrap());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(bands.try_next().is_some());
        let shown = display.try_next().unwrap();
        assert_eq!(shown.phase, AlertPhase::Seizure);
        assert_eq!(shown.label, "OVERSTIMULATED");
        assert_eq!(shown.classified.unwrap().state, CognitiveState::Relaxed);
        assert!(matches!(
            alerts.try_next(),
            Some(AlertEvent::Raised { severity: Severity::High, .. })
        ));
        assert_eq!(notifier.sent().len(), 1);

        tokio::time::sleep(Duration::from_secs(50)).await;
        let summary = engine.stop().await.unwrap();
        assert!(!engine.is_running());
        assert_eq!(summary.final_phase, AlertPhase::Recovery);
        assert_eq!(summary.payloads, 2);
        assert_eq!(summary.payloads_dropped, 1);
        let seizure = summary.episode(AlertPhase::Seizure).unwrap();
        let stress = summary.episode(AlertPhase::Stress).unwrap();
        assert!(seizure.stopped_at.is_some());
        assert!(stress.stopped_at.is_some());
        assert!(matches!(
            alerts.try_next(),
            Some(AlertEvent::Cleared { phase: AlertPhase::Stress, .. })
        ));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].severity, Severity::High);
        assert_eq!(sent[0].status, "Seizure detected");
        assert_eq!(sent[1].severity, Severity::Medium);
        assert_eq!(sent[1].status, "High stress levels");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_and_restart_begins_at_zero() {
        let notifier = RecordingNotifier::default();
        let mut engine = banded_engine(&notifier);
        let mut display = engine.hubs().display.subscribe();

        engine.start(ManualSource::new(vec![relaxed_payload()])).unwrap();
        tokio::time::sleep(Duration::from_secs(50)).await;
        let first = engine.stop().await.unwrap();
        assert_eq!(first.final_phase, AlertPhase::Stress);
        assert_eq!(first.episodes.len(), 2);
        assert!(engine.stop().await.is_none());

        engine.start(ManualSource::new(Vec::new())).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let shown = display.try_next().unwrap();
        assert_eq!(shown.phase, AlertPhase::Normal);
        assert_eq!(shown.label, "NO SIGNAL");
        let second = engine.stop().await.unwrap();
        assert_eq!(second.final_phase, AlertPhase::Normal);
        assert!(second.episodes.is_empty());
        assert!(second.elapsed_ms < 2_000);
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_mid_alert_clears_the_banner() {
        let notifier = RecordingNotifier::default();
        let mut engine = banded_engine(&notifier);
        let mut alerts = engine.hubs().alerts.subscribe();
        engine.start(ManualSource::new(Vec::new())).unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;
        let summary = engine.stop().await.unwrap();
        assert_eq!(summary.final_phase, AlertPhase::Seizure);
        assert!(summary.episode(AlertPhase::Seizure).unwrap().stopped_at.is_none());
        assert!(matches!(
            alerts.try_next(),
            Some(AlertEvent::Cleared { phase: AlertPhase::Seizure, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_webhook_leaves_transitions_intact() {
        let config = AppConfig {
            ingest: IngestMode::PreBanded,
            ..AppConfig::default()
        };
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_millis(200)).unwrap();
        let mut engine = Engine::new(config, Arc::new(notifier)).unwrap();
        let mut alerts = engine.hubs().alerts.subscribe();
        engine.start(ManualSource::new(vec![relaxed_payload()])).unwrap();

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(matches!(
            alerts.try_next(),
            Some(AlertEvent::Raised { phase: AlertPhase::Seizure, .. })
        ));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(engine.is_running());
        let summary = engine.stop().await.unwrap();
        assert_eq!(summary.final_phase, AlertPhase::Stress);
        let seizure = summary.episode(AlertPhase::Seizure).unwrap();
        assert!(seizure.stopped_at.is_some());
        assert!(summary.episode(AlertPhase::Stress).is_some());
        assert_eq!(summary.episodes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_channel_windows_reach_the_display() {
        let notifier = RecordingNotifier::default();
        let mut engine = Engine::new(AppConfig::default(), Arc::new(notifier)).unwrap();
        let mut display = engine.hubs().display.subscribe();
        let freq = 21.0 * 250.0 / 512.0; // ~10.25 Hz, alpha
        let payloads = (0..512).map(|n| {
            let v = (2.0 * std::f64::consts::PI * freq * n as f64 / 250.0).sin();
            format!(r#"{{"channel1": {v}}}"#).into_bytes()
        });
        engine.start(ManualSource::new(payloads)).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let shown = display.try_next().unwrap();
        assert_eq!(shown.label, "RELAXED");
        let summary = engine.stop().await.unwrap();
        assert_eq!(summary.windows, 1);
        assert_eq!(summary.samples_discarded, 0);
    }
}
