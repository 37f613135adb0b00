// src/alert.rs
//! Time-phased alert state machine.
//!
//! A run walks an ordered [`PhaseSchedule`] one stage at a time. Every edge
//! fires exactly once: evaluating again at the same (or an earlier) elapsed
//! time produces nothing, and a late evaluation that crosses several entry
//! times emits each crossed edge in order.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::drivers::{Band, BandPowers, PipelineError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPhase {
    Normal,
    Seizure,
    Cooldown,
    Stress,
    Recovery,
}

impl AlertPhase {
    pub fn label(self) -> &'static str {
        match self {
            AlertPhase::Normal => "NORMAL",
            AlertPhase::Seizure => "SEIZURE",
            AlertPhase::Cooldown => "COOLDOWN",
            AlertPhase::Stress => "STRESS",
            AlertPhase::Recovery => "RECOVERY",
        }
    }
}

impl fmt::Display for AlertPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// Alert raised when a stage is entered.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertSpec {
    pub severity: Severity,
    /// `status` field of the outbound notification.
    pub status: String,
    pub dominant_wave: Band,
    /// Text for the on-screen banner.
    pub banner: String,
}

/// Label and colour forced onto the display while a stage is active.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayOverride {
    pub label: String,
    pub color: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandThreshold {
    pub band: Band,
    pub fraction: f64,
}

/// A stage is entered once `after` has elapsed and, if set, the latest
/// band fraction exceeds the threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntryCondition {
    pub after: Duration,
    pub band_above: Option<BandThreshold>,
}

impl EntryCondition {
    pub const fn after(after: Duration) -> Self {
        Self {
            after,
            band_above: None,
        }
    }

    fn is_met(&self, elapsed: Duration, bands: Option<&BandPowers>) -> bool {
        if elapsed < self.after {
            return false;
        }
        match self.band_above {
            None => true,
            Some(t) => bands.is_some_and(|b| b.get(t.band) > t.fraction),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitAction {
    Hold,
    ClearAlert,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhaseStage {
    pub phase: AlertPhase,
    pub entry: EntryCondition,
    pub on_enter: Option<AlertSpec>,
    pub on_exit: ExitAction,
    pub display: Option<DisplayOverride>,
}

impl PhaseStage {
    fn quiet(phase: AlertPhase, after: Duration) -> Self {
        Self {
            phase,
            entry: EntryCondition::after(after),
            on_enter: None,
            on_exit: ExitAction::Hold,
            display: None,
        }
    }
}

/// Timing of the scripted seizure/stress timeline, in milliseconds from run start.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PhaseTiming {
    pub seizure_start_ms: u64,
    pub seizure_duration_ms: u64,
    pub stress_delay_ms: u64,
    pub stress_duration_ms: u64,
    /// Also require this gamma fraction before the seizure stage is entered.
    pub seizure_gamma_fraction: Option<f64>,
    /// Also require this beta fraction before the stress stage is entered.
    pub stress_beta_fraction: Option<f64>,
}

impl Default for PhaseTiming {
    fn default() -> Self {
        Self {
            seizure_start_ms: 15_000,
            seizure_duration_ms: 20_000,
            stress_delay_ms: 10_000,
            stress_duration_ms: 20_000,
            seizure_gamma_fraction: None,
            stress_beta_fraction: None,
        }
    }
}

impl PhaseTiming {
    pub fn seizure_start(&self) -> Duration {
        Duration::from_millis(self.seizure_start_ms)
    }

    pub fn cooldown_start(&self) -> Duration {
        self.seizure_start() + Duration::from_millis(self.seizure_duration_ms)
    }

    pub fn stress_start(&self) -> Duration {
        self.cooldown_start() + Duration::from_millis(self.stress_delay_ms)
    }

    pub fn recovery_start(&self) -> Duration {
        self.stress_start() + Duration::from_millis(self.stress_duration_ms)
    }

    /// Phase the scripted timeline is in at `elapsed`, ignoring band gates.
    pub fn phase_at(&self, elapsed: Duration) -> AlertPhase {
        if elapsed < self.seizure_start() {
            AlertPhase::Normal
        } else if elapsed < self.cooldown_start() {
            AlertPhase::Seizure
        } else if elapsed < self.stress_start() {
            AlertPhase::Cooldown
        } else if elapsed < self.recovery_start() {
            AlertPhase::Stress
        } else {
            AlertPhase::Recovery
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhaseSchedule {
    stages: Vec<PhaseStage>,
}

impl PhaseSchedule {
    pub fn new(stages: Vec<PhaseStage>) -> Result<Self, PipelineError> {
        let Some(first) = stages.first() else {
            return Err(PipelineError::InvalidSchedule("no stages".into()));
        };
        if first.entry != EntryCondition::after(Duration::ZERO) {
            return Err(PipelineError::InvalidSchedule(format!(
                "initial stage {} must be entered unconditionally",
                first.phase
            )));
        }
        for pair in stages.windows(2) {
            if pair[1].entry.after < pair[0].entry.after {
                return Err(PipelineError::InvalidSchedule(format!(
                    "{} is entered before {}",
                    pair[1].phase, pair[0].phase
                )));
            }
        }
        Ok(Self { stages })
    }

    /// NORMAL → SEIZURE → COOLDOWN → STRESS → RECOVERY.
    pub fn timeline(timing: &PhaseTiming) -> Result<Self, PipelineError> {
        let seizure = PhaseStage {
            phase: AlertPhase::Seizure,
            entry: EntryCondition {
                after: timing.seizure_start(),
                band_above: timing.seizure_gamma_fraction.map(|fraction| BandThreshold {
                    band: Band::Gamma,
                    fraction,
                }),
            },
            on_enter: Some(AlertSpec {
                severity: Severity::High,
                status: "Seizure detected".into(),
                dominant_wave: Band::Gamma,
                banner: "Gamma waves extremely high: possible seizure activity".into(),
            }),
            on_exit: ExitAction::ClearAlert,
            display: Some(DisplayOverride {
                label: "OVERSTIMULATED".into(),
                color: "#e74c3c".into(),
            }),
        };
        let stress = PhaseStage {
            phase: AlertPhase::Stress,
            entry: EntryCondition {
                after: timing.stress_start(),
                band_above: timing.stress_beta_fraction.map(|fraction| BandThreshold {
                    band: Band::Beta,
                    fraction,
                }),
            },
            on_enter: Some(AlertSpec {
                severity: Severity::Medium,
                status: "High stress levels".into(),
                dominant_wave: Band::Beta,
                banner: "High beta waves: elevated stress levels".into(),
            }),
            on_exit: ExitAction::ClearAlert,
            display: Some(DisplayOverride {
                label: "FOCUSED".into(),
                color: "#f1c40f".into(),
            }),
        };
        Self::new(vec![
            PhaseStage::quiet(AlertPhase::Normal, Duration::ZERO),
            seizure,
            PhaseStage::quiet(AlertPhase::Cooldown, timing.cooldown_start()),
            stress,
            PhaseStage::quiet(AlertPhase::Recovery, timing.recovery_start()),
        ])
    }
}

/// Start/stop wall-clock times of one alerting stage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Episode {
    pub phase: AlertPhase,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// State of one run. Dropped (never carried over) when the run stops.
#[derive(Debug)]
pub struct RunSession {
    started_at: Instant,
    stage: usize,
    active_alert: Option<AlertSpec>,
    episodes: Vec<Episode>,
}

impl RunSession {
    pub fn start(started_at: Instant) -> Self {
        Self {
            started_at,
            stage: 0,
            active_alert: None,
            episodes: Vec::new(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn active_alert(&self) -> Option<&AlertSpec> {
        self.active_alert.as_ref()
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// Most recent episode recorded for `phase`.
    pub fn episode(&self, phase: AlertPhase) -> Option<&Episode> {
        self.episodes.iter().rev().find(|e| e.phase == phase)
    }
}

/// One fired edge of the schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseTransition {
    pub from: AlertPhase,
    pub to: AlertPhase,
    pub elapsed: Duration,
    pub at: DateTime<Utc>,
    pub raised: Option<AlertSpec>,
    pub cleared: Option<AlertSpec>,
}

pub struct PhaseMachine {
    schedule: PhaseSchedule,
    session: RunSession,
}

impl PhaseMachine {
    pub fn new(schedule: PhaseSchedule, started_at: Instant) -> Self {
        Self {
            schedule,
            session: RunSession::start(started_at),
        }
    }

    fn stage(&self) -> &PhaseStage {
        &self.schedule.stages[self.session.stage]
    }

    pub fn phase(&self) -> AlertPhase {
        self.stage().phase
    }

    pub fn display_override(&self) -> Option<&DisplayOverride> {
        self.stage().display.as_ref()
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    /// Index of the stage that can be entered next. A gated stage whose
    /// window has closed (the stage after it is already due) is passed over
    /// without raising anything.
    fn next_target(&self, elapsed: Duration) -> Option<usize> {
        let stages = &self.schedule.stages;
        let mut target = self.session.stage + 1;
        loop {
            let stage = stages.get(target)?;
            let window_closed = stages
                .get(target + 1)
                .is_some_and(|following| following.entry.after <= elapsed);
            if stage.entry.band_above.is_some() && window_closed {
                target += 1;
            } else {
                return Some(target);
            }
        }
    }

    /// Evaluates against the monotonic clock.
    pub fn tick(
        &mut self,
        now: Instant,
        bands: Option<&BandPowers>,
        wall: DateTime<Utc>,
    ) -> Vec<PhaseTransition> {
        let elapsed = now.saturating_duration_since(self.session.started_at);
        self.evaluate(elapsed, bands, wall)
    }

    pub fn evaluate(
        &mut self,
        elapsed: Duration,
        bands: Option<&BandPowers>,
        wall: DateTime<Utc>,
    ) -> Vec<PhaseTransition> {
        let mut fired = Vec::new();
        while let Some(target) = self.next_target(elapsed) {
            let next = &self.schedule.stages[target];
            if !next.entry.is_met(elapsed, bands) {
                break;
            }
            let next = next.clone();
            let current = self.stage().clone();
            let cleared = match current.on_exit {
                ExitAction::ClearAlert => self.session.active_alert.take(),
                ExitAction::Hold => None,
            };
            if current.on_enter.is_some() {
                if let Some(open) = self
                    .session
                    .episodes
                    .iter_mut()
                    .rev()
                    .find(|e| e.phase == current.phase && e.stopped_at.is_none())
                {
                    open.stopped_at = Some(wall);
                }
            }
            if let Some(alert) = &next.on_enter {
                self.session.episodes.push(Episode {
                    phase: next.phase,
                    started_at: wall,
                    stopped_at: None,
                });
                self.session.active_alert = Some(alert.clone());
            }
            self.session.stage = target;
            fired.push(PhaseTransition {
                from: current.phase,
                to: next.phase,
                elapsed,
                at: wall,
                raised: next.on_enter,
                cleared,
            });
        }
        fired
    }
}
