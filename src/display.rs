// src/display.rs
use serde::Serialize;

use crate::alert::{AlertPhase, DisplayOverride};
use crate::drivers::{BandPowers, ClassifiedState};

const NO_SIGNAL_LABEL: &str = "NO SIGNAL";
const NO_SIGNAL_COLOR: &str = "#7f8c8d";

/// What the dashboard shows for one tick.
///
/// `label`/`color` may be forced by the active phase; `classified` always
/// holds the real classification of the latest bands.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayState {
    pub phase: AlertPhase,
    pub label: String,
    pub color: String,
    pub overridden: bool,
    pub classified: Option<ClassifiedState>,
    pub bands: Option<BandPowers>,
}

/// Applies the phase's presentation override on top of a classification.
pub fn decorate(
    phase: AlertPhase,
    bands: Option<&BandPowers>,
    classified: Option<&ClassifiedState>,
    forced: Option<&DisplayOverride>,
) -> DisplayState {
    let (label, color) = match (forced, classified) {
        (Some(o), _) => (o.label.clone(), o.color.clone()),
        (None, Some(c)) => (c.state.label().to_owned(), c.color.to_owned()),
        (None, None) => (NO_SIGNAL_LABEL.to_owned(), NO_SIGNAL_COLOR.to_owned()),
    };
    DisplayState {
        phase,
        label,
        color,
        overridden: forced.is_some(),
        classified: classified.copied(),
        bands: bands.copied(),
    }
}
