use std::fmt;
use serde::Serialize;
use crate::drivers::{Band, BandPowers};
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CognitiveState {
    #[serde(rename = "OVERSTIMULATED")]
    Overstimulated,
    #[serde(rename = "FOCUSED")]
    Focused,
    #[serde(rename = "RELAXED")]
    Relaxed,
    #[serde(rename = "DROWSY")]
    Drowsy,
    #[serde(rename = "DEEP SLEEP")]
    DeepSleep,
}
impl CognitiveState {
    pub fn label(self) -> &'static str {
        match self {
            CognitiveState::Overstimulated => "OVERSTIMULATED",
            CognitiveState::Focused => "FOCUSED",
            CognitiveState::Relaxed => "RELAXED",
            CognitiveState::Drowsy => "DROWSY",
            CognitiveState::DeepSleep => "DEEP SLEEP",
        }
    }
}
impl fmt::Display for CognitiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
/// Label, indices (0..=100) and display colour derived from the dominant band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClassifiedState {
    pub state: CognitiveState,
    pub dominant: Band,
    pub focus: u8,
    pub stress: u8,
    pub wellbeing: u8,
    pub color: &'static str,
}
pub fn classify(bands: &BandPowers) -> ClassifiedState {
    let dominant = bands.dominant();
    let (state, focus, stress, wellbeing, color) = match dominant {
        Band::Gamma => (CognitiveState::Overstimulated, 40, 90, 40, "#e74c3c"),
        Band::Beta => (CognitiveState::Focused, 85, 60, 75, "#00ccff"),
        Band::Alpha => (CognitiveState::Relaxed, 70, 30, 95, "#2ecc71"),
        Band::Theta => (CognitiveState::Drowsy, 40, 25, 60, "#f1c40f"),
        Band::Delta => (CognitiveState::DeepSleep, 20, 10, 50, "#9b59b6"),
    };
    ClassifiedState {
        state,
        dominant,
        focus,
        stress,
        wellbeing,
        color,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn bands(raw: [f64; 5]) -> BandPowers {
        *BandPowers::normalize(raw).powers().unwrap()
    }
    #[test]
    fn maps_each_dominant_band() {
        let cases = [
            ([5.0, 1.0, 1.0, 1.0, 1.0], CognitiveState::DeepSleep, (20, 10, 50)),
            ([1.0, 5.0, 1.0, 1.0, 1.0], CognitiveState::Drowsy, (40, 25, 60)),
            ([1.0, 1.0, 5.0, 1.0, 1.0], CognitiveState::Relaxed, (70, 30, 95)),
            ([1.0, 1.0, 1.0, 5.0, 1.0], CognitiveState::Focused, (85, 60, 75)),
            ([1.0, 1.0, 1.0, 1.0, 5.0], CognitiveState::Overstimulated, (40, 90, 40)),
        ];
        for (raw, expected, (focus, stress, wellbeing)) in cases {
            let c = classify(&bands(raw));
            assert_eq!(c.state, expected);
            assert_eq!((c.focus, c.stress, c.wellbeing), (focus, stress, wellbeing));
        }
    }
    #[test]
    fn is_pure() {
        let b = bands([0.2, 0.1, 0.4, 0.2, 0.1]);
        assert_eq!(classify(&b), classify(&b));
    }
    #[test]
    fn exact_tie_prefers_fixed_band_order() {
        let c = classify(&bands([0.0, 0.0, 0.0, 3.0, 3.0]));
        assert_eq!(c.state, CognitiveState::Focused);
        assert_eq!(c.color, "#00ccff");
    }
    #[test]
    fn label_serializes_with_space() {
        let c = classify(&bands([9.0, 0.0, 0.0, 0.0, 0.0]));
        let json = serde_json::to_value(c).unwrap();
        assert_eq!(json["state"], "DEEP SLEEP");
        assert_eq!(json["dominant"], "delta");
    }
}
