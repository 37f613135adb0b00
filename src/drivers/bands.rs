use std::fmt;
use serde::{Deserialize, Serialize, Serializer};
use crate::drivers::{PipelineError, Spectrum};
/// The five EEG bands, in the fixed order used for bucketing and tie-breaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}
impl Band {
    pub const ALL: [Band; 5] = [Band::Delta, Band::Theta, Band::Alpha, Band::Beta, Band::Gamma];
    pub fn name(self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }
    fn index(self) -> usize {
        self as usize
    }
}
impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
/// Half-open frequency range `[low_hz, high_hz)`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct BandRange {
    pub low_hz: f64,
    pub high_hz: f64,
}
impl BandRange {
    pub const fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }
    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz < self.high_hz
    }
}
/// Frequency ranges for each band.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BandLayout {
    pub delta: BandRange,
    pub theta: BandRange,
    pub alpha: BandRange,
    pub beta: BandRange,
    pub gamma: BandRange,
}
impl Default for BandLayout {
    fn default() -> Self {
        Self {
            delta: BandRange::new(0.5, 4.0),
            theta: BandRange::new(4.0, 8.0),
            alpha: BandRange::new(8.0, 13.0),
            beta: BandRange::new(13.0, 30.0),
            gamma: BandRange::new(30.0, 100.0),
        }
    }
}
impl BandLayout {
    pub fn range(&self, band: Band) -> BandRange {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }
    /// First band in fixed order whose range holds `freq_hz`.
    pub fn locate(&self, freq_hz: f64) -> Option<Band> {
        Band::ALL
            .into_iter()
            .find(|&band| self.range(band).contains(freq_hz))
    }
    pub fn validate(&self) -> Result<(), PipelineError> {
        for band in Band::ALL {
            let r = self.range(band);
            if !(r.low_hz.is_finite() && r.high_hz.is_finite()) || r.low_hz >= r.high_hz {
                return Err(PipelineError::InvalidBandRange {
                    band,
                    low_hz: r.low_hz,
                    high_hz: r.high_hz,
                });
            }
        }
        Ok(())
    }
}
/// Normalized power fraction per band. The raw fractions sum to 1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandPowers {
    fractions: [f64; 5],
}
impl BandPowers {
    /// Normalizes raw per-band energies. A zero or non-finite total carries no signal.
    pub fn normalize(raw: [f64; 5]) -> BandReading {
        let total: f64 = raw.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return BandReading::NoSignal;
        }
        BandReading::Powers(Self {
            fractions: raw.map(|v| v / total),
        })
    }
    pub fn get(&self, band: Band) -> f64 {
        self.fractions[band.index()]
    }
    pub fn fractions(&self) -> [f64; 5] {
        self.fractions
    }
    pub fn total(&self) -> f64 {
        self.fractions.iter().sum()
    }
    /// Two-decimal value for display; the stored fraction is left untouched.
    pub fn rounded(&self, band: Band) -> f64 {
        (self.get(band) * 100.0).round() / 100.0
    }
    /// Band with the strictly greatest fraction; ties go to the earlier band.
    pub fn dominant(&self) -> Band {
        let mut best = Band::Delta;
        for band in Band::ALL {
            if self.get(band) > self.get(best) {
                best = band;
            }
        }
        best
    }
}
impl Serialize for BandPowers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Rounded {
            delta: f64,
            theta: f64,
            alpha: f64,
            beta: f64,
            gamma: f64,
        }
        Rounded {
            delta: self.rounded(Band::Delta),
            theta: self.rounded(Band::Theta),
            alpha: self.rounded(Band::Alpha),
            beta: self.rounded(Band::Beta),
            gamma: self.rounded(Band::Gamma),
        }
        .serialize(serializer)
    }
}
impl fmt::Display for BandPowers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, band) in Band::ALL.into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={:.2}", band, self.get(band))?;
        }
        Ok(())
    }
}
/// Outcome of aggregating one window or one pre-banded message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BandReading {
    Powers(BandPowers),
    NoSignal,
}
impl BandReading {
    pub fn powers(&self) -> Option<&BandPowers> {
        match self {
            BandReading::Powers(p) => Some(p),
            BandReading::NoSignal => None,
        }
    }
}
/// Buckets spectrum magnitudes into the configured bands.
#[derive(Clone, Debug, Default)]
pub struct BandAggregator {
    layout: BandLayout,
}
impl BandAggregator {
    pub fn new(layout: BandLayout) -> Result<Self, PipelineError> {
        layout.validate()?;
        Ok(Self { layout })
    }
    pub fn aggregate(
        &self,
        spectrum: &Spectrum,
        sample_rate_hz: f64,
    ) -> Result<BandReading, PipelineError> {
        if !(sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidSampleRate);
        }
        let n = spectrum.len() as f64;
        let mut raw = [0.0f64; 5];
        for (i, magnitude) in spectrum.magnitudes().enumerate() {
            let freq = i as f64 * sample_rate_hz / n;
            if let Some(band) = self.layout.locate(freq) {
                raw[band.index()] += magnitude;
            }
        }
        Ok(BandPowers::normalize(raw))
    }
}
