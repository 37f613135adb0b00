use std::f64::consts::PI;
use std::sync::Arc;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::Deserialize;
use crate::drivers::{PipelineError, Window};
/// Taper applied to a window before the transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    /// No taper and no scaling; magnitudes match a plain DFT.
    #[default]
    Rectangular,
    Hann,
}
impl WindowFunction {
    fn coefficient(self, index: usize, len: usize) -> f64 {
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann if len > 1 => {
                0.5 * (1.0 - (2.0 * PI * index as f64 / (len - 1) as f64).cos())
            }
            WindowFunction::Hann => 1.0,
        }
    }
}
/// Complex coefficients for one window, all N bins.
#[derive(Clone, Debug)]
pub struct Spectrum {
    bins: Vec<Complex64>,
}
impl Spectrum {
    pub fn len(&self) -> usize {
        self.bins.len()
    }
    /// `sqrt(re^2 + im^2)` per bin.
    pub fn magnitudes(&self) -> impl Iterator<Item = f64> + '_ {
        self.bins.iter().map(|c| c.norm())
    }
}
/// Forward FFT planned once for a fixed window size.
pub struct SpectralDecomposer {
    size: usize,
    taper: WindowFunction,
    fft: Arc<dyn Fft<f64>>,
}
impl SpectralDecomposer {
    pub fn with_size(size: usize, taper: WindowFunction) -> Result<Self, PipelineError> {
        if size == 0 {
            return Err(PipelineError::InvalidWindowSize);
        }
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(size);
        Ok(Self { size, taper, fft })
    }
    pub fn decompose(&self, window: &Window) -> Result<Spectrum, PipelineError> {
        if window.len() != self.size {
            return Err(PipelineError::WindowLength {
                expected: self.size,
                actual: window.len(),
            });
        }
        let mut bins: Vec<Complex64> = window
            .samples()
            .iter()
            .enumerate()
            .map(|(i, &v)| Complex64::new(v * self.taper.coefficient(i, self.size), 0.0))
            .collect();
        self.fft.process(&mut bins);
        Ok(Spectrum { bins })
    }
}
