use log::debug;
use crate::drivers::{
    BandAggregator, BandLayout, BandPowers, BandReading, PipelineError, SpectralDecomposer,
    Telemetry, WindowAggregator, WindowFunction,
};
/// Window → FFT → band powers, fed one telemetry message at a time.
pub struct SignalPipeline {
    windows: WindowAggregator,
    decomposer: SpectralDecomposer,
    aggregator: BandAggregator,
    sample_rate_hz: f64,
    windows_completed: u64,
}
impl SignalPipeline {
    pub fn new(
        window_size: usize,
        sample_rate_hz: f64,
        layout: BandLayout,
        taper: WindowFunction,
    ) -> Result<Self, PipelineError> {
        if !(sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidSampleRate);
        }
        Ok(Self {
            windows: WindowAggregator::with_size(window_size)?,
            decomposer: SpectralDecomposer::with_size(window_size, taper)?,
            aggregator: BandAggregator::new(layout)?,
            sample_rate_hz,
            windows_completed: 0,
        })
    }
    /// Returns a reading whenever a window completes, or straight away for
    /// pre-banded messages.
    pub fn ingest(&mut self, telemetry: Telemetry) -> Result<Option<BandReading>, PipelineError> {
        match telemetry {
            Telemetry::Bands(energies) => Ok(Some(BandPowers::normalize(energies))),
            Telemetry::Sample(value) => {
                let Some(window) = self.windows.accept(value) else {
                    return Ok(None);
                };
                let spectrum = self.decomposer.decompose(&window)?;
                let reading = self.aggregator.aggregate(&spectrum, self.sample_rate_hz)?;
                self.windows_completed += 1;
                debug!("window #{} complete: {:?}", self.windows_completed, reading);
                Ok(Some(reading))
            }
        }
    }
    pub fn windows_completed(&self) -> u64 {
        self.windows_completed
    }
    pub fn pending_samples(&self) -> usize {
        self.windows.pending()
    }
    /// Drops whatever partial window is left at stream end.
    pub fn finish(&mut self) -> usize {
        self.windows.discard_partial()
    }
}
