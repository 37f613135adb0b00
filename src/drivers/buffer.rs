use crate::drivers::PipelineError;
/// One complete, non-overlapping run of samples.
///
/// Only [`WindowAggregator`] hands these out, so a window always carries the
/// aggregator's configured length.
#[derive(Clone, Debug)]
pub struct Window {
    samples: Vec<f64>,
}
impl Window {
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    #[cfg(test)]
    pub(crate) fn from_samples(samples: Vec<f64>) -> Self {
        Self { samples }
    }
}
/// Collects samples until a full window is available.
pub struct WindowAggregator {
    buffer: Vec<f64>,
    window_size: usize,
}
impl WindowAggregator {
    pub fn with_size(window_size: usize) -> Result<Self, PipelineError> {
        if window_size == 0 {
            return Err(PipelineError::InvalidWindowSize);
        }
        Ok(Self {
            buffer: Vec::with_capacity(window_size),
            window_size,
        })
    }
    /// Number of samples waiting in the partial window.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
    pub fn accept(&mut self, sample: f64) -> Option<Window> {
        self.buffer.push(sample);
        if self.buffer.len() < self.window_size {
            return None;
        }
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.window_size));
        Some(Window { samples })
    }
    /// Drops the partial window, returning how many samples were discarded.
    pub fn discard_partial(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }
}
