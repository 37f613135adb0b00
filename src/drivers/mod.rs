// src/drivers/mod.rs
// Pure signal-processing stages plus telemetry decoding.
pub mod bands;
pub mod buffer;
pub mod classifier;
pub mod error;
pub mod fft;
pub mod pipeline;
pub mod source;
pub use bands::{Band, BandAggregator, BandLayout, BandPowers, BandReading};
pub use buffer::{Window, WindowAggregator};
pub use classifier::{classify, ClassifiedState};
pub use error::PipelineError;
pub use fft::{SpectralDecomposer, Spectrum, WindowFunction};
pub use pipeline::SignalPipeline;
pub use source::{decode_payload, IngestMode, Telemetry, TelemetrySource};
