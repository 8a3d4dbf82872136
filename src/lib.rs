//! Formant voice synthesis and live formant analysis.
//!
//! The synthesizer turns [`SynthesisParameters`] into audio through a
//! source-filter voice graph; the envelope estimator predicts the same
//! spectrum analytically; the analyzer tracks F1 and F2 from a microphone
//! with linear prediction.

pub mod analyzer;
pub mod audio;
pub mod cli;
pub mod dsp;
pub mod envelope;
pub mod error;
pub mod glottal;
pub mod lpc;
pub mod processing;
pub mod spectrum;
pub mod synth;
pub mod types;

pub use analyzer::{AnalyzerState, FormantAnalyzer};
pub use envelope::envelope_db;
pub use error::{AnalyzerError, SynthError};
pub use processing::AnalyzerConfig;
pub use synth::{EngineState, SynthConfig, VoiceSynth};
pub use types::{
    vtl_scale, AnalyzedFormants, FormantTriple, HarmonicBoost, SynthesisParameters, VocalPhysics,
};
