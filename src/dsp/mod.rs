pub mod biquad;
pub mod compressor;
pub mod noise;
pub mod oscillator;
pub mod smooth;

pub use biquad::{BiquadCoeffs, BiquadFilter};
pub use compressor::{Compressor, CompressorSettings};
pub use noise::NoiseLoop;
pub use oscillator::PhaseAccumulator;
pub use smooth::SmoothedParam;

pub(crate) fn amp_to_db(amp: f64) -> f64 {
    20.0 * amp.abs().max(1e-10).log10()
}

pub(crate) fn db_to_amp(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}
