//! Analytic spectral envelope of the synthesized voice.
//!
//! The envelope is composed additively in the dB domain: glottal source tilt,
//! the three-formant vocal-tract transfer function, the singer's-formant and
//! harmonic-boost overlays, and the fold-thickness rolloff. It is a pure
//! function of [`SynthesisParameters`] so the plotted curve and the audible
//! output are driven by the same numbers.
//!
//! The peaking overlays use a Gaussian bump rather than the biquad response
//! the synthesizer actually runs. This is a display approximation and is not
//! expected to bit-match the rendered audio.

use crate::types::{SynthesisParameters, VocalPhysics};

/// Frequency at which the source tilt is 0 dB.
pub const TILT_REFERENCE_HZ: f64 = 100.0;
/// Lip radiation flattens the radiated source by one power of frequency.
pub const RADIATION_ORDER: f64 = 1.0;
/// Fixed singer's-formant overlay gain (dB) and width.
pub const SINGERS_FORMANT_GAIN_DB: f64 = 15.0;
pub const SINGERS_FORMANT_Q: f64 = 1.5;
pub const SINGERS_FORMANT_HZ: f64 = 3000.0;
pub const ROLLOFF_DB_PER_OCTAVE: f64 = 24.0;

pub const SWEEP_MIN_HZ: f64 = 20.0;
pub const SWEEP_MAX_HZ: f64 = 5500.0;
pub const SWEEP_STEP_HZ: f64 = 5.0;

/// Offset and range of the clipped display scale.
pub const DISPLAY_OFFSET_DB: f64 = 60.0;
pub const DISPLAY_MAX: f64 = 100.0;
/// Chart height the analyzed-spectrum overlay is scaled to.
const OVERLAY_SCALE: f64 = 80.0;

/// Power-law exponent of the glottal source magnitude for a closed quotient.
/// Low CQ rolls off steeply (dark), high CQ is flat (bright).
pub fn source_exponent(closed_quotient: f64) -> f64 {
    3.5 - closed_quotient * 3.0
}

/// Radiated source level at `freq`, normalized to 0 dB at 100 Hz.
pub fn source_tilt_db(freq: f64, closed_quotient: f64) -> f64 {
    let exponent = source_exponent(closed_quotient) - RADIATION_ORDER;
    let magnitude = 1.0 / (freq / TILT_REFERENCE_HZ).max(1.0).powf(exponent);
    20.0 * magnitude.log10()
}

/// Second-order resonance magnitude at `freq` for a formant centered at
/// `center` with quality factor `q`.
pub fn resonance(freq: f64, center: f64, q: f64) -> f64 {
    let ratio = freq / center;
    let term1 = 1.0 - ratio * ratio;
    let term2 = ratio / q;
    1.0 / (term1 * term1 + term2 * term2).sqrt()
}

/// Vocal-tract transfer function in dB: the three (already scaled) formant
/// resonances combined multiplicatively.
pub fn tract_response_db(freq: f64, centers: &[f64; 3], bandwidths: &[f64; 3]) -> f64 {
    let amplitude: f64 = centers
        .iter()
        .zip(bandwidths.iter())
        .map(|(&center, &bw)| resonance(freq, center, center / bw))
        .product();
    20.0 * (amplitude + 1e-7).log10()
}

/// Gaussian peak used to draw a peaking filter. Zero outside two
/// bandwidths of the center.
pub fn peaking_gain_db(freq: f64, center: f64, gain_db: f64, q: f64) -> f64 {
    if gain_db == 0.0 || !(center > 0.0) || !(q > 0.0) {
        return 0.0;
    }
    let bw = center / q;
    if (freq - center).abs() > bw * 2.0 {
        return 0.0;
    }
    let x = (freq - center) / (bw / 2.0);
    gain_db * (-0.5 * x * x).exp()
}

pub fn singers_formant_center(physics: &VocalPhysics) -> f64 {
    SINGERS_FORMANT_HZ * physics.vtl_scale().sqrt()
}

pub fn thickness_cutoff(fold_thickness: f64) -> f64 {
    12000.0 - fold_thickness.clamp(0.0, 100.0) * 110.0
}

pub fn thickness_rolloff_db(freq: f64, fold_thickness: f64) -> f64 {
    let cutoff = thickness_cutoff(fold_thickness);
    if freq > cutoff {
        -(freq / cutoff).log2() * ROLLOFF_DB_PER_OCTAVE
    } else {
        0.0
    }
}

/// Predicted level (dB, unclipped) of the synthesized voice at `freq`.
pub fn envelope_db(freq: f64, params: &SynthesisParameters) -> f64 {
    let physics = &params.physics;
    let centers = params.formants.scaled_centers(physics);
    let bandwidths = [0, 1, 2].map(|i| params.formants.bandwidth(i));

    let mut db = source_tilt_db(freq, physics.closed_quotient);
    db += tract_response_db(freq, &centers, &bandwidths);

    if params.singers_formant {
        db += peaking_gain_db(
            freq,
            singers_formant_center(physics),
            SINGERS_FORMANT_GAIN_DB,
            SINGERS_FORMANT_Q,
        );
    }
    let boost = &params.harmonic_boost;
    if boost.active {
        db += peaking_gain_db(freq, boost.freq, boost.gain, boost.q);
    }

    db + thickness_rolloff_db(freq, physics.fold_thickness)
}

pub fn display_value(db: f64) -> f64 {
    (db + DISPLAY_OFFSET_DB).clamp(0.0, DISPLAY_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumPoint {
    pub freq: f64,
    pub envelope: f64,
    /// Envelope level at harmonics of F0, zero elsewhere.
    pub harmonic: f64,
    /// Analyzed-spectrum overlay, zero without an overlay.
    pub user: f64,
}

/// Samples the envelope from 20 Hz to 5500 Hz in 5 Hz steps for plotting.
/// `overlay` is an analyzed spectrum covering the same range.
pub fn spectrum_curve(params: &SynthesisParameters, overlay: Option<&[f32]>) -> Vec<SpectrumPoint> {
    let steps = ((SWEEP_MAX_HZ - SWEEP_MIN_HZ) / SWEEP_STEP_HZ) as usize;
    let overlay = overlay.unwrap_or(&[]);
    (0..=steps)
        .map(|i| {
            let freq = SWEEP_MIN_HZ + i as f64 * SWEEP_STEP_HZ;
            let envelope = display_value(envelope_db(freq, params));
            SpectrumPoint {
                freq,
                envelope,
                harmonic: harmonic_spike(freq, params.pitch, envelope),
                user: overlay_value(freq, overlay),
            }
        })
        .collect()
}

fn harmonic_spike(freq: f64, pitch: f64, envelope: f64) -> f64 {
    if !(pitch > 0.0) {
        return 0.0;
    }
    let n = freq / pitch;
    if (n - n.round()).abs() >= SWEEP_STEP_HZ / pitch {
        return 0.0;
    }
    if envelope > 10.0 {
        envelope + 5.0
    } else {
        envelope
    }
}

fn overlay_value(freq: f64, overlay: &[f32]) -> f64 {
    let idx = ((freq / SWEEP_MAX_HZ) * overlay.len() as f64).floor() as usize;
    overlay
        .get(idx)
        .map(|&v| v as f64 * OVERLAY_SCALE)
        .unwrap_or(0.0)
}
