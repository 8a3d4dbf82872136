/// Reference vocal tract length (cm) the formant tables are expressed against.
pub const REFERENCE_TRACT_LENGTH_CM: f64 = 17.5;
pub const MIN_TRACT_LENGTH_CM: f64 = 10.0;
pub const DEFAULT_BANDWIDTHS: [f64; 3] = [80.0, 100.0, 120.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantTriple {
    pub f1: f64,
    pub f2: f64,
    pub f3: f64,
    pub bandwidths: [f64; 3],
}

impl FormantTriple {
    pub fn new(f1: f64, f2: f64, f3: f64, bandwidths: [f64; 3]) -> Self {
        Self {
            f1,
            f2,
            f3,
            bandwidths,
        }
    }

    /// Completes an (F1, F2) vowel-chart point into a full triple.
    pub fn from_vowel_chart(f1: f64, f2: f64) -> Self {
        let f3 = 2300.0 + (f2 - 1000.0) * 0.25;
        Self::new(f1, f2, f3, DEFAULT_BANDWIDTHS)
    }

    pub fn centers(&self) -> [f64; 3] {
        [self.f1, self.f2, self.f3]
    }

    /// Bandwidth of formant `index`, falling back to the default when the
    /// stored value is unusable.
    pub fn bandwidth(&self, index: usize) -> f64 {
        let bw = self.bandwidths[index];
        if bw.is_finite() && bw > 0.0 {
            bw
        } else {
            DEFAULT_BANDWIDTHS[index]
        }
    }

    /// Formant centers after vocal-tract-length scaling.
    pub fn scaled_centers(&self, physics: &VocalPhysics) -> [f64; 3] {
        let scale = physics.vtl_scale();
        self.centers().map(|f| f * scale)
    }
}

impl Default for FormantTriple {
    // Hillenbrand male schwa.
    fn default() -> Self {
        Self::new(500.0, 1500.0, 2500.0, DEFAULT_BANDWIDTHS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VocalPhysics {
    /// Vocal tract length in cm.
    pub tract_length: f64,
    /// Fold thickness, 0 (thin) to 100 (thick).
    pub fold_thickness: f64,
    /// Closed quotient, 0.0 (breathy) to 1.0 (pressed).
    pub closed_quotient: f64,
}

impl VocalPhysics {
    pub fn new(tract_length: f64, fold_thickness: f64, closed_quotient: f64) -> Self {
        Self {
            tract_length,
            fold_thickness,
            closed_quotient,
        }
    }

    /// Uniform formant scale factor; shorter tracts raise every formant.
    pub fn vtl_scale(&self) -> f64 {
        vtl_scale(self.tract_length)
    }
}

impl Default for VocalPhysics {
    fn default() -> Self {
        Self::new(REFERENCE_TRACT_LENGTH_CM, 50.0, 0.5)
    }
}

pub fn vtl_scale(tract_length: f64) -> f64 {
    // f64::max drops a NaN operand, so a NaN length reads as the minimum.
    REFERENCE_TRACT_LENGTH_CM / tract_length.max(MIN_TRACT_LENGTH_CM)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicBoost {
    pub active: bool,
    pub freq: f64,
    pub gain: f64,
    pub q: f64,
}

impl Default for HarmonicBoost {
    fn default() -> Self {
        Self {
            active: false,
            freq: 0.0,
            gain: 0.0,
            q: 0.0,
        }
    }
}

/// Everything the envelope estimator and the synthesizer read. Both must
/// interpret it identically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParameters {
    pub pitch: f64,
    pub formants: FormantTriple,
    /// Output volume, 0.0 to 1.0.
    pub volume: f64,
    pub singers_formant: bool,
    pub harmonic_boost: HarmonicBoost,
    pub physics: VocalPhysics,
}

impl Default for SynthesisParameters {
    fn default() -> Self {
        Self {
            pitch: 120.0,
            formants: FormantTriple::default(),
            volume: 0.5,
            singers_formant: false,
            harmonic_boost: HarmonicBoost::default(),
            physics: VocalPhysics::default(),
        }
    }
}

/// One analysis tick's worth of feedback. `f1`/`f2` are zero when no voice
/// was detected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzedFormants {
    pub f1: f64,
    pub f2: f64,
    /// RMS amplitude of the frame; zero for gated frames.
    pub energy: f32,
    /// Normalized magnitudes covering 0..5500 Hz for display.
    pub spectrum: Vec<f32>,
}

impl AnalyzedFormants {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn is_voiced(&self) -> bool {
        self.f1 > 0.0 && self.f2 > 0.0
    }
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name of `freq` (A4 = 440 Hz), e.g. `"A2"` for 110 Hz.
pub fn note_name(freq: f64) -> Option<String> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let c0 = 440.0 * 2f64.powf(-4.75);
    let steps = (12.0 * (freq / c0).log2()).round() as i64;
    let octave = steps.div_euclid(12);
    let index = steps.rem_euclid(12) as usize;
    Some(format!("{}{}", NOTE_NAMES[index], octave))
}
