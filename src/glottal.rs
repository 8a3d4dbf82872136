//! Glottal source: harmonic amplitude tables and the periodic wavetable the
//! primary oscillator plays.

use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::error::SynthError;

/// Number of harmonic slots, DC included.
pub const HARMONIC_TABLE_LEN: usize = 512;
pub const WAVETABLE_LEN: usize = 2048;
pub const MIN_CLOSED_QUOTIENT: f64 = 0.1;
pub const MAX_CLOSED_QUOTIENT: f64 = 0.9;

/// Which closed-quotient mapping shapes the pulse.
///
/// The voice is first built with the gentler onset curve; every live
/// parameter update regenerates it with the steeper sustain curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiltCurve {
    /// `2.5 - 1.7 * cq`: 0.1 -> 2.33 (soft), 0.9 -> 0.97 (bright).
    Onset,
    /// `3.5 - 3.0 * cq`: 0.1 -> 3.2 (dull), 0.9 -> 0.8 (buzzy).
    Sustain,
}

impl TiltCurve {
    pub fn exponent(self, closed_quotient: f64) -> f64 {
        let cq = closed_quotient.clamp(MIN_CLOSED_QUOTIENT, MAX_CLOSED_QUOTIENT);
        match self {
            TiltCurve::Onset => 2.5 - cq * 1.7,
            TiltCurve::Sustain => 3.5 - cq * 3.0,
        }
    }
}

/// Fourier coefficients of one glottal cycle: cosine terms in `real`, sine
/// terms in `imag`. Slot 0 is DC and slot 1 the fundamental.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicTable {
    pub real: Vec<f64>,
    pub imag: Vec<f64>,
}

impl HarmonicTable {
    /// Sine-phase harmonics with amplitude `1 / n^power`, no DC.
    pub fn glottal(closed_quotient: f64, curve: TiltCurve) -> Self {
        let power = curve.exponent(closed_quotient);
        let real = vec![0.0; HARMONIC_TABLE_LEN];
        let mut imag = vec![0.0; HARMONIC_TABLE_LEN];
        for (n, amp) in imag.iter_mut().enumerate().skip(1) {
            *amp = 1.0 / (n as f64).powf(power);
        }
        Self { real, imag }
    }

    pub fn len(&self) -> usize {
        self.imag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imag.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Wavetable {
    samples: Vec<f32>,
}

impl Wavetable {
    /// Inverse-transforms `table` into a single cycle, keeping harmonics up to
    /// `max_harmonic` so the table does not alias at the pitch it is built for.
    pub fn from_harmonics(table: &HarmonicTable, max_harmonic: usize) -> Result<Self, SynthError> {
        let len = WAVETABLE_LEN;
        let top = max_harmonic
            .min(table.len().saturating_sub(1))
            .min(len / 2 - 1);
        if top == 0 {
            return Err(SynthError::waveform("no harmonics below Nyquist"));
        }

        let mut bins = vec![Complex64::new(0.0, 0.0); len];
        for n in 1..=top {
            let re = table.real.get(n).copied().unwrap_or(0.0);
            let im = table.imag.get(n).copied().unwrap_or(0.0);
            // a*cos + b*sin == (a - jb)/2 * e^{jθ} + (a + jb)/2 * e^{-jθ}
            bins[n] = Complex64::new(re / 2.0, -im / 2.0);
            bins[len - n] = Complex64::new(re / 2.0, im / 2.0);
        }

        let mut planner = FftPlanner::<f64>::new();
        let ifft = planner.plan_fft_inverse(len);
        ifft.process(&mut bins);

        let peak = bins.iter().map(|c| c.re.abs()).fold(0.0f64, f64::max);
        if !peak.is_finite() || peak <= 0.0 || bins.iter().any(|c| !c.re.is_finite()) {
            return Err(SynthError::waveform("degenerate harmonic table"));
        }
        let samples = bins.iter().map(|c| (c.re / peak) as f32).collect();
        Ok(Self { samples })
    }

    /// Glottal pulse for `closed_quotient`, band-limited for `pitch` at
    /// `sample_rate`.
    pub fn glottal(
        closed_quotient: f64,
        curve: TiltCurve,
        pitch: f64,
        sample_rate: f64,
    ) -> Result<Self, SynthError> {
        let table = HarmonicTable::glottal(closed_quotient, curve);
        Self::from_harmonics(&table, max_harmonic(pitch, sample_rate))
    }

    /// Linearly interpolated sample at `phase` in cycles, `[0, 1)`.
    #[inline]
    pub fn sample(&self, phase: f64) -> f32 {
        let len = self.samples.len();
        let pos = phase.rem_euclid(1.0) * len as f64;
        let idx = pos as usize % len;
        let next = (idx + 1) % len;
        let frac = (pos - pos.floor()) as f32;
        self.samples[idx] + (self.samples[next] - self.samples[idx]) * frac
    }
}

/// Highest harmonic of `pitch` that stays below Nyquist, with headroom for
/// vibrato and jitter excursions.
pub fn max_harmonic(pitch: f64, sample_rate: f64) -> usize {
    let top = pitch.max(1.0) + 16.0;
    let n = (sample_rate / 2.0 / top).floor();
    if n.is_finite() && n >= 1.0 {
        n as usize
    } else {
        1
    }
}
