//! Second-order filter sections used by the voice graph.
//!
//! Coefficients follow the Audio EQ Cookbook. The bandpass has a 0 dB peak
//! so cascading formant sections does not pile up gain at the centers.

use std::f64::consts::PI;

/// Lowest Q accepted before a division.
const MIN_Q: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Identity section.
    pub fn passthrough() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    pub fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let (sin_omega, cos_omega) = omega(cutoff, sample_rate);
        let alpha = sin_omega / (2.0 * q.max(MIN_Q));

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        Self::normalized(b0, b1, b2, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha)
    }

    /// Bandpass with unity gain at `center`.
    pub fn bandpass(center: f64, q: f64, sample_rate: f64) -> Self {
        let (sin_omega, cos_omega) = omega(center, sample_rate);
        let alpha = sin_omega / (2.0 * q.max(MIN_Q));

        Self::normalized(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha)
    }

    /// Peaking EQ; `db_gain` of zero is flat.
    pub fn peaking(frequency: f64, q: f64, db_gain: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(db_gain / 40.0);
        let (sin_omega, cos_omega) = omega(frequency, sample_rate);
        let alpha = sin_omega / (2.0 * q.max(MIN_Q));

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_omega,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_omega,
            1.0 - alpha / a,
        )
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `freq`.
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Keeps the design frequency strictly inside (0, Nyquist).
fn omega(freq: f64, sample_rate: f64) -> (f64, f64) {
    let nyquist = sample_rate / 2.0;
    let freq = freq.clamp(1.0, nyquist * 0.99);
    (2.0 * PI * freq / sample_rate).sin_cos()
}

/// Converts a resonance expressed in dB to a linear Q.
pub fn q_from_db(resonance_db: f64) -> f64 {
    10.0_f64.powf(resonance_db / 20.0)
}

/// Direct form I biquad.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        Self::new(BiquadCoeffs::lowpass(cutoff, q, sample_rate))
    }

    /// Swaps coefficients without clearing the delay line.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let mut output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2
            - c.a1 * self.y1
            - c.a2 * self.y2;
        if !output.is_finite() {
            // A blown-up section restarts from silence instead of poisoning the chain.
            self.reset();
            output = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SR: f64 = 48_000.0;

    #[test]
    fn lowpass_passes_dc() {
        let mut filter = BiquadFilter::lowpass(1000.0, 0.707, SR);
        let mut last = 0.0;
        for _ in 0..2000 {
            last = filter.process(1.0);
        }
        assert_abs_diff_eq!(last, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn bandpass_peaks_at_unity() {
        let coeffs = BiquadCoeffs::bandpass(700.0, 7.0, SR);
        assert_abs_diff_eq!(coeffs.magnitude(700.0, SR), 1.0, epsilon = 1e-6);
        assert!(coeffs.magnitude(350.0, SR) < 0.2);
        assert!(coeffs.magnitude(1400.0, SR) < 0.2);
    }

    #[test]
    fn peaking_gain_at_center() {
        let coeffs = BiquadCoeffs::peaking(3000.0, 1.5, 8.0, SR);
        let db = 20.0 * coeffs.magnitude(3000.0, SR).log10();
        assert_abs_diff_eq!(db, 8.0, epsilon = 1e-6);

        let flat = BiquadCoeffs::peaking(3000.0, 1.5, 0.0, SR);
        assert_abs_diff_eq!(flat.magnitude(500.0, SR), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(flat.magnitude(3000.0, SR), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn lowpass_falls_twelve_db_per_octave() {
        let coeffs = BiquadCoeffs::lowpass(800.0, q_from_db(0.5), SR);
        let open = BiquadCoeffs::lowpass(12_000.0, q_from_db(0.5), SR);
        let drop = |f: f64| 20.0 * (open.magnitude(f, SR) / coeffs.magnitude(f, SR)).log10();
        assert!(drop(1600.0) > 10.5, "drop {}", drop(1600.0));
        assert!(drop(3200.0) - drop(1600.0) > 11.0);
    }

    #[test]
    fn out_of_range_design_stays_finite() {
        for coeffs in [
            BiquadCoeffs::bandpass(-50.0, 0.0, SR),
            BiquadCoeffs::bandpass(60_000.0, 5.0, SR),
            BiquadCoeffs::peaking(0.0, -1.0, 12.0, SR),
        ] {
            for v in [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2] {
                assert!(v.is_finite());
            }
        }
    }
}
