//! Linear-prediction formant estimation.
//!
//! A frame is pre-emphasized and windowed, its autocorrelation is solved
//! for an all-pole model by Levinson-Durbin, and the model's magnitude
//! response is scanned for peaks. The two lowest peaks are F1 and F2.

use std::f64::consts::PI;

use num_complex::Complex64;

pub const LPC_ORDER: usize = 12;
pub const PRE_EMPHASIS: f64 = 0.95;
pub const SCAN_MIN_HZ: f64 = 200.0;
pub const SCAN_MAX_HZ: f64 = 4000.0;
pub const SCAN_STEP_HZ: f64 = 25.0;

/// All-pole model `1 / A(z)` of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LpcModel {
    /// `[1, c1, .., cp]`, the error filter `A(z) = 1 + sum(ck z^-k)`.
    /// Each `ck` is the negated predictor coefficient.
    pub coeffs: Vec<f64>,
    pub error: f64,
}

impl LpcModel {
    /// `|1 / A(e^{jw})|` at `freq`, summed directly.
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq / sample_rate;
        let a: Complex64 = self
            .coeffs
            .iter()
            .enumerate()
            .map(|(k, c)| Complex64::from_polar(*c, -omega * k as f64))
            .sum();
        1.0 / a.norm()
    }
}

/// Pre-emphasis followed by a Hamming window.
pub fn preprocess(frame: &[f32]) -> Vec<f64> {
    let n = frame.len();
    if n == 0 {
        return Vec::new();
    }
    let mut x = Vec::with_capacity(n);
    x.push(frame[0] as f64);
    for pair in frame.windows(2) {
        x.push(pair[1] as f64 - PRE_EMPHASIS * pair[0] as f64);
    }
    for (v, w) in x.iter_mut().zip(hamming_window(n)) {
        *v *= w;
    }
    x
}

pub fn hamming_window(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    let mut w = Vec::with_capacity(n);
    for i in 0..n {
        let val = 0.54 - 0.46 * ((2.0 * PI * i as f64) / (n as f64 - 1.0)).cos();
        w.push(val);
    }
    w
}

/// Autocorrelation for lags `0..=max_lag`. The frame is not mean-centered.
pub fn autocorrelation(x: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag)
        .map(|lag| {
            x.iter()
                .zip(x.iter().skip(lag))
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// Solves the normal equations for an order-`order` predictor.
///
/// Returns `None` when the prediction error reaches zero or goes negative
/// before the last order, or anything turns non-finite.
pub fn levinson_durbin(r: &[f64], order: usize) -> Option<LpcModel> {
    if order == 0 || r.len() < order + 1 {
        return None;
    }

    // Predictor coefficients, a[0] unused.
    let mut a = vec![0.0f64; order + 1];
    let mut e = r[0];

    for k in 1..=order {
        if !(e.is_finite() && e > 0.0) {
            return None;
        }
        let mut acc = r[k];
        for j in 1..k {
            acc -= a[j] * r[k - j];
        }
        let lambda = acc / e;
        let a_prev = a.clone();
        for j in 1..k {
            a[j] = a_prev[j] - lambda * a_prev[k - j];
        }
        a[k] = lambda;
        e *= 1.0 - lambda * lambda;
    }

    if !e.is_finite() || a.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut coeffs = Vec::with_capacity(order + 1);
    coeffs.push(1.0);
    coeffs.extend(a.iter().skip(1).map(|v| -v));
    Some(LpcModel { coeffs, error: e })
}

/// Model magnitude from [`SCAN_MIN_HZ`] to [`SCAN_MAX_HZ`], one entry per
/// [`SCAN_STEP_HZ`].
pub fn response_scan(model: &LpcModel, sample_rate: f64) -> Vec<(f64, f64)> {
    let steps = ((SCAN_MAX_HZ - SCAN_MIN_HZ) / SCAN_STEP_HZ).round() as usize;
    (0..=steps)
        .map(|i| {
            let freq = SCAN_MIN_HZ + i as f64 * SCAN_STEP_HZ;
            (freq, model.magnitude(freq, sample_rate))
        })
        .collect()
}

pub fn find_peaks(scan: &[(f64, f64)]) -> Vec<f64> {
    let mut peaks: Vec<f64> = scan
        .windows(3)
        .filter(|w| w[1].1 > w[0].1 && w[1].1 > w[2].1)
        .map(|w| w[1].0)
        .collect();
    peaks.sort_by(|a, b| a.total_cmp(b));
    peaks
}

/// F1 and F2 of `frame`, or `None` when the model degenerates or fewer than
/// two peaks show up.
pub fn estimate_formants(frame: &[f32], sample_rate: f64, order: usize) -> Option<(f64, f64)> {
    if frame.len() <= order {
        return None;
    }
    let x = preprocess(frame);
    let r = autocorrelation(&x, order);
    let model = levinson_durbin(&r, order)?;
    let peaks = find_peaks(&response_scan(&model, sample_rate));
    match peaks.as_slice() {
        [f1, f2, ..] => Some((*f1, *f2)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Impulse train at `f0` through two-pole resonators, peak-normalized.
    pub(crate) fn vowel(
        sample_rate: f64,
        f0: f64,
        formants: &[(f64, f64)],
        warmup: usize,
        len: usize,
    ) -> Vec<f32> {
        let period = (sample_rate / f0).round() as usize;
        let total = warmup + len;
        let mut signal: Vec<f64> = (0..total)
            .map(|i| if i % period == 0 { 1.0 } else { 0.0 })
            .collect();
        for &(freq, bw) in formants {
            let r = (-PI * bw / sample_rate).exp();
            let theta = 2.0 * PI * freq / sample_rate;
            let a1 = -2.0 * r * theta.cos();
            let a2 = r * r;
            let (mut y1, mut y2) = (0.0, 0.0);
            for v in signal.iter_mut() {
                let y = *v - a1 * y1 - a2 * y2;
                y2 = y1;
                y1 = y;
                *v = y;
            }
        }
        let tail = &signal[warmup..];
        let peak = tail.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        tail.iter().map(|v| (v / peak * 0.5) as f32).collect()
    }

    #[test]
    fn first_order_process() {
        // R[k] = 0.5^k is the autocorrelation of an AR(1) process with a = 0.5.
        let r = [1.0, 0.5, 0.25, 0.125];
        let model = levinson_durbin(&r, 3).unwrap();
        assert_eq!(model.coeffs.len(), 4);
        assert_abs_diff_eq!(model.coeffs[1], -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(model.coeffs[2], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.coeffs[3], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.error, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn zero_energy_aborts() {
        assert!(levinson_durbin(&[0.0; 13], 12).is_none());
        assert!(estimate_formants(&[0.0; 512], 11_025.0, LPC_ORDER).is_none());
    }

    #[test]
    fn short_frames_are_rejected() {
        assert!(levinson_durbin(&[1.0, 0.5], 12).is_none());
        assert!(estimate_formants(&[0.1; 12], 11_025.0, LPC_ORDER).is_none());
    }

    #[test]
    fn pre_emphasis_keeps_the_first_sample() {
        let x = preprocess(&[1.0, 1.0, 1.0]);
        // Hamming of length 3 is [0.08, 1.0, 0.08].
        assert_abs_diff_eq!(x[0], 0.08, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(x[2], 0.05 * 0.08, epsilon = 1e-12);
    }

    #[test]
    fn peaks_are_strict_maxima() {
        let scan = [(200.0, 1.0), (225.0, 3.0), (250.0, 3.0), (275.0, 1.0), (300.0, 2.0), (325.0, 1.0)];
        assert_eq!(find_peaks(&scan), vec![300.0]);
    }

    #[test]
    fn scan_covers_the_sweep() {
        let model = LpcModel {
            coeffs: vec![1.0],
            error: 1.0,
        };
        let scan = response_scan(&model, 11_025.0);
        assert_eq!(scan.len(), 153);
        assert_eq!(scan.first().map(|p| p.0), Some(200.0));
        assert_eq!(scan.last().map(|p| p.0), Some(4000.0));
        assert!(scan.iter().all(|p| p.1 == 1.0));
    }

    #[test]
    fn recovers_known_resonances() {
        let sr = 11_025.0;
        let frame = vowel(sr, 120.0, &[(500.0, 80.0), (1500.0, 100.0)], 1_000, 512);
        let (f1, f2) = estimate_formants(&frame, sr, LPC_ORDER).unwrap();
        assert!((f1 - 500.0).abs() <= 50.0, "f1 {f1}");
        assert!((f2 - 1500.0).abs() <= 50.0, "f2 {f2}");
    }

    #[test]
    fn estimation_is_repeatable() {
        let sr = 11_025.0;
        let frame = vowel(sr, 140.0, &[(700.0, 90.0), (1200.0, 110.0)], 1_000, 512);
        let first = estimate_formants(&frame, sr, LPC_ORDER);
        let second = estimate_formants(&frame, sr, LPC_ORDER);
        assert!(first.is_some());
        assert_eq!(first, second);
    }
}
