//! Byte-scaled magnitude spectrum in the manner of a browser analyser node,
//! plus the coarse downsampling used for the display overlay.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

type Complex32 = Complex<f32>;

/// Smoothed magnitude analyser over fixed-size frames.
pub struct AnalyserSpectrum {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex32>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl AnalyserSpectrum {
    pub fn new(fft_size: usize, smoothing: f32, min_db: f32, max_db: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            window: blackman_window(fft_size),
            buffer: vec![Complex32::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            smoothing: smoothing.clamp(0.0, 1.0),
            min_db,
            max_db,
        }
    }

    /// Folds `frame` into the running magnitudes and returns them mapped
    /// from `[min_db, max_db]` onto `0..=255`. Short frames are zero-padded
    /// at the front.
    pub fn byte_frequency_data(&mut self, frame: &[f32]) -> Vec<u8> {
        let n = self.buffer.len();
        let offset = n.saturating_sub(frame.len());
        let tail = &frame[frame.len().saturating_sub(n)..];
        for (i, v) in self.buffer.iter_mut().enumerate() {
            let sample = if i < offset { 0.0 } else { tail[i - offset] };
            *v = Complex32::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        let range = self.max_db - self.min_db;
        let tau = self.smoothing;
        self.smoothed
            .iter_mut()
            .zip(self.buffer.iter())
            .map(|(smoothed, bin)| {
                let mag = bin.norm() * scale;
                let next = tau * *smoothed + (1.0 - tau) * mag;
                *smoothed = if next.is_finite() { next } else { 0.0 };
                let db = 20.0 * smoothed.log10();
                if db.is_finite() {
                    ((255.0 / range) * (db - self.min_db)).clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
            .collect()
    }
}

/// Every `step`-th bin below `max_hz`, scaled to `byte / 255 * boost`. The
/// step is picked so roughly `points` values come out.
pub fn display_spectrum(
    bytes: &[u8],
    sample_rate: f64,
    max_hz: f64,
    points: usize,
    boost: f32,
) -> Vec<f32> {
    let nyquist = sample_rate / 2.0;
    if bytes.is_empty() || nyquist <= 0.0 || points == 0 {
        return Vec::new();
    }
    let end = ((bytes.len() as f64 * (max_hz / nyquist)).floor() as usize).min(bytes.len());
    let step = (end / points).max(1);
    bytes[..end]
        .iter()
        .step_by(step)
        .map(|b| *b as f32 / 255.0 * boost)
        .collect()
}

fn blackman_window(n: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42f32, 0.5f32, 0.08f32);
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
