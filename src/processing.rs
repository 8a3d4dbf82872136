use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ringbuf::HeapConsumer;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::lpc;
use crate::spectrum::{display_spectrum, AnalyserSpectrum};
use crate::types::AnalyzedFormants;

type Complex32 = Complex<f32>;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub frame_size: usize,
    pub interval: Duration,
    pub rms_gate: f32,
    pub lpc_order: usize,
    /// Rate frames are resampled to before LPC.
    pub lpc_sample_rate: u32,
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
    pub display_max_hz: f64,
    pub display_points: usize,
    pub display_boost: f32,
}

impl AnalyzerConfig {
    pub const FRAME_SIZE: usize = 2048;
    pub const INTERVAL_MS: u64 = 50;
    pub const RMS_GATE: f32 = 0.02;
    pub const LPC_ORDER: usize = lpc::LPC_ORDER;
    pub const LPC_SAMPLE_RATE: u32 = 11_025;
    pub const SMOOTHING: f32 = 0.5;
    pub const MIN_DB: f32 = -100.0;
    pub const MAX_DB: f32 = -30.0;
    pub const DISPLAY_MAX_HZ: f64 = 5500.0;
    pub const DISPLAY_POINTS: usize = 60;
    pub const DISPLAY_BOOST: f32 = 4.0;
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            frame_size: Self::FRAME_SIZE,
            interval: Duration::from_millis(Self::INTERVAL_MS),
            rms_gate: Self::RMS_GATE,
            lpc_order: Self::LPC_ORDER,
            lpc_sample_rate: Self::LPC_SAMPLE_RATE,
            smoothing: Self::SMOOTHING,
            min_db: Self::MIN_DB,
            max_db: Self::MAX_DB,
            display_max_hz: Self::DISPLAY_MAX_HZ,
            display_points: Self::DISPLAY_POINTS,
            display_boost: Self::DISPLAY_BOOST,
        }
    }
}

/// Turns one time-domain frame into an [`AnalyzedFormants`] record.
pub struct FrameAnalyzer {
    cfg: AnalyzerConfig,
    sample_rate: u32,
    spectrum: AnalyserSpectrum,
    resampler: Option<Resampler>,
}

struct Resampler {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    in_buf: Vec<Complex32>,
    out_buf: Vec<Complex32>,
    rate: f64,
}

impl FrameAnalyzer {
    pub fn new(cfg: &AnalyzerConfig, sample_rate: u32) -> Self {
        let frame_size = cfg.frame_size;
        let proc_frame_size =
            (frame_size as f64 * cfg.lpc_sample_rate as f64 / sample_rate as f64).round() as usize;
        let resampler = (sample_rate > cfg.lpc_sample_rate && proc_frame_size > cfg.lpc_order)
            .then(|| {
                let mut planner = FftPlanner::<f32>::new();
                Resampler {
                    fft: planner.plan_fft_forward(frame_size),
                    ifft: planner.plan_fft_inverse(proc_frame_size),
                    in_buf: vec![Complex32::new(0.0, 0.0); frame_size],
                    out_buf: vec![Complex32::new(0.0, 0.0); proc_frame_size],
                    rate: proc_frame_size as f64 * sample_rate as f64 / frame_size as f64,
                }
            });
        Self {
            cfg: cfg.clone(),
            sample_rate,
            spectrum: AnalyserSpectrum::new(frame_size, cfg.smoothing, cfg.min_db, cfg.max_db),
            resampler,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Rate the LPC model runs at.
    pub fn lpc_rate(&self) -> f64 {
        self.resampler
            .as_ref()
            .map(|r| r.rate)
            .unwrap_or(self.sample_rate as f64)
    }

    /// The per-tick analysis. The magnitude spectrum is updated on every
    /// call, gated or not, so its smoothing runs continuously.
    pub fn analyze(&mut self, frame: &[f32]) -> AnalyzedFormants {
        let bytes = self.spectrum.byte_frequency_data(frame);

        let rms = rms_level(frame);
        if !(rms >= self.cfg.rms_gate) {
            return AnalyzedFormants::silent();
        }

        let spectrum = display_spectrum(
            &bytes,
            self.sample_rate as f64,
            self.cfg.display_max_hz,
            self.cfg.display_points,
            self.cfg.display_boost,
        );

        let formants = match &mut self.resampler {
            Some(r) if frame.len() == r.in_buf.len() => {
                let down = fft_resample(
                    frame,
                    r.out_buf.len(),
                    r.fft.as_ref(),
                    r.ifft.as_ref(),
                    &mut r.in_buf,
                    &mut r.out_buf,
                );
                lpc::estimate_formants(&down, r.rate, self.cfg.lpc_order)
            }
            _ => lpc::estimate_formants(frame, self.sample_rate as f64, self.cfg.lpc_order),
        };

        let (f1, f2) = formants.unwrap_or((0.0, 0.0));
        AnalyzedFormants {
            f1,
            f2,
            energy: rms,
            spectrum,
        }
    }
}

/// The most recent `len` input samples, zero-filled until enough arrive.
pub struct FrameHistory {
    samples: VecDeque<f32>,
    len: usize,
}

impl FrameHistory {
    pub fn new(len: usize) -> Self {
        Self {
            samples: std::iter::repeat(0.0).take(len).collect(),
            len,
        }
    }

    /// Drains everything waiting in `consumer`.
    pub fn fill_from(&mut self, consumer: &mut HeapConsumer<f32>) -> usize {
        let mut taken = 0;
        while let Some(s) = consumer.pop() {
            self.push(s);
            taken += 1;
        }
        taken
    }

    pub fn push(&mut self, sample: f32) {
        self.samples.push_back(sample);
        if self.samples.len() > self.len {
            self.samples.pop_front();
        }
    }

    pub fn frame(&mut self) -> &[f32] {
        self.samples.make_contiguous()
    }
}

pub(crate) fn fft_resample(
    x: &[f32],
    out_len: usize,
    fft: &dyn Fft<f32>,
    ifft: &dyn Fft<f32>,
    in_buf: &mut [Complex32],
    out_buf: &mut [Complex32],
) -> Vec<f32> {
    let in_len = x.len();
    if in_len == 0 || out_len == 0 {
        return Vec::new();
    }

    for (i, v) in in_buf.iter_mut().enumerate() {
        let sample = if i < in_len { x[i] } else { 0.0 };
        *v = Complex32::new(sample, 0.0);
    }
    fft.process(in_buf);

    for v in out_buf.iter_mut() {
        *v = Complex32::new(0.0, 0.0);
    }

    let in_half = in_len / 2;
    let out_half = out_len / 2;
    // Bins above the new Nyquist are dropped.
    let k_max = in_half.min(out_half.saturating_sub(1).max(1));

    out_buf[0] = in_buf[0];
    for k in 1..=k_max.min(out_len - 1) {
        out_buf[k] = in_buf[k];
        out_buf[out_len - k] = in_buf[in_len - k];
    }

    ifft.process(out_buf);

    let scale = 1.0 / (in_len as f32);
    out_buf.iter().map(|c| c.re * scale).collect()
}

pub fn rms_level(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for &v in x {
        sum += (v as f64) * (v as f64);
    }
    let rms = (sum / x.len() as f64).sqrt();
    rms as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lpc::tests::vowel;
    use ringbuf::HeapRb;

    #[test]
    fn rms_of_a_square_wave() {
        let x: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert!((rms_level(&x) - 0.5).abs() < 1e-6);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn history_keeps_the_latest_samples() {
        let mut history = FrameHistory::new(4);
        assert_eq!(history.frame(), &[0.0; 4]);

        let (mut producer, mut consumer) = HeapRb::<f32>::new(16).split();
        producer.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(history.fill_from(&mut consumer), 6);
        assert_eq!(history.frame(), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn resampling_preserves_a_low_tone() {
        let mut planner = FftPlanner::<f32>::new();
        let (n, m) = (2048, 470);
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(m);
        let mut in_buf = vec![Complex32::new(0.0, 0.0); n];
        let mut out_buf = vec![Complex32::new(0.0, 0.0); m];
        // Whole number of cycles so the tone sits exactly on bin 10.
        let x: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 10.0 * i as f32 / n as f32).sin())
            .collect();
        let y = fft_resample(&x, m, fft.as_ref(), ifft.as_ref(), &mut in_buf, &mut out_buf);
        assert_eq!(y.len(), m);
        for (i, v) in y.iter().enumerate() {
            let expected = (2.0 * std::f32::consts::PI * 10.0 * i as f32 / m as f32).sin();
            assert!((v - expected).abs() < 1e-3, "sample {i}: {v} vs {expected}");
        }
    }

    #[test]
    fn quiet_frames_are_gated() {
        let mut analyzer = FrameAnalyzer::new(&AnalyzerConfig::default(), 48_000);
        let frame = vowel(48_000.0, 120.0, &[(500.0, 80.0), (1500.0, 100.0)], 4_000, 2048);
        let quiet: Vec<f32> = frame.iter().map(|v| v * 0.01).collect();
        assert!(rms_level(&quiet) < AnalyzerConfig::RMS_GATE);
        assert_eq!(analyzer.analyze(&quiet), AnalyzedFormants::silent());
        assert_eq!(analyzer.analyze(&[0.0; 2048]), AnalyzedFormants::silent());
    }

    #[test]
    fn finds_formants_in_a_native_rate_frame() {
        let mut analyzer = FrameAnalyzer::new(&AnalyzerConfig::default(), 48_000);
        assert!((analyzer.lpc_rate() - 11_015.625).abs() < 1e-9);

        let frame = vowel(48_000.0, 120.0, &[(500.0, 80.0), (1500.0, 100.0)], 4_000, 2048);
        let result = analyzer.analyze(&frame);
        assert!(result.energy >= AnalyzerConfig::RMS_GATE);
        assert!((result.f1 - 500.0).abs() <= 50.0, "f1 {}", result.f1);
        assert!((result.f2 - 1500.0).abs() <= 50.0, "f2 {}", result.f2);
        assert_eq!(result.spectrum.len(), 78);
        assert!(result.spectrum.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn same_frame_same_formants() {
        let mut analyzer = FrameAnalyzer::new(&AnalyzerConfig::default(), 48_000);
        let frame = vowel(48_000.0, 150.0, &[(650.0, 80.0), (1100.0, 100.0)], 4_000, 2048);
        let a = analyzer.analyze(&frame);
        let b = analyzer.analyze(&frame);
        assert_eq!((a.f1, a.f2), (b.f1, b.f2));
    }

    #[test]
    fn low_rate_input_skips_resampling() {
        let mut analyzer = FrameAnalyzer::new(&AnalyzerConfig::default(), 8_000);
        assert_eq!(analyzer.lpc_rate(), 8_000.0);
        let frame = vowel(8_000.0, 120.0, &[(500.0, 80.0), (1500.0, 100.0)], 1_000, 2048);
        let result = analyzer.analyze(&frame);
        assert!(result.energy > 0.0);
    }
}
