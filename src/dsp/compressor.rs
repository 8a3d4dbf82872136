//! Streaming feed-forward compressor with a soft knee and automatic makeup
//! gain, shaped like a browser dynamics-compressor node.

use super::{amp_to_db, db_to_amp};

/// Exponent applied to the full-range gain when deriving makeup.
const MAKEUP_EXPONENT: f64 = 0.6;
const KNEE_SEARCH_STEPS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub threshold_db: f64,
    pub knee_db: f64,
    pub ratio: f64,
    /// Seconds.
    pub attack: f64,
    /// Seconds.
    pub release: f64,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

/// Static transfer curve. Linear below the threshold, an exponential knee
/// from the threshold up to `threshold + knee`, then a constant `1 / ratio`
/// slope in dB.
#[derive(Debug, Clone, Copy)]
struct StaticCurve {
    linear_threshold: f64,
    knee_threshold: f64,
    knee_threshold_db: f64,
    knee_out_db: f64,
    slope: f64,
    k: f64,
}

impl StaticCurve {
    fn new(settings: &CompressorSettings) -> Self {
        let knee_threshold_db = settings.threshold_db + settings.knee_db.max(0.0);
        let mut curve = Self {
            linear_threshold: db_to_amp(settings.threshold_db),
            knee_threshold: db_to_amp(knee_threshold_db),
            knee_threshold_db,
            knee_out_db: knee_threshold_db,
            slope: 1.0 / settings.ratio.max(1.0),
            k: 1.0,
        };
        curve.k = curve.k_at_slope(curve.slope);
        curve.knee_out_db = amp_to_db(curve.knee(curve.knee_threshold, curve.k));
        curve
    }

    fn knee(&self, x: f64, k: f64) -> f64 {
        if x < self.linear_threshold {
            x
        } else {
            self.linear_threshold + (1.0 - (-k * (x - self.linear_threshold)).exp()) / k
        }
    }

    /// dB-domain slope of the knee at `x`.
    fn knee_slope(&self, x: f64, k: f64) -> f64 {
        if x < self.linear_threshold {
            return 1.0;
        }
        let x2 = x * 1.001;
        let dy = amp_to_db(self.knee(x2, k)) - amp_to_db(self.knee(x, k));
        dy / (amp_to_db(x2) - amp_to_db(x))
    }

    /// Knee sharpness whose slope at the top of the knee is `slope`.
    fn k_at_slope(&self, slope: f64) -> f64 {
        let (mut lo, mut hi, mut k) = (0.1_f64, 10_000.0_f64, 5.0_f64);
        for _ in 0..KNEE_SEARCH_STEPS {
            if self.knee_slope(self.knee_threshold, k) < slope {
                hi = k;
            } else {
                lo = k;
            }
            k = (lo * hi).sqrt();
        }
        k
    }

    fn apply(&self, x: f64) -> f64 {
        if x < self.knee_threshold {
            self.knee(x, self.k)
        } else {
            db_to_amp(self.knee_out_db + self.slope * (amp_to_db(x) - self.knee_threshold_db))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compressor {
    curve: StaticCurve,
    makeup: f64,
    attack_coeff: f64,
    release_coeff: f64,
    /// Smoothed gain reduction in dB, always <= 0.
    gain_db: f64,
}

impl Compressor {
    pub fn new(settings: CompressorSettings, sample_rate: f64) -> Self {
        let curve = StaticCurve::new(&settings);
        let full_range = curve.apply(1.0);
        Self {
            curve,
            makeup: (1.0 / full_range).powf(MAKEUP_EXPONENT),
            attack_coeff: (-1.0 / (settings.attack * sample_rate).max(1.0)).exp(),
            release_coeff: (-1.0 / (settings.release * sample_rate).max(1.0)).exp(),
            gain_db: 0.0,
        }
    }

    /// Output level for an input level, both in dB, before makeup.
    pub fn curve(&self, input_db: f64) -> f64 {
        amp_to_db(self.curve.apply(db_to_amp(input_db)))
    }

    /// Linear gain applied after gain reduction.
    pub fn makeup(&self) -> f64 {
        self.makeup
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let level_db = amp_to_db(input);
        let target = self.curve(level_db) - level_db;
        // More reduction uses the attack constant, recovery the release one.
        let coeff = if target < self.gain_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain_db = target + (self.gain_db - target) * coeff;
        input * db_to_amp(self.gain_db) * self.makeup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn compressor() -> Compressor {
        Compressor::new(CompressorSettings::default(), 48_000.0)
    }

    #[test]
    fn quiet_signals_pass_untouched() {
        let comp = compressor();
        assert_abs_diff_eq!(comp.curve(-60.0), -60.0, epsilon = 1e-9);
        assert_abs_diff_eq!(comp.curve(-24.0), -24.0, epsilon = 1e-9);
    }

    #[test]
    fn knee_starts_at_threshold() {
        let comp = compressor();
        assert!(comp.curve(-23.0) < -23.0);
        // The knee is continuous into the ratio segment.
        let top = comp.curve(6.0);
        assert_abs_diff_eq!(comp.curve(6.0 - 1e-6), top, epsilon = 1e-4);
        assert_abs_diff_eq!(comp.curve(6.0 + 1e-6), top, epsilon = 1e-4);
    }

    #[test]
    fn loud_signals_follow_the_ratio() {
        let comp = compressor();
        assert_abs_diff_eq!(comp.curve(18.0) - comp.curve(6.0), 12.0 / 12.0, epsilon = 1e-9);
        let knee_end = (comp.curve(6.0) - comp.curve(6.0 - 0.01)) / 0.01;
        assert_abs_diff_eq!(knee_end, 1.0 / 12.0, epsilon = 0.01);
    }

    #[test]
    fn makeup_lifts_full_scale_back_up() {
        let comp = compressor();
        let full_range_db = comp.curve(0.0);
        assert!(full_range_db < -5.0 && full_range_db > -7.0, "full range {full_range_db}");
        assert_abs_diff_eq!(amp_to_db(comp.makeup()), -0.6 * full_range_db, epsilon = 1e-9);

        let mut comp = compressor();
        let out = comp.process(0.001);
        assert_abs_diff_eq!(out, 0.001 * comp.makeup(), epsilon = 1e-12);
    }

    #[test]
    fn sustained_overload_is_reduced() {
        let mut comp = compressor();
        let mut out = 0.0;
        for i in 0..48_000 {
            let x = if i % 2 == 0 { 4.0 } else { -4.0 };
            out = comp.process(x);
        }
        assert!(out.abs() < 1.0, "out {out}");
        assert!(comp.gain_db < -15.0, "reduction {}", comp.gain_db);
    }
}
