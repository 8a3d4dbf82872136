use std::f64::consts::TAU;

/// Phase in cycles, wrapped into `[0, 1)`.
#[derive(Debug, Clone)]
pub struct PhaseAccumulator {
    phase: f64,
    inv_sample_rate: f64,
}

impl PhaseAccumulator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            inv_sample_rate: 1.0 / sample_rate,
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Returns the current phase and steps by `freq`. Returns the phase
    /// increment alongside for band-limiting.
    #[inline]
    pub fn advance(&mut self, freq: f64) -> (f64, f64) {
        let current = self.phase;
        let dt = (freq * self.inv_sample_rate).clamp(0.0, 0.5);
        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        (current, dt)
    }
}

#[inline]
pub fn sine(phase: f64) -> f64 {
    (phase * TAU).sin()
}

#[inline]
pub fn triangle(phase: f64) -> f64 {
    if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    }
}

/// Polynomial band-limited step residual.
#[inline]
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

/// Rising sawtooth with PolyBLEP correction at the wrap.
#[inline]
pub fn saw(phase: f64, dt: f64) -> f64 {
    2.0 * phase - 1.0 - poly_blep(phase, dt)
}

/// Frequency ratio of a detune in cents.
pub fn cents_ratio(cents: f64) -> f64 {
    2f64.powf(cents / 1200.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn phase_wraps() {
        let mut acc = PhaseAccumulator::new(100.0);
        for _ in 0..155 {
            acc.advance(10.0);
        }
        assert_abs_diff_eq!(acc.phase(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn shapes_hit_their_extremes() {
        assert_abs_diff_eq!(sine(0.25), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(triangle(0.25), 1.0);
        assert_abs_diff_eq!(triangle(0.75), -1.0);
        assert_abs_diff_eq!(saw(0.5, 0.01), 0.0);
    }

    #[test]
    fn saw_is_smoothed_at_the_wrap() {
        let dt = 0.01;
        let before = saw(1.0 - dt / 2.0, dt);
        let after = saw(dt / 2.0, dt);
        let naive = (1.0 - dt) - (dt - 1.0);
        assert!((before - after).abs() < naive);
    }

    #[test]
    fn three_cents() {
        assert_abs_diff_eq!(cents_ratio(1200.0), 2.0, epsilon = 1e-12);
        assert!(cents_ratio(3.0) > 1.0 && cents_ratio(-3.0) < 1.0);
    }
}
