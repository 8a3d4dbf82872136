/// A parameter that glides exponentially toward its target, the way an audio
/// parameter ramps under a set-target-at-time call.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    value: f64,
    target: f64,
    /// Per-sample retention factor, `exp(-1 / (tau * fs))`.
    coeff: f64,
}

impl SmoothedParam {
    pub fn new(initial: f64, time_constant: f64, sample_rate: f64) -> Self {
        let samples = (time_constant * sample_rate).max(1.0);
        Self {
            value: initial,
            target: initial,
            coeff: (-1.0 / samples).exp(),
        }
    }

    /// Sets a new target. Non-finite values are dropped so they never reach a
    /// live parameter.
    pub fn set_target(&mut self, target: f64) -> bool {
        if target.is_finite() {
            self.target = target;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn next(&mut self) -> f64 {
        self.value = self.target + (self.value - self.target) * self.coeff;
        self.value
    }

    /// Advances `samples` steps at once.
    pub fn advance(&mut self, samples: usize) -> f64 {
        let decay = self.coeff.powi(samples as i32);
        self.value = self.target + (self.value - self.target) * decay;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reaches_63_percent_after_one_time_constant() {
        let mut param = SmoothedParam::new(0.0, 0.05, 1000.0);
        param.set_target(1.0);
        for _ in 0..50 {
            param.next();
        }
        assert_abs_diff_eq!(param.value(), 1.0 - (-1.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn advance_matches_stepping() {
        let mut stepped = SmoothedParam::new(100.0, 0.05, 48_000.0);
        let mut jumped = stepped.clone();
        stepped.set_target(200.0);
        jumped.set_target(200.0);
        for _ in 0..64 {
            stepped.next();
        }
        jumped.advance(64);
        assert_abs_diff_eq!(stepped.value(), jumped.value(), epsilon = 1e-9);
    }

    #[test]
    fn non_finite_targets_are_ignored() {
        let mut param = SmoothedParam::new(3.0, 0.05, 48_000.0);
        assert!(!param.set_target(f64::NAN));
        assert!(!param.set_target(f64::INFINITY));
        assert_eq!(param.target, 3.0);
        assert_eq!(param.next(), 3.0);
    }
}
