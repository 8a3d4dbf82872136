use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Looping buffer of white noise, the way a looped noise buffer source plays.
#[derive(Debug, Clone)]
pub struct NoiseLoop {
    buffer: Vec<f32>,
    pos: usize,
}

impl NoiseLoop {
    /// Two seconds of uniform noise in `[-1, 1)`.
    pub fn new(sample_rate: f64, seed: u64) -> Self {
        let len = ((sample_rate * 2.0) as usize).max(1);
        let mut rng = Pcg32::seed_from_u64(seed);
        let buffer = (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        Self { buffer, pos: 0 }
    }

    #[inline]
    pub fn next(&mut self) -> f64 {
        let sample = self.buffer[self.pos];
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
        sample as f64
    }
}
