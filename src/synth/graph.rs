//! The realtime half of the synthesizer: a fixed voice graph rendered sample
//! by sample on the audio thread.
//!
//! ```text
//! glottal ─┐
//! saw +3c ─┤
//! saw -3c ─┼─► tilt LP² ─► F1 BP ─► F2 BP ─► F3 BP ─► singer's PK ─► boost PK ─► level ─► gain ─► compressor
//! sub F0/2 ┤
//! breath ──┘
//! ```
//!
//! Pitched oscillators share one frequency modulation signal (vibrato plus
//! filtered-noise jitter). Every control value is a [`SmoothedParam`]; filter
//! coefficients are recomputed once per control block. The tilt lowpass runs
//! as two identical sections for a 24 dB/octave slope, and the level stage
//! undoes the loss of the serial formant bandpasses.

use std::sync::Arc;

use crate::dsp::biquad::q_from_db;
use crate::dsp::oscillator::{cents_ratio, saw, sine, triangle};
use crate::dsp::{
    db_to_amp, BiquadCoeffs, BiquadFilter, Compressor, NoiseLoop, PhaseAccumulator, SmoothedParam,
};
use crate::envelope::{SINGERS_FORMANT_HZ, SINGERS_FORMANT_Q};
use crate::glottal::Wavetable;

use super::targets::{BandTarget, PeakTarget, VoiceTargets};
use super::SynthConfig;

/// Messages from the control thread. Applied in order; the last retune wins.
/// A replaced glottal wave is handed back by [`VoiceGraph::apply`] so it is
/// freed off the audio thread.
pub enum GraphCommand {
    Retune(VoiceTargets),
    Glottal(Arc<Wavetable>),
}

/// Filter sections between the source mix and the master gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SpectralTilt,
    Formant1,
    Formant2,
    Formant3,
    SingersFormant,
    HarmonicBoost,
}

/// Processing order of the filter sections.
pub const FILTER_CHAIN: [Stage; 6] = [
    Stage::SpectralTilt,
    Stage::Formant1,
    Stage::Formant2,
    Stage::Formant3,
    Stage::SingersFormant,
    Stage::HarmonicBoost,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Response {
    Lowpass,
    Bandpass,
    Peaking,
}

impl Stage {
    fn response(self) -> Response {
        match self {
            Stage::SpectralTilt => Response::Lowpass,
            Stage::Formant1 | Stage::Formant2 | Stage::Formant3 => Response::Bandpass,
            Stage::SingersFormant | Stage::HarmonicBoost => Response::Peaking,
        }
    }

    fn sections(self) -> usize {
        match self {
            Stage::SpectralTilt => SynthConfig::TILT_SECTIONS,
            _ => 1,
        }
    }

    /// Frequency, Q and gain a freshly built section starts from.
    fn initial(self) -> (f64, f64, f64) {
        match self {
            Stage::SpectralTilt => (
                SynthConfig::TILT_INITIAL_HZ,
                q_from_db(SynthConfig::TILT_RESONANCE_DB),
                0.0,
            ),
            Stage::SingersFormant => (SINGERS_FORMANT_HZ, SINGERS_FORMANT_Q, 0.0),
            _ => (350.0, 1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone)]
struct FilterStage {
    stage: Stage,
    freq: SmoothedParam,
    q: SmoothedParam,
    gain_db: SmoothedParam,
    /// Identical sections run in series.
    filters: Vec<BiquadFilter>,
}

impl FilterStage {
    fn new(stage: Stage, sample_rate: f64) -> Self {
        let (freq, q, gain_db) = stage.initial();
        let tau = SynthConfig::RAMP_TIME_CONSTANT;
        let mut built = Self {
            stage,
            freq: SmoothedParam::new(freq, tau, sample_rate),
            q: SmoothedParam::new(q, tau, sample_rate),
            gain_db: SmoothedParam::new(gain_db, tau, sample_rate),
            filters: vec![BiquadFilter::new(BiquadCoeffs::passthrough()); stage.sections()],
        };
        built.set_coeffs(built.design(sample_rate));
        built
    }

    fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        for filter in &mut self.filters {
            filter.set_coeffs(coeffs);
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        self.filters.iter_mut().fold(input, |x, f| f.process(x))
    }

    /// Magnitude of the whole stage at `freq`.
    fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.filters
            .iter()
            .map(|f| f.coeffs().magnitude(freq, sample_rate))
            .product()
    }

    fn design(&self, sample_rate: f64) -> BiquadCoeffs {
        let freq = self.freq.value();
        let q = self.q.value();
        match self.stage.response() {
            Response::Lowpass => BiquadCoeffs::lowpass(freq, q, sample_rate),
            Response::Bandpass => BiquadCoeffs::bandpass(freq, q, sample_rate),
            Response::Peaking => BiquadCoeffs::peaking(freq, q, self.gain_db.value(), sample_rate),
        }
    }

    fn refresh(&mut self, samples: usize, sample_rate: f64) {
        self.freq.advance(samples);
        self.q.advance(samples);
        self.gain_db.advance(samples);
        self.set_coeffs(self.design(sample_rate));
    }

    fn retune_band(&mut self, target: &BandTarget) {
        if let Some(freq) = target.freq {
            self.freq.set_target(freq);
        }
        if let Some(q) = target.q {
            self.q.set_target(q);
        }
    }

    fn retune_peak(&mut self, target: &PeakTarget) {
        if let Some(freq) = target.freq {
            self.freq.set_target(freq);
        }
        if let Some(gain_db) = target.gain_db {
            self.gain_db.set_target(gain_db);
        }
        if let Some(q) = target.q {
            self.q.set_target(q);
        }
    }
}

/// Gain that lifts the formant cascade's loudest center to
/// `-FORMANT_HEADROOM_DB`, capped at `FORMANT_MAKEUP_LIMIT_DB`.
fn formant_makeup(chain: &[FilterStage], sample_rate: f64) -> f64 {
    let formants = || {
        chain
            .iter()
            .filter(|s| s.stage.response() == Response::Bandpass)
    };
    let peak = formants()
        .map(|center| {
            let freq = center.freq.value();
            formants()
                .map(|s| s.magnitude(freq, sample_rate))
                .product::<f64>()
        })
        .fold(0.0, f64::max);
    if !(peak.is_finite() && peak > 0.0) {
        return 1.0;
    }
    (db_to_amp(-SynthConfig::FORMANT_HEADROOM_DB) / peak)
        .min(db_to_amp(SynthConfig::FORMANT_MAKEUP_LIMIT_DB))
}

pub struct VoiceGraph {
    sample_rate: f64,
    glottal: Arc<Wavetable>,

    pitch: SmoothedParam,
    sub_pitch: SmoothedParam,
    main_osc: PhaseAccumulator,
    chorus_up: PhaseAccumulator,
    chorus_down: PhaseAccumulator,
    sub_osc: PhaseAccumulator,
    chorus_up_ratio: f64,
    chorus_down_ratio: f64,

    vibrato: PhaseAccumulator,
    jitter_noise: NoiseLoop,
    jitter_filter: BiquadFilter,

    breath_noise: NoiseLoop,
    breath_filter: BiquadFilter,
    breath_gain: SmoothedParam,

    chain: Vec<FilterStage>,
    chain_level: SmoothedParam,
    master_gain: SmoothedParam,
    compressor: Compressor,

    block_remaining: usize,
}

impl VoiceGraph {
    /// Builds the graph at rest: oscillators at `pitch`, filters at their
    /// initial settings and the master gain at zero, so the first retune
    /// fades the voice in.
    pub fn new(config: &SynthConfig, sample_rate: f64, pitch: f64, glottal: Arc<Wavetable>) -> Self {
        let tau = SynthConfig::RAMP_TIME_CONSTANT;
        let pitch = if pitch.is_finite() && pitch > 0.0 {
            pitch
        } else {
            SynthConfig::FALLBACK_PITCH_HZ
        };
        let noise_q = q_from_db(SynthConfig::NOISE_FILTER_RESONANCE_DB);
        let chain: Vec<FilterStage> = FILTER_CHAIN
            .iter()
            .map(|&stage| FilterStage::new(stage, sample_rate))
            .collect();
        let level = formant_makeup(&chain, sample_rate);

        Self {
            sample_rate,
            glottal,
            pitch: SmoothedParam::new(pitch, tau, sample_rate),
            sub_pitch: SmoothedParam::new(pitch / 2.0, tau, sample_rate),
            main_osc: PhaseAccumulator::new(sample_rate),
            chorus_up: PhaseAccumulator::new(sample_rate),
            chorus_down: PhaseAccumulator::new(sample_rate),
            sub_osc: PhaseAccumulator::new(sample_rate),
            chorus_up_ratio: cents_ratio(SynthConfig::CHORUS_DETUNE_CENTS),
            chorus_down_ratio: cents_ratio(-SynthConfig::CHORUS_DETUNE_CENTS),
            vibrato: PhaseAccumulator::new(sample_rate),
            jitter_noise: NoiseLoop::new(sample_rate, config.noise_seed),
            jitter_filter: BiquadFilter::lowpass(SynthConfig::JITTER_CUTOFF_HZ, noise_q, sample_rate),
            breath_noise: NoiseLoop::new(sample_rate, config.noise_seed.wrapping_add(1)),
            breath_filter: BiquadFilter::lowpass(SynthConfig::BREATH_CUTOFF_HZ, noise_q, sample_rate),
            breath_gain: SmoothedParam::new(SynthConfig::INITIAL_BREATH_GAIN, tau, sample_rate),
            chain,
            chain_level: SmoothedParam::new(level, tau, sample_rate),
            master_gain: SmoothedParam::new(0.0, tau, sample_rate),
            compressor: Compressor::new(config.compressor, sample_rate),
            block_remaining: 0,
        }
    }

    /// Applies one command. Returns the glottal wave it replaced, if any.
    pub fn apply(&mut self, command: GraphCommand) -> Option<Arc<Wavetable>> {
        match command {
            GraphCommand::Retune(targets) => {
                self.retune(&targets);
                None
            }
            GraphCommand::Glottal(wave) => Some(std::mem::replace(&mut self.glottal, wave)),
        }
    }

    pub fn retune(&mut self, targets: &VoiceTargets) {
        if let Some(pitch) = targets.pitch {
            self.pitch.set_target(pitch);
        }
        if let Some(sub) = targets.sub_pitch {
            self.sub_pitch.set_target(sub);
        }
        if let Some(gain) = targets.master_gain {
            self.master_gain.set_target(gain);
        }
        if let Some(gain) = targets.breath_gain {
            self.breath_gain.set_target(gain);
        }
        for stage in &mut self.chain {
            match stage.stage {
                Stage::SpectralTilt => {
                    if let Some(cutoff) = targets.tilt_cutoff {
                        stage.freq.set_target(cutoff);
                    }
                }
                Stage::Formant1 => stage.retune_band(&targets.formants[0]),
                Stage::Formant2 => stage.retune_band(&targets.formants[1]),
                Stage::Formant3 => stage.retune_band(&targets.formants[2]),
                Stage::SingersFormant => stage.retune_peak(&targets.singers),
                Stage::HarmonicBoost => stage.retune_peak(&targets.boost),
            }
        }
    }

    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample() as f32;
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f64 {
        if self.block_remaining == 0 {
            for stage in &mut self.chain {
                stage.refresh(SynthConfig::CONTROL_BLOCK, self.sample_rate);
            }
            self.chain_level
                .set_target(formant_makeup(&self.chain, self.sample_rate));
            self.block_remaining = SynthConfig::CONTROL_BLOCK;
        }
        self.block_remaining -= 1;

        let (vibrato_phase, _) = self.vibrato.advance(SynthConfig::VIBRATO_HZ);
        let jitter = self.jitter_filter.process(self.jitter_noise.next());
        let modulation = sine(vibrato_phase) * SynthConfig::VIBRATO_DEPTH_HZ
            + jitter * SynthConfig::JITTER_DEPTH_HZ;

        let f0 = (self.pitch.next() + modulation).max(0.0);
        let sub = (self.sub_pitch.next() + modulation).max(0.0);

        let (phase, _) = self.main_osc.advance(f0);
        let mut mix = self.glottal.sample(phase) as f64 * SynthConfig::MAIN_LEVEL;

        let (phase, dt) = self.chorus_up.advance(f0 * self.chorus_up_ratio);
        mix += saw(phase, dt) * SynthConfig::CHORUS_LEVEL;
        let (phase, dt) = self.chorus_down.advance(f0 * self.chorus_down_ratio);
        mix += saw(phase, dt) * SynthConfig::CHORUS_LEVEL;

        let (phase, _) = self.sub_osc.advance(sub);
        mix += triangle(phase) * SynthConfig::SUB_LEVEL;

        let breath = self.breath_filter.process(self.breath_noise.next());
        mix += breath * self.breath_gain.next();

        for stage in &mut self.chain {
            mix = stage.process(mix);
        }
        mix *= self.chain_level.next();

        let out = self.compressor.process(mix * self.master_gain.next());
        if out.is_finite() {
            out
        } else {
            0.0
        }
    }
}
