//! Voice synthesizer engine.
//!
//! [`VoiceSynth`] owns the lifecycle. The render graph lives on the audio
//! thread and is retuned through a command channel, so [`VoiceSynth::update`]
//! never blocks and never rebuilds anything.

pub mod graph;
pub mod targets;

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::audio::{AudioOutput, CpalOutput};
use crate::dsp::CompressorSettings;
use crate::error::SynthError;
use crate::glottal::{max_harmonic, TiltCurve, Wavetable};
use crate::types::SynthesisParameters;

pub use graph::{GraphCommand, Stage, VoiceGraph, FILTER_CHAIN};
pub use targets::VoiceTargets;

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub noise_seed: u64,
    pub compressor: CompressorSettings,
}

impl SynthConfig {
    /// Time constant of every parameter glide, in seconds.
    pub const RAMP_TIME_CONSTANT: f64 = 0.05;
    pub const CONTROL_BLOCK: usize = 32;

    pub const MAIN_LEVEL: f64 = 0.9;
    pub const CHORUS_LEVEL: f64 = 0.5;
    pub const CHORUS_DETUNE_CENTS: f64 = 3.0;
    pub const SUB_LEVEL: f64 = 0.7;

    pub const VIBRATO_HZ: f64 = 5.5;
    pub const VIBRATO_DEPTH_HZ: f64 = 3.0;
    pub const JITTER_CUTOFF_HZ: f64 = 50.0;
    pub const JITTER_DEPTH_HZ: f64 = 8.0;

    pub const BREATH_CUTOFF_HZ: f64 = 1000.0;
    pub const INITIAL_BREATH_GAIN: f64 = 0.08;
    /// Resonance of the jitter and breath lowpasses.
    pub const NOISE_FILTER_RESONANCE_DB: f64 = 1.0;

    pub const TILT_INITIAL_HZ: f64 = 10_000.0;
    pub const TILT_RESONANCE_DB: f64 = 0.5;
    pub const TILT_SECTIONS: usize = 2;

    /// Level of the formant cascade's loudest center after the level stage.
    pub const FORMANT_HEADROOM_DB: f64 = 6.0;
    pub const FORMANT_MAKEUP_LIMIT_DB: f64 = 60.0;

    pub const FALLBACK_PITCH_HZ: f64 = 440.0;
    pub const DEFAULT_NOISE_SEED: u64 = 0x5eed_f0a1;
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            noise_seed: Self::DEFAULT_NOISE_SEED,
            compressor: CompressorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
}

/// Closed quotient and harmonic count the live glottal wave was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WaveKey {
    closed_quotient: u64,
    harmonics: usize,
}

impl WaveKey {
    fn new(closed_quotient: f64, pitch: f64, sample_rate: f64) -> Self {
        Self {
            closed_quotient: closed_quotient.to_bits(),
            harmonics: max_harmonic(pitch, sample_rate),
        }
    }
}

/// Replaced glottal waves waiting to be freed by the control thread.
const RETIRED_WAVE_SLOTS: usize = 4;

struct Session<S> {
    stream: S,
    commands: Sender<GraphCommand>,
    retired: Receiver<Arc<Wavetable>>,
    sample_rate: f64,
    wave: Option<WaveKey>,
}

/// The voice synthesizer. One instance owns one output device.
pub struct VoiceSynth<O: AudioOutput = CpalOutput> {
    output: O,
    config: SynthConfig,
    session: Option<Session<O::Stream>>,
}

impl VoiceSynth<CpalOutput> {
    pub fn with_default_output() -> Self {
        Self::new(CpalOutput::new(), SynthConfig::default())
    }
}

impl<O: AudioOutput> VoiceSynth<O> {
    pub fn new(output: O, config: SynthConfig) -> Self {
        Self {
            output,
            config,
            session: None,
        }
    }

    pub fn state(&self) -> EngineState {
        if self.session.is_some() {
            EngineState::Running
        } else {
            EngineState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.sample_rate)
    }

    /// Builds a fresh graph and starts playback. A running session is torn
    /// down first. On failure the engine is left idle.
    pub fn start(&mut self, params: &SynthesisParameters) -> Result<(), SynthError> {
        self.stop();
        match self.try_start(params) {
            Ok(()) => {
                info!("synthesizer started at {:.1} Hz", params.pitch);
                Ok(())
            }
            Err(err) => {
                self.stop();
                Err(err)
            }
        }
    }

    fn try_start(&mut self, params: &SynthesisParameters) -> Result<(), SynthError> {
        let sample_rate = self.output.prepare()? as f64;
        let onset = Wavetable::glottal(
            params.physics.closed_quotient,
            TiltCurve::Onset,
            params.pitch,
            sample_rate,
        )?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let (retired_tx, retired_rx) = crossbeam_channel::bounded(RETIRED_WAVE_SLOTS);
        let mut graph = VoiceGraph::new(&self.config, sample_rate, params.pitch, Arc::new(onset));
        let stream = self.output.play(Box::new(move |block: &mut [f32]| {
            for command in rx.try_iter() {
                if let Some(old) = graph.apply(command) {
                    let _ = retired_tx.try_send(old);
                }
            }
            graph.render(block);
        }))?;
        debug!("voice graph running at {sample_rate} Hz");

        self.session = Some(Session {
            stream,
            commands: tx,
            retired: retired_rx,
            sample_rate,
            wave: None,
        });
        self.update(params)
    }

    /// Retunes the running graph. Cheap enough to call at control rate.
    pub fn update(&mut self, params: &SynthesisParameters) -> Result<(), SynthError> {
        let session = self.session.as_mut().ok_or(SynthError::NotRunning)?;
        session.retired.try_iter().for_each(drop);
        session
            .commands
            .send(GraphCommand::Retune(VoiceTargets::from_params(params)))
            .map_err(|_| SynthError::Disconnected)?;

        let cq = params.physics.closed_quotient;
        let key = WaveKey::new(cq, params.pitch, session.sample_rate);
        if session.wave != Some(key) {
            match Wavetable::glottal(cq, TiltCurve::Sustain, params.pitch, session.sample_rate) {
                Ok(wave) => {
                    session
                        .commands
                        .send(GraphCommand::Glottal(Arc::new(wave)))
                        .map_err(|_| SynthError::Disconnected)?;
                    session.wave = Some(key);
                }
                Err(err) => warn!("keeping previous glottal wave: {err}"),
            }
        }
        Ok(())
    }

    /// Halts playback and releases the device. Safe to call at any time.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session.commands);
            self.output.halt(session.stream);
            info!("synthesizer stopped");
        }
    }
}

impl<O: AudioOutput> Drop for VoiceSynth<O> {
    fn drop(&mut self) {
        self.stop();
    }
}
