//! Command line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::{FormantTriple, HarmonicBoost, SynthesisParameters, VocalPhysics, DEFAULT_BANDWIDTHS};

/// Formant voice synthesizer and live formant analyzer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a synthesized vowel on the default output device
    Play(PlayCommand),

    /// Analyze the default microphone and print F1/F2 per tick
    Listen(ListenCommand),

    /// Render a synthesized vowel to a WAV file
    Render(RenderCommand),

    /// Print the predicted spectral envelope as CSV
    Envelope(EnvelopeCommand),

    /// List available audio devices
    Devices,
}

/// Voice parameters shared by every synthesis command
#[derive(Args, Debug, Clone)]
pub struct VoiceArgs {
    /// Fundamental frequency in Hz
    #[arg(short, long, default_value_t = 120.0)]
    pub pitch: f64,

    /// First formant in Hz
    #[arg(long, default_value_t = 500.0)]
    pub f1: f64,

    /// Second formant in Hz
    #[arg(long, default_value_t = 1500.0)]
    pub f2: f64,

    /// Third formant in Hz; derived from F2 when omitted
    #[arg(long)]
    pub f3: Option<f64>,

    /// Formant bandwidths in Hz, as B1,B2,B3
    #[arg(long, value_parser = parse_bandwidths)]
    pub bandwidths: Option<[f64; 3]>,

    /// Output volume (0.0 to 1.0)
    #[arg(short, long, default_value_t = 0.5)]
    pub volume: f64,

    /// Vocal tract length in cm
    #[arg(long, default_value_t = 17.5)]
    pub tract_length: f64,

    /// Vocal fold thickness (0 thin to 100 thick)
    #[arg(long, default_value_t = 50.0)]
    pub thickness: f64,

    /// Closed quotient (0.0 breathy to 1.0 pressed)
    #[arg(long, default_value_t = 0.5)]
    pub closed_quotient: f64,

    /// Add the singer's formant near 3 kHz
    #[arg(long)]
    pub singers_formant: bool,

    /// Peaking boost center in Hz; enables the harmonic boost
    #[arg(long)]
    pub boost_freq: Option<f64>,

    /// Harmonic boost gain in dB
    #[arg(long, default_value_t = 12.0)]
    pub boost_gain: f64,

    /// Harmonic boost Q
    #[arg(long, default_value_t = 2.0)]
    pub boost_q: f64,
}

impl VoiceArgs {
    pub fn to_params(&self) -> SynthesisParameters {
        let bandwidths = self.bandwidths.unwrap_or(DEFAULT_BANDWIDTHS);
        let formants = match self.f3 {
            Some(f3) => FormantTriple::new(self.f1, self.f2, f3, bandwidths),
            None => FormantTriple {
                bandwidths,
                ..FormantTriple::from_vowel_chart(self.f1, self.f2)
            },
        };
        let harmonic_boost = match self.boost_freq {
            Some(freq) => HarmonicBoost {
                active: true,
                freq,
                gain: self.boost_gain,
                q: self.boost_q,
            },
            None => HarmonicBoost::default(),
        };
        SynthesisParameters {
            pitch: self.pitch,
            formants,
            volume: self.volume,
            singers_formant: self.singers_formant,
            harmonic_boost,
            physics: VocalPhysics::new(self.tract_length, self.thickness, self.closed_quotient),
        }
    }
}

#[derive(Parser, Debug)]
pub struct PlayCommand {
    #[command(flatten)]
    pub voice: VoiceArgs,

    /// Playback duration in seconds
    #[arg(short, long, default_value_t = 3.0, value_parser = parse_seconds)]
    pub seconds: f64,

    /// Glide the pitch to this frequency over the duration
    #[arg(long)]
    pub glide_to: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct ListenCommand {
    /// Listening duration in seconds
    #[arg(short, long, default_value_t = 10.0, value_parser = parse_seconds)]
    pub seconds: f64,

    /// Also print ticks without a detected voice
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser, Debug)]
pub struct RenderCommand {
    #[command(flatten)]
    pub voice: VoiceArgs,

    /// Output WAV path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Duration in seconds
    #[arg(short, long, default_value_t = 2.0, value_parser = parse_seconds)]
    pub seconds: f64,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,
}

#[derive(Parser, Debug)]
pub struct EnvelopeCommand {
    #[command(flatten)]
    pub voice: VoiceArgs,
}

fn parse_bandwidths(arg: &str) -> Result<[f64; 3], String> {
    let values = arg
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [b1, b2, b3] => Ok([*b1, *b2, *b3]),
        _ => Err(format!("expected 3 bandwidths, got {}", values.len())),
    }
}

fn parse_seconds(arg: &str) -> Result<f64, String> {
    let seconds: f64 = arg.parse().map_err(|e| format!("{arg:?}: {e}"))?;
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(format!("{arg} is not a usable duration"))
    }
}
