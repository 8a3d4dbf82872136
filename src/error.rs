use thiserror::Error;

/// Failures of the voice synthesizer engine.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("no output device available")]
    NoOutputDevice,

    #[error("no supported output config")]
    UnsupportedConfig,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to query output configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("synthesizer is not running")]
    NotRunning,

    #[error("render graph disconnected")]
    Disconnected,

    #[error("waveform construction failed: {message}")]
    Waveform { message: String },
}

impl SynthError {
    pub fn waveform(message: impl Into<String>) -> Self {
        Self::Waveform {
            message: message.into(),
        }
    }
}

/// Failures of the formant analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("no supported input config")]
    UnsupportedConfig,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to query input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn analysis thread: {0}")]
    Spawn(#[from] std::io::Error),
}
