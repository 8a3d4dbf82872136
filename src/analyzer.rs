//! Live formant analyzer: an input stream, a ring buffer and a worker thread
//! that analyzes the latest frame on a fixed tick.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, tick, Receiver, Sender};
use log::{debug, info, warn};
use ringbuf::HeapConsumer;

use crate::audio::{AudioInput, CpalInput};
use crate::error::AnalyzerError;
use crate::processing::{AnalyzerConfig, FrameAnalyzer, FrameHistory};
use crate::types::AnalyzedFormants;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Idle,
    Listening,
}

struct Listening<S> {
    stream: S,
    stop_tx: Sender<()>,
    worker: JoinHandle<()>,
}

/// The formant analyzer. One instance owns one input device.
pub struct FormantAnalyzer<I: AudioInput = CpalInput> {
    input: I,
    config: AnalyzerConfig,
    session: Option<Listening<I::Stream>>,
}

impl FormantAnalyzer<CpalInput> {
    pub fn with_default_input() -> Self {
        Self::new(CpalInput::new(), AnalyzerConfig::default())
    }
}

impl<I: AudioInput> FormantAnalyzer<I> {
    pub fn new(input: I, config: AnalyzerConfig) -> Self {
        Self {
            input,
            config,
            session: None,
        }
    }

    pub fn state(&self) -> AnalyzerState {
        if self.session.is_some() {
            AnalyzerState::Listening
        } else {
            AnalyzerState::Idle
        }
    }

    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }

    /// Opens the input and starts delivering one [`AnalyzedFormants`] per
    /// tick to `on_update`, from the worker thread. A running session is
    /// stopped first; on failure the analyzer stays idle.
    pub fn start<F>(&mut self, on_update: F) -> Result<(), AnalyzerError>
    where
        F: FnMut(AnalyzedFormants) + Send + 'static,
    {
        self.stop();

        let (stream, consumer, sample_rate) = self.input.open()?;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name("formant-analysis".to_string())
            .spawn(move || run_analysis(consumer, sample_rate, config, stop_rx, on_update));

        match spawned {
            Ok(worker) => {
                self.session = Some(Listening {
                    stream,
                    stop_tx,
                    worker,
                });
                info!("analyzer listening at {sample_rate} Hz");
                Ok(())
            }
            Err(err) => {
                self.input.close(stream);
                Err(err.into())
            }
        }
    }

    /// Stops the tick loop, waits for the worker and closes the input.
    /// Safe to call at any time.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.stop_tx.try_send(());
            drop(session.stop_tx);
            if session.worker.join().is_err() {
                warn!("analysis thread panicked");
            }
            self.input.close(session.stream);
            info!("analyzer stopped");
        }
    }
}

impl<I: AudioInput> Drop for FormantAnalyzer<I> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_analysis<F>(
    mut consumer: HeapConsumer<f32>,
    sample_rate: u32,
    config: AnalyzerConfig,
    stop_rx: Receiver<()>,
    mut on_update: F,
) where
    F: FnMut(AnalyzedFormants),
{
    let mut analyzer = FrameAnalyzer::new(&config, sample_rate);
    let mut history = FrameHistory::new(config.frame_size);
    let ticker = tick(config.interval);
    debug!(
        "analysis loop: {} sample frames every {:?}, LPC at {:.1} Hz",
        config.frame_size,
        config.interval,
        analyzer.lpc_rate()
    );

    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                history.fill_from(&mut consumer);
                on_update(analyzer.analyze(history.frame()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferInput;
    use crate::lpc::tests::vowel;
    use std::time::Duration;

    const SR: u32 = 48_000;

    #[test]
    fn stop_without_start() {
        let mut analyzer = FormantAnalyzer::new(BufferInput::new(Vec::new(), SR), AnalyzerConfig::default());
        analyzer.stop();
        analyzer.stop();
        assert_eq!(analyzer.state(), AnalyzerState::Idle);
    }

    #[test]
    fn denied_input_stays_idle() {
        let mut analyzer = FormantAnalyzer::new(BufferInput::denied(SR), AnalyzerConfig::default());
        let err = analyzer.start(|_| {}).unwrap_err();
        assert!(matches!(err, AnalyzerError::NoInputDevice));
        assert!(!analyzer.is_listening());
    }

    #[test]
    fn reports_formants_of_a_steady_vowel() {
        let samples = vowel(SR as f64, 120.0, &[(500.0, 80.0), (1500.0, 100.0)], 4_000, 4096);
        let mut analyzer = FormantAnalyzer::new(BufferInput::new(samples, SR), AnalyzerConfig::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        analyzer
            .start(move |result| {
                let _ = tx.send(result);
            })
            .unwrap();
        assert_eq!(analyzer.state(), AnalyzerState::Listening);

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        analyzer.stop();
        assert_eq!(analyzer.state(), AnalyzerState::Idle);

        assert!(result.is_voiced());
        assert!((result.f1 - 500.0).abs() <= 50.0, "f1 {}", result.f1);
        assert!((result.f2 - 1500.0).abs() <= 50.0, "f2 {}", result.f2);
    }

    #[test]
    fn silence_is_reported_as_silent() {
        let mut analyzer = FormantAnalyzer::new(BufferInput::new(vec![0.0; 4096], SR), AnalyzerConfig::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        analyzer
            .start(move |result| {
                let _ = tx.send(result);
            })
            .unwrap();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        analyzer.stop();
        assert_eq!(result, AnalyzedFormants::silent());
    }

    #[test]
    fn restart_replaces_the_session() {
        let samples = vowel(SR as f64, 120.0, &[(500.0, 80.0), (1500.0, 100.0)], 4_000, 2048);
        let mut analyzer = FormantAnalyzer::new(BufferInput::new(samples, SR), AnalyzerConfig::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let first = tx.clone();
        analyzer
            .start(move |result| {
                let _ = first.send(result);
            })
            .unwrap();
        analyzer
            .start(move |result| {
                let _ = tx.send(result);
            })
            .unwrap();
        assert!(analyzer.is_listening());
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        analyzer.stop();

        // Every worker is joined and dropped its sender.
        while rx.try_recv().is_ok() {}
        assert!(matches!(
            rx.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        ));
    }
}
