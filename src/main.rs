use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use formant_lab::audio::{list_devices, OfflineOutput};
use formant_lab::cli::{Cli, Commands, EnvelopeCommand, ListenCommand, PlayCommand, RenderCommand};
use formant_lab::envelope::spectrum_curve;
use formant_lab::types::note_name;
use formant_lab::{FormantAnalyzer, SynthConfig, VoiceSynth};

/// Control-rate period for parameter updates.
const CONTROL_TICK: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(cmd) => play(cmd),
        Commands::Listen(cmd) => listen(cmd),
        Commands::Render(cmd) => render(cmd),
        Commands::Envelope(cmd) => envelope(cmd),
        Commands::Devices => devices(),
    }
}

fn play(cmd: PlayCommand) -> Result<()> {
    let mut params = cmd.voice.to_params();
    let start_pitch = params.pitch;
    let mut synth = VoiceSynth::with_default_output();
    synth
        .start(&params)
        .context("failed to start the synthesizer")?;
    info!(
        "playing {:.1} Hz ({}) for {:.1} s",
        params.pitch,
        note_name(params.pitch).unwrap_or_else(|| "-".to_string()),
        cmd.seconds
    );

    let total = Duration::from_secs_f64(cmd.seconds);
    let began = Instant::now();
    while began.elapsed() < total {
        if let Some(target) = cmd.glide_to {
            let progress = began.elapsed().as_secs_f64() / total.as_secs_f64();
            params.pitch = start_pitch + (target - start_pitch) * progress.min(1.0);
            synth.update(&params).context("failed to retune the synthesizer")?;
        }
        thread::sleep(CONTROL_TICK);
    }

    synth.stop();
    Ok(())
}

fn listen(cmd: ListenCommand) -> Result<()> {
    let mut analyzer = FormantAnalyzer::with_default_input();
    let (tx, rx) = crossbeam_channel::unbounded();
    analyzer
        .start(move |result| {
            let _ = tx.send(result);
        })
        .context("failed to open the microphone")?;

    let deadline = Instant::now() + Duration::from_secs_f64(cmd.seconds);
    while Instant::now() < deadline {
        let Ok(result) = rx.recv_timeout(CONTROL_TICK * 4) else {
            continue;
        };
        if result.is_voiced() {
            println!(
                "F1 {:>6.0} Hz   F2 {:>6.0} Hz   energy {:.3}",
                result.f1, result.f2, result.energy
            );
        } else if cmd.all {
            println!("--                          energy {:.3}", result.energy);
        }
    }

    analyzer.stop();
    Ok(())
}

fn render(cmd: RenderCommand) -> Result<()> {
    if cmd.sample_rate == 0 {
        bail!("sample rate must be positive");
    }
    let params = cmd.voice.to_params();
    let output = OfflineOutput::new(cmd.sample_rate);
    let mut synth = VoiceSynth::new(output.clone(), SynthConfig::default());
    synth
        .start(&params)
        .context("failed to start the synthesizer")?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: cmd.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&cmd.output, spec)
        .with_context(|| format!("failed to create {}", cmd.output.display()))?;

    let block = (cmd.sample_rate as f64 * CONTROL_TICK.as_secs_f64()).round() as usize;
    let mut remaining = (cmd.sample_rate as f64 * cmd.seconds).round() as usize;
    while remaining > 0 {
        let frames = block.min(remaining).max(1);
        let Some(samples) = output.pull(frames) else {
            bail!("offline stream closed while rendering");
        };
        for s in samples {
            writer.write_sample(s)?;
        }
        remaining = remaining.saturating_sub(frames);
        synth.update(&params)?;
    }
    writer.finalize()?;
    synth.stop();

    info!("wrote {:.2} s to {}", cmd.seconds, cmd.output.display());
    Ok(())
}

fn envelope(cmd: EnvelopeCommand) -> Result<()> {
    let params = cmd.voice.to_params();
    println!("freq_hz,envelope,harmonic");
    for point in spectrum_curve(&params, None) {
        println!("{},{:.3},{:.3}", point.freq, point.envelope, point.harmonic);
    }
    Ok(())
}

fn devices() -> Result<()> {
    let list = list_devices().context("failed to enumerate audio devices")?;
    println!("host: {}", list.host);
    println!("inputs:");
    for name in &list.inputs {
        let marker = if list.default_input.as_ref() == Some(name) { " (default)" } else { "" };
        println!("  {name}{marker}");
    }
    println!("outputs:");
    for name in &list.outputs {
        let marker = if list.default_output.as_ref() == Some(name) { " (default)" } else { "" };
        println!("  {name}{marker}");
    }
    if list.inputs.is_empty() && list.outputs.is_empty() {
        warn!("no audio devices found");
    }
    Ok(())
}
