use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use fretlab::audio::{self, AudioLink, StereoFrame};
use fretlab::config::{self, EngineConfig};
use fretlab::export;
use fretlab::looper::{Looper, LooperState};
use fretlab::pipeline::persistence;
use fretlab::pipeline::session::SessionState;
use fretlab::scheduler::{Scheduler, SchedulerLoop};
use fretlab::sequencer::SequencePlayer;
use fretlab::synth::Synthesizer;
use fretlab::theory::ChordSymbol;
use fretlab::Tempo;

const RENDER_SAMPLE_RATE: u32 = 44_100;

#[derive(Parser)]
#[command(name = "fretlab")]
#[command(about = "Chords, loops and song sketches from the terminal", long_about = None)]
struct Cli {
    /// Engine config file (default: <config dir>/fretlab/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding .fretlab/session.json
    #[arg(long, global = true, default_value = ".")]
    session: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one chord, e.g. `fretlab chord F#m7`
    Chord {
        symbol: String,

        #[arg(short, long, default_value = "4")]
        octave: i32,

        /// Seconds the chord is held
        #[arg(short, long, default_value = "2.0")]
        duration: f64,

        /// Timbre preset (default from config)
        #[arg(short, long)]
        timbre: Option<String>,

        #[arg(short, long, default_value = "0.6")]
        volume: f64,

        /// Effects preset
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Play the session's part sequence once through
    Progression {
        #[arg(long)]
        bpm: Option<f64>,

        /// Timbre preset (default from session)
        #[arg(short, long)]
        timbre: Option<String>,

        /// Render to this WAV file instead of the audio device
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record loop takes from the microphone, then export the mix
    Loop {
        #[arg(long)]
        bpm: Option<f64>,

        #[arg(long)]
        bars: Option<u32>,

        /// Number of takes; the first records, the rest overdub
        #[arg(long, default_value = "1")]
        takes: u32,

        /// Cycles to play back after recording
        #[arg(long, default_value = "2")]
        listen: u32,

        /// Write the final mix here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path);
    let mut session = persistence::load_session(&cli.session).unwrap_or_else(|| SessionState::from_config(&config));

    match cli.command {
        Commands::Chord { symbol, octave, duration, timbre, volume, preset } => {
            let timbre = timbre.unwrap_or_else(|| session.timbre.clone());
            play_chord(&config, &session, &symbol, octave, duration, &timbre, volume, preset.as_deref())?;
        }
        Commands::Progression { bpm, timbre, output } => {
            if let Some(bpm) = bpm {
                session.bpm = bpm;
                session.sanitize();
            }
            if let Some(timbre) = timbre {
                session.timbre = timbre;
            }
            match output {
                Some(path) => render_progression(&session, &path)?,
                None => play_progression(&config, &session)?,
            }
        }
        Commands::Loop { bpm, bars, takes, listen, output } => {
            if let Some(bpm) = bpm {
                session.bpm = bpm;
            }
            if let Some(bars) = bars {
                session.bars = bars;
            }
            session.sanitize();
            run_looper(&config, &mut session, takes.max(1), listen, output.as_deref())?;
        }
    }

    persistence::save_session(&cli.session, &session)?;
    Ok(())
}

fn apply_mix(synth: &mut Synthesizer, session: &SessionState, preset: Option<&str>) {
    synth.set_master_volume(session.master_volume);
    if let Some(fallback) = synth.apply_effects_preset(preset.unwrap_or(&session.effects_preset)) {
        log::warn!("fell back: {fallback:?}");
    }
    synth.set_dry_wet_mix(session.dry_wet);
}

#[allow(clippy::too_many_arguments)]
fn play_chord(
    config: &EngineConfig,
    session: &SessionState,
    symbol: &str,
    octave: i32,
    duration: f64,
    timbre: &str,
    volume: f64,
    preset: Option<&str>,
) -> anyhow::Result<()> {
    let parsed = ChordSymbol::parse(symbol).with_context(|| format!("not a chord symbol: {symbol:?}"))?;
    let handle = audio::start_audio(config)?;
    let mut synth = Synthesizer::new(handle.link());
    apply_mix(&mut synth, session, preset);

    let scheduled = synth.play_chord(parsed.root_name(), parsed.chord.name(), octave, duration, timbre, volume);
    for fallback in &scheduled.fallbacks {
        log::warn!("fell back: {fallback:?}");
    }
    log::info!("{symbol}: {} voice(s)", scheduled.voice_ids.len());

    let stop = scheduled.stop_time.unwrap_or(scheduled.start_time + duration);
    wait_until(&handle.link(), stop + 0.1);
    Ok(())
}

fn play_progression(config: &EngineConfig, session: &SessionState) -> anyhow::Result<()> {
    let handle = audio::start_audio(config)?;
    let mut synth = Synthesizer::new(handle.link());
    apply_mix(&mut synth, session, None);

    let mut seq = session.sequencer();
    seq.set_loop(false);
    let total = seq.total_duration(session.bpm);
    seq.start();
    let seq = Arc::new(RwLock::new(seq));
    log::info!("playing {total:.1}s at {} bpm", session.bpm);

    let player = SequencePlayer::new(Arc::clone(&seq), synth, Tempo::new(session.bpm), &session.timbre);
    let sched = SchedulerLoop::spawn(player, handle.link(), config).context("failed to start scheduler")?;
    while sched.is_running() {
        std::thread::sleep(config.schedule_interval());
    }
    // let the last chord ring out
    std::thread::sleep(Duration::from_secs(2));
    drop(sched);
    Ok(())
}

fn render_progression(session: &SessionState, path: &Path) -> anyhow::Result<()> {
    let mut off = audio::offline(RENDER_SAMPLE_RATE);
    let mut synth = Synthesizer::new(off.link.clone());
    apply_mix(&mut synth, session, None);

    let mut seq = session.sequencer();
    seq.set_loop(false);
    seq.start();
    let seq = Arc::new(RwLock::new(seq));

    let player = SequencePlayer::new(seq, synth, Tempo::new(session.bpm), &session.timbre);
    let mut sched = Scheduler::new(player, 0.1);
    sched.start(0.0);

    let mut frames: Vec<StereoFrame> = Vec::new();
    let tail = off.link.clock().seconds_to_frames(2.0) as usize;
    let mut tail_left = tail;
    while tail_left > 0 {
        sched.pump(off.link.now());
        let block = off.engine.render_frames(audio::OFFLINE_BLOCK, audio::OFFLINE_BLOCK);
        frames.extend_from_slice(&block);
        if !sched.is_running() {
            tail_left = tail_left.saturating_sub(block.len());
        }
    }

    let bytes = export::encode_wav(&frames, RENDER_SAMPLE_RATE)?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("rendered {:.1}s to {}", frames.len() as f64 / f64::from(RENDER_SAMPLE_RATE), path.display());
    Ok(())
}

fn run_looper(
    config: &EngineConfig,
    session: &mut SessionState,
    takes: u32,
    listen: u32,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let handle = audio::start_audio(config)?;
    let link = handle.link();
    let mut looper = Looper::new(link.clone()).with_loop_lookahead(config.loop_lookahead_secs());
    session.apply_to_looper(&mut looper);
    looper.acquire_input(&handle.microphone())?;

    log::info!("loop length {:.2}s, {takes} take(s)", looper.loop_duration());
    for take in 1..=takes {
        log::info!("take {take}: recording");
        let started = looper.start_recording()?;
        // input that stalls still ends the take a second after it should have
        let deadline = started + looper.loop_duration() + 1.0;
        let wanted = looper.layers().len() + 1;
        while looper.layers().len() < wanted {
            let capturing = matches!(looper.state(), LooperState::Recording | LooperState::Overdubbing);
            if capturing && link.now() > deadline {
                log::warn!("take {take}: input stalled, stopping early");
                looper.stop_recording()?;
            }
            if let Err(e) = looper.update() {
                log::warn!("take {take} discarded: {e}");
                break;
            }
            std::thread::sleep(config.schedule_interval());
        }
    }

    let listen_until = link.now() + looper.loop_duration() * f64::from(listen);
    while link.now() < listen_until {
        looper.update()?;
        std::thread::sleep(config.schedule_interval());
    }
    looper.stop_playback();

    if let Some(path) = output {
        looper.save_wav(path)?;
    }
    session.capture_looper(&looper);
    Ok(())
}

fn wait_until(link: &AudioLink, time: f64) {
    while link.now() < time {
        std::thread::sleep(Duration::from_millis(20));
    }
}
