// src/main.rs

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use looprack::action::{Action, ActionTable, Dispatcher};
use looprack::audio_engine::AudioEngine;
use looprack::recorder::monitor::load_ratio;
use looprack::sample::loader::load_sample;
use looprack::settings::{self, BindingTrigger, DEFAULT_SETTINGS_FILE};
use looprack::{audio_device, audio_io, midi};

struct Args {
    settings_path: PathBuf,
    calibrate: bool,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        settings_path: PathBuf::from(DEFAULT_SETTINGS_FILE),
        calibrate: false,
        list_devices: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--calibrate" => args.calibrate = true,
            "--list-devices" => args.list_devices = true,
            flag if flag.starts_with("--") => anyhow::bail!("Unknown option {flag}"),
            path => args.settings_path = PathBuf::from(path),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    if args.list_devices {
        print!("{}", audio_device::describe_devices()?);
        for (name, _) in midi::get_midi_ports()? {
            println!("midi {name}");
        }
        return Ok(());
    }

    let settings = settings::load_settings(&args.settings_path)
        .with_context(|| format!("Loading {}", args.settings_path.display()))?;
    let table = ActionTable::from_settings(&settings)?;

    let setup = audio_io::negotiate(&settings)?;
    let sample_rate = setup.sample_rate();

    let base_dir = args.settings_path.parent().unwrap_or(Path::new("."));
    let samples = settings
        .samples
        .iter()
        .map(|s| load_sample(&s.resolve(base_dir), sample_rate))
        .collect::<looprack::Result<Vec<_>>>()?;

    let (engine, controls) = AudioEngine::from_settings(
        &settings,
        samples,
        sample_rate,
        setup.input_channels(),
        setup.output_channels(),
    )?;
    let cpu_load = controls.cpu_load.clone();
    let xrun_count = Arc::new(AtomicUsize::new(0));
    let _streams = audio_io::run_streams(&setup, engine, xrun_count.clone())?;

    let dispatcher = Arc::new(Mutex::new(
        Dispatcher::new(table, controls.samples, controls.recorder, sample_rate).with_tracks(controls.audio_tracks),
    ));

    if args.calibrate {
        lock(&dispatcher)?.dispatch(Action::Calibrate, true);
    }

    let _midi = match midi::connect(settings.midi_port_name.as_deref(), settings.midi_channel, dispatcher.clone()) {
        Ok(connection) => Some(connection),
        Err(e) => {
            log::warn!("MIDI disabled: {e:#}");
            None
        }
    };

    log::info!("Type a bound key and press enter to trigger it, 'q' to quit");
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line == "q" {
            break;
        }
        for key in line.chars() {
            let mut dispatcher = lock(&dispatcher)?;
            if dispatcher.handle(BindingTrigger::Key(key), true).is_none() {
                log::warn!("No binding for key '{key}'");
                continue;
            }
            dispatcher.handle(BindingTrigger::Key(key), false);
        }
        log::debug!(
            "cpu {:.1}%, xruns {}",
            load_ratio(&cpu_load) * 100.0,
            xrun_count.load(Ordering::Relaxed)
        );
    }

    let mut dispatcher = lock(&dispatcher)?;
    dispatcher.recorder_mut().stop();
    log::info!("Stopped after {} frames", dispatcher.recorder().shared().frame());
    Ok(())
}

fn lock(dispatcher: &Mutex<Dispatcher>) -> Result<std::sync::MutexGuard<'_, Dispatcher>> {
    dispatcher
        .lock()
        .map_err(|_| anyhow::anyhow!("Dispatcher lock poisoned"))
}
