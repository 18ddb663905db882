use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tuneshell::cli::dispatcher::{Dispatcher, Flow};
use tuneshell::cli::Args;
use tuneshell::engine::output::cpal_backend::CpalBackend;
use tuneshell::engine::output::device;
use tuneshell::engine::{OutputSpec, PlaybackEngine};
use tuneshell::playlist::Playlist;

/// How often finished tracks are picked up while waiting for input.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tuneshell=info")),
        )
        .with_writer(io::stderr)
        .init();

    let host = cpal::default_host();
    if args.list_devices {
        for (i, name) in device::list_devices(&host)?.iter().enumerate() {
            println!("#{i}: {name}");
        }
        return Ok(());
    }

    let device = device::pick_device(&host, args.device.as_deref())?;
    let supported = device::pick_output_config(&device, args.sample_rate)
        .context("no usable output configuration")?;
    let config = args.engine_config();
    let (engine, renderer) = PlaybackEngine::new(OutputSpec::new(supported.sample_rate()), &config);
    let backend = CpalBackend::new(&device, supported, renderer, &config)
        .context("failed to open output device")?;
    engine.set_volume(args.volume / 100.0);

    let mut playlist = Playlist::new();
    if let Some(path) = &args.playlist {
        playlist
            .load(path)
            .with_context(|| format!("failed to load playlist {}", path.display()))?;
    }
    for file in &args.files {
        playlist.add(file.clone());
    }

    let stdout = io::stdout();
    let mut dispatcher = Dispatcher::new(engine, Box::new(backend), playlist, stdout.lock());
    run(&mut dispatcher)?;
    drop(dispatcher);

    println!("Exiting.");
    Ok(())
}

/// Reads commands on a helper thread so the loop can keep picking up
/// finished tracks while the user is idle.
fn run<W: Write>(dispatcher: &mut Dispatcher<W>) -> Result<()> {
    let (tx, rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("stdin read failed: {err}");
                        break;
                    }
                }
            }
        })
        .context("failed to spawn stdin reader")?;

    dispatcher.prompt()?;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if dispatcher.dispatch(&line)? == Flow::Quit {
                    return Ok(());
                }
                dispatcher.prompt()?;
            }
            Err(RecvTimeoutError::Timeout) => dispatcher.poll()?,
            Err(RecvTimeoutError::Disconnected) => {
                dispatcher.shutdown();
                return Ok(());
            }
        }
    }
}
