pub mod dispatcher;

use std::path::PathBuf;

use clap::Parser;

use crate::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "tuneshell", version, about = "Interactive command-line audio player")]
pub struct Args {
    /// Tracks to queue before the prompt opens
    pub files: Vec<PathBuf>,

    /// Playlist file (M3U) to load at startup
    #[arg(long)]
    pub playlist: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Preferred device sample rate; defaults to the device's own
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Initial volume, 0-100
    #[arg(long, default_value_t = 100.0)]
    pub volume: f32,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Decoder pulls allowed per render tick before padding with silence
    #[arg(long, default_value_t = 32)]
    pub decode_budget: usize,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_decode_steps: self.decode_budget.max(1),
            ..EngineConfig::default()
        }
    }
}
