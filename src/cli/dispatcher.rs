//! Text command front end. Maps one input line onto the engine, the
//! output device and the playlist, and reports back through a writer.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::engine::output::AudioOutput;
use crate::engine::{EndReason, PlaybackEngine, PlaybackState};
use crate::playlist::{Playlist, PlaylistError};

const HELP: &str = "\
Available commands:
  load <file>       - Append the entries of a playlist file.
  save <file>       - Save the current playlist to a file.
  add <path>        - Append one track to the playlist.
  remove <n>        - Remove entry n, as numbered by list.
  play [path]       - Play a file, resume, or start the playlist.
  pause             - Pause playback.
  resume            - Resume paused playback.
  stop              - Stop playback and release the track.
  next              - Play the next track in the playlist.
  previous          - Play the previous track in the playlist.
  volume <0-100>    - Set the playback volume.
  getvolume         - Show the playback volume.
  shuffle           - Shuffle the playlist.
  repeat on|off     - Repeat the current track.
  list              - List the playlist.
  info              - Show the current track.
  status            - Show state, position and volume.
  help              - Show this help.
  q, quit           - Exit.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Dispatcher<W: Write> {
    engine: PlaybackEngine,
    output: Box<dyn AudioOutput>,
    output_running: bool,
    device_fault_reported: bool,
    playlist: Playlist,
    out: W,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(
        engine: PlaybackEngine,
        output: Box<dyn AudioOutput>,
        playlist: Playlist,
        out: W,
    ) -> Self {
        Self {
            engine,
            output,
            output_running: false,
            device_fault_reported: false,
            playlist,
            out,
        }
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn prompt(&mut self) -> Result<()> {
        write!(self.out, "> ")?;
        self.out.flush()?;
        Ok(())
    }

    /// Runs one command line. Only failures to write the response are
    /// returned; command failures are reported to the user.
    pub fn dispatch(&mut self, line: &str) -> Result<Flow> {
        self.poll()?;

        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        tracing::debug!(command, arg, "dispatching");

        match command {
            "" => {}
            "q" | "quit" => {
                self.shutdown();
                return Ok(Flow::Quit);
            }
            "load" => self.cmd_load(arg)?,
            "save" => self.cmd_save(arg)?,
            "add" => self.cmd_add(arg)?,
            "remove" | "rm" => self.cmd_remove(arg)?,
            "play" => self.cmd_play(arg)?,
            "pause" => self.cmd_pause()?,
            "resume" => {
                if self.engine.state() != PlaybackState::Paused {
                    writeln!(self.out, "Nothing is paused.")?;
                } else if self.start_playback()? {
                    writeln!(self.out, "Resumed.")?;
                }
            }
            "stop" => {
                self.engine.stop();
                writeln!(self.out, "Stopped.")?;
            }
            "next" => match self.playlist.next().map(Path::to_path_buf) {
                Some(path) => {
                    self.play_path(&path)?;
                }
                None => writeln!(self.out, "No more songs in playlist.")?,
            },
            "previous" | "prev" => match self.playlist.previous().map(Path::to_path_buf) {
                Some(path) => {
                    self.play_path(&path)?;
                }
                None => writeln!(self.out, "No previous songs in playlist.")?,
            },
            "volume" => match arg.parse::<f32>() {
                Ok(percent) => {
                    let applied = self.engine.set_volume(percent / 100.0);
                    writeln!(self.out, "Volume set to {}%.", percent_of(applied))?;
                }
                Err(_) => writeln!(self.out, "Usage: volume <0-100>")?,
            },
            "getvolume" => {
                writeln!(self.out, "Current volume: {}%", percent_of(self.engine.volume()))?;
            }
            "shuffle" => {
                self.playlist.shuffle();
                writeln!(self.out, "Playlist shuffled.")?;
            }
            "repeat" => match arg {
                "on" | "off" => {
                    self.playlist.set_repeat(arg == "on");
                    let word = if arg == "on" { "enabled" } else { "disabled" };
                    writeln!(self.out, "Repeat {word}.")?;
                }
                _ => writeln!(self.out, "Usage: repeat on|off")?,
            },
            "list" => self.cmd_list()?,
            "info" => self.cmd_info()?,
            "status" => self.cmd_status()?,
            "help" => writeln!(self.out, "{HELP}")?,
            other => writeln!(self.out, "Command: '{other}' not implemented yet.")?,
        }
        Ok(Flow::Continue)
    }

    /// Handles tracks that ended on their own: reports faults and moves on
    /// through the playlist. Call this regularly between commands.
    pub fn poll(&mut self) -> Result<()> {
        if !self.device_fault_reported && !self.output.is_healthy() {
            self.device_fault_reported = true;
            writeln!(self.out, "Output device reported an error; playback may be silent.")?;
        }

        for ended in self.engine.poll_events() {
            if let EndReason::Fault(fault) = ended.reason {
                writeln!(self.out, "Playback of {} ended early: {fault}", ended.path.display())?;
            }
            if self.playlist.current() != Some(ended.path.as_path()) {
                continue;
            }
            self.advance_playlist()?;
        }
        Ok(())
    }

    /// Stops playback and the device stream.
    pub fn shutdown(&mut self) {
        self.engine.stop();
        if let Err(err) = self.output.stop() {
            tracing::warn!("output stop failed: {err}");
        }
        self.output_running = false;
    }

    /// Plays the first entry after the current one that opens. Entries that
    /// fail are reported and skipped.
    fn advance_playlist(&mut self) -> Result<()> {
        // With repeat on, `advance` keeps yielding the same entry.
        let attempts = if self.playlist.repeat() { 1 } else { self.playlist.len() };
        for _ in 0..attempts {
            let Some(path) = self.playlist.advance().map(Path::to_path_buf) else {
                writeln!(self.out, "End of playlist.")?;
                return Ok(());
            };
            if self.play_path(&path)? {
                return Ok(());
            }
        }
        Ok(())
    }

    fn cmd_load(&mut self, arg: &str) -> Result<()> {
        if arg.is_empty() {
            writeln!(self.out, "Usage: load <file>")?;
            return Ok(());
        }
        match self.playlist.load(arg) {
            Ok(added) => writeln!(self.out, "Playlist '{arg}' loaded ({added} tracks).")?,
            Err(err) => writeln!(self.out, "Error: {err}")?,
        }
        Ok(())
    }

    fn cmd_save(&mut self, arg: &str) -> Result<()> {
        if arg.is_empty() {
            writeln!(self.out, "Usage: save <file>")?;
            return Ok(());
        }
        match self.playlist.save(arg) {
            Ok(()) => writeln!(self.out, "Playlist saved to: {arg}")?,
            Err(err) => writeln!(self.out, "Error: {err}")?,
        }
        Ok(())
    }

    fn cmd_add(&mut self, arg: &str) -> Result<()> {
        if arg.is_empty() {
            writeln!(self.out, "Usage: add <path>")?;
            return Ok(());
        }
        self.playlist.add(arg);
        writeln!(self.out, "Added {arg} ({} tracks).", self.playlist.len())?;
        Ok(())
    }

    fn cmd_remove(&mut self, arg: &str) -> Result<()> {
        let Some(index) = arg.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) else {
            writeln!(self.out, "Usage: remove <n>")?;
            return Ok(());
        };
        match self.playlist.remove(index) {
            Ok(path) => writeln!(
                self.out,
                "Removed {} ({} tracks).",
                path.display(),
                self.playlist.len()
            )?,
            Err(PlaylistError::OutOfRange { len, .. }) => {
                writeln!(self.out, "No entry {arg}; the playlist has {len}.")?
            }
            Err(err) => writeln!(self.out, "Error: {err}")?,
        }
        Ok(())
    }

    /// Pauses the engine, then the device stream so it stops pulling.
    fn cmd_pause(&mut self) -> Result<()> {
        if !self.engine.pause() {
            writeln!(self.out, "Nothing is playing.")?;
            return Ok(());
        }
        if self.output_running {
            match self.output.pause() {
                Ok(()) => self.output_running = false,
                Err(err) => tracing::warn!("output pause failed: {err}"),
            }
        }
        writeln!(self.out, "Paused.")?;
        Ok(())
    }

    fn cmd_play(&mut self, arg: &str) -> Result<()> {
        if !arg.is_empty() {
            self.play_path(Path::new(arg))?;
            return Ok(());
        }

        match self.engine.state() {
            PlaybackState::Playing => writeln!(self.out, "Already playing.")?,
            PlaybackState::Paused => {
                if self.start_playback()? {
                    writeln!(self.out, "Resumed.")?;
                }
            }
            PlaybackState::Stopped => {
                let next = self
                    .playlist
                    .current()
                    .map(Path::to_path_buf)
                    .or_else(|| self.playlist.next().map(Path::to_path_buf));
                match next {
                    Some(path) => {
                        self.play_path(&path)?;
                    }
                    None => writeln!(self.out, "No songs in playlist.")?,
                }
            }
        }
        Ok(())
    }

    fn cmd_list(&mut self) -> Result<()> {
        if self.playlist.is_empty() {
            writeln!(self.out, "Playlist is empty.")?;
            return Ok(());
        }
        writeln!(self.out, "Current playlist:")?;
        let current = self.playlist.current_index();
        for (i, file) in self.playlist.files().iter().enumerate() {
            let marker = if Some(i) == current { '>' } else { '-' };
            writeln!(self.out, "{marker} {}. {}", i + 1, file.display())?;
        }
        Ok(())
    }

    fn cmd_info(&mut self) -> Result<()> {
        let Some(track) = self.engine.current_track_info() else {
            writeln!(self.out, "No track loaded.")?;
            return Ok(());
        };
        writeln!(self.out, "Title: {}", track.title)?;
        writeln!(self.out, "Artist: {}", track.artist)?;
        writeln!(self.out, "Album: {}", track.album)?;
        writeln!(self.out, "Duration: {}", track.duration_label())?;
        if let Some(codec) = &track.codec {
            writeln!(self.out, "Codec: {codec}")?;
        }
        if let (Some(rate), Some(channels)) = (track.sample_rate, track.channels) {
            match track.sample_format {
                Some(format) => writeln!(self.out, "Format: {format}, {rate} Hz, {channels} ch")?,
                None => writeln!(self.out, "Format: {rate} Hz, {channels} ch")?,
            }
        }
        writeln!(self.out, "File: {}", track.path.display())?;
        Ok(())
    }

    fn cmd_status(&mut self) -> Result<()> {
        let state = self.engine.state();
        let position = self.engine.position_secs() as u64;
        let duration = self
            .engine
            .current_track_info()
            .map(|t| t.duration_label())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            self.out,
            "State: {state}, {}:{:02} / {duration}, volume {}%, repeat {}",
            position / 60,
            position % 60,
            percent_of(self.engine.volume()),
            if self.playlist.repeat() { "on" } else { "off" },
        )?;
        Ok(())
    }

    /// Opens and starts `path`. Returns `false` when the file could not be
    /// opened.
    fn play_path(&mut self, path: &Path) -> Result<bool> {
        let track = match self.engine.open(path) {
            Ok(track) => track,
            Err(err) => {
                let stage = err.stage();
                tracing::warn!(path = %path.display(), stage, "open failed: {err}");
                writeln!(self.out, "Cannot play {} ({stage} stage): {err}", path.display())?;
                return Ok(false);
            }
        };
        if self.start_playback()? {
            writeln!(self.out, "Playing: {track}")?;
        }
        Ok(true)
    }

    /// Starts the engine and the device stream if it is not running.
    /// Device failures are reported and leave the engine stopped.
    fn start_playback(&mut self) -> Result<bool> {
        if !self.output_running {
            if let Err(err) = self.output.start() {
                tracing::warn!("output start failed: {err}");
                writeln!(self.out, "Output device error: {err}")?;
                self.engine.stop();
                return Ok(false);
            }
            self.output_running = true;
        }
        Ok(self.engine.start())
    }
}

fn percent_of(volume: f32) -> u32 {
    (volume * 100.0).round() as u32
}
