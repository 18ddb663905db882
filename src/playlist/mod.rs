//! Ordered list of track paths with a cursor, shuffle and repeat.
//!
//! Playlist files are plain M3U: one path per line, lines starting with `#`
//! are comments.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

const M3U_HEADER: &str = "#EXTM3U";

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("cannot read playlist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write playlist {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no entry at position {index} (playlist has {len})")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Default, Clone)]
pub struct Playlist {
    files: Vec<PathBuf>,
    cursor: Option<usize>,
    repeat: bool,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every entry of the playlist file at `path`. Returns how many
    /// were added.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<usize, PlaylistError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PlaylistError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let before = self.files.len();
        self.files.extend(
            text.lines()
                .map(str::trim_end)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(PathBuf::from),
        );
        let added = self.files.len() - before;
        tracing::info!(path = %path.display(), added, "playlist loaded");
        Ok(added)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PlaylistError> {
        let path = path.as_ref();
        let write_err = |source| PlaylistError::Write {
            path: path.to_path_buf(),
            source,
        };

        let file = fs::File::create(path).map_err(write_err)?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{M3U_HEADER}").map_err(write_err)?;
        for entry in &self.files {
            writeln!(out, "{}", entry.display()).map_err(write_err)?;
        }
        out.flush().map_err(write_err)?;
        tracing::info!(path = %path.display(), entries = self.files.len(), "playlist saved");
        Ok(())
    }

    pub fn add(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Removes the entry at `index`. Removing the current entry moves the
    /// cursor back one so that `next()` yields the entry that followed it.
    pub fn remove(&mut self, index: usize) -> Result<PathBuf, PlaylistError> {
        if index >= self.files.len() {
            return Err(PlaylistError::OutOfRange {
                index,
                len: self.files.len(),
            });
        }
        let removed = self.files.remove(index);
        self.cursor = match self.cursor {
            Some(cur) if index < cur => Some(cur - 1),
            Some(cur) if index == cur => cur.checked_sub(1),
            other => other,
        };
        if self.files.is_empty() {
            self.cursor = None;
        }
        Ok(removed)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn current(&self) -> Option<&Path> {
        self.cursor.and_then(|i| self.files.get(i)).map(PathBuf::as_path)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    /// Moves forward, wrapping at the end. With repeat on, stays put.
    pub fn next(&mut self) -> Option<&Path> {
        let len = self.files.len();
        if len == 0 {
            return None;
        }
        if !(self.repeat && self.cursor.is_some()) {
            self.cursor = Some(self.cursor.map_or(0, |i| (i + 1) % len));
        }
        self.current()
    }

    /// Moves backward, wrapping at the start. With repeat on, stays put.
    pub fn previous(&mut self) -> Option<&Path> {
        let len = self.files.len();
        if len == 0 {
            return None;
        }
        if !(self.repeat && self.cursor.is_some()) {
            self.cursor = Some(self.cursor.map_or(len - 1, |i| (i + len - 1) % len));
        }
        self.current()
    }

    /// Entry to play after the current one finished on its own. Unlike
    /// `next()` this does not wrap past the last entry.
    pub fn advance(&mut self) -> Option<&Path> {
        let len = self.files.len();
        if len == 0 {
            return None;
        }
        match self.cursor {
            Some(_) if self.repeat => {}
            None => self.cursor = Some(0),
            Some(i) if i + 1 < len => self.cursor = Some(i + 1),
            Some(_) => return None,
        }
        self.current()
    }

    /// Randomizes the order. The cursor is cleared, so the next `next()`
    /// starts at the first shuffled entry.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.files.shuffle(rng);
        self.cursor = None;
        tracing::debug!(entries = self.files.len(), "playlist shuffled");
    }

    pub fn set_repeat(&mut self, enabled: bool) {
        self.repeat = enabled;
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn playlist(entries: &[&str]) -> Playlist {
        let mut p = Playlist::new();
        for e in entries {
            p.add(*e);
        }
        p
    }

    fn name(p: Option<&Path>) -> Option<String> {
        p.map(|p| p.display().to_string())
    }

    #[test]
    fn load_skips_comments_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("list.m3u");
        fs::write(&file, "#EXTM3U\r\n/music/a.flac\r\n\n# note\n/music/b.mp3  \n").unwrap();

        let mut p = Playlist::new();
        assert_eq!(p.load(&file).unwrap(), 2);
        assert_eq!(p.files(), &[PathBuf::from("/music/a.flac"), PathBuf::from("/music/b.mp3")]);
        assert!(p.current().is_none());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let mut p = Playlist::new();
        let err = p.load("/definitely/not/here.m3u").unwrap_err();
        assert!(matches!(err, PlaylistError::Read { .. }));
        assert!(p.is_empty());
    }

    #[test]
    fn saved_playlist_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.m3u");
        let p = playlist(&["a.wav", "b.wav"]);
        p.save(&file).unwrap();

        let text = fs::read_to_string(&file).unwrap();
        assert!(text.starts_with("#EXTM3U\n"));

        let mut q = Playlist::new();
        q.load(&file).unwrap();
        assert_eq!(q.files(), p.files());
    }

    #[test]
    fn next_and_previous_wrap() {
        let mut p = playlist(&["a", "b", "c"]);
        assert_eq!(name(p.next()).as_deref(), Some("a"));
        assert_eq!(name(p.next()).as_deref(), Some("b"));
        assert_eq!(name(p.next()).as_deref(), Some("c"));
        assert_eq!(name(p.next()).as_deref(), Some("a"));
        assert_eq!(name(p.previous()).as_deref(), Some("c"));
    }

    #[test]
    fn previous_without_cursor_starts_at_the_end() {
        let mut p = playlist(&["a", "b", "c"]);
        assert_eq!(name(p.previous()).as_deref(), Some("c"));
    }

    #[test]
    fn empty_playlist_yields_nothing() {
        let mut p = Playlist::new();
        assert!(p.next().is_none());
        assert!(p.previous().is_none());
        assert!(p.advance().is_none());
    }

    #[test]
    fn repeat_holds_the_current_entry() {
        let mut p = playlist(&["a", "b"]);
        p.set_repeat(true);
        // Nothing selected yet, so the first step still moves.
        assert_eq!(name(p.next()).as_deref(), Some("a"));
        assert_eq!(name(p.next()).as_deref(), Some("a"));
        assert_eq!(name(p.previous()).as_deref(), Some("a"));
        assert_eq!(name(p.advance()).as_deref(), Some("a"));
        p.set_repeat(false);
        assert_eq!(name(p.next()).as_deref(), Some("b"));
    }

    #[test]
    fn advance_stops_at_the_end() {
        let mut p = playlist(&["a", "b"]);
        assert_eq!(name(p.advance()).as_deref(), Some("a"));
        assert_eq!(name(p.advance()).as_deref(), Some("b"));
        assert!(p.advance().is_none());
        assert_eq!(name(p.current()).as_deref(), Some("b"));
    }

    #[test]
    fn shuffle_keeps_entries_and_resets_cursor() {
        let mut p = playlist(&["a", "b", "c", "d", "e", "f"]);
        p.next();
        p.next();
        p.shuffle_with(&mut StdRng::seed_from_u64(7));
        assert!(p.current().is_none());

        let mut sorted: Vec<_> = p.files().to_vec();
        sorted.sort();
        assert_eq!(sorted, playlist(&["a", "b", "c", "d", "e", "f"]).files());

        let first = p.files()[0].clone();
        assert_eq!(p.next(), Some(first.as_path()));
    }

    #[test]
    fn removing_entries_keeps_cursor_consistent() {
        let mut p = playlist(&["a", "b", "c"]);
        p.next();
        p.next();
        assert_eq!(p.remove(0).unwrap(), PathBuf::from("a"));
        assert_eq!(name(p.current()).as_deref(), Some("b"));

        p.remove(0).unwrap();
        assert!(p.current().is_none());
        assert_eq!(name(p.next()).as_deref(), Some("c"));

        assert!(matches!(p.remove(5), Err(PlaylistError::OutOfRange { index: 5, len: 1 })));
    }
}
