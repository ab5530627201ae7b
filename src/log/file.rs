//! Unrotated append-only file transport, used for process-fatal events.
//! Each record is flushed before `log` returns.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::event::LogEvent;
use super::level::Level;
use super::sink::Transport;

pub struct FileTransport {
    name: String,
    path: PathBuf,
    min_level: Level,
    out: Mutex<BufWriter<File>>,
}

impl FileTransport {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        Ok(Self {
            name,
            path,
            min_level: Level::Debug,
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn log(&self, event: &LogEvent) -> io::Result<()> {
        let mut line = event.to_json_line();
        line.push('\n');
        let mut out = self.out.lock();
        out.write_all(line.as_bytes())?;
        out.flush()
    }

    fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exceptions.log");

        let first = FileTransport::open(&path).unwrap();
        first.log(&LogEvent::new(Level::Error, "one")).unwrap();
        first.flush().unwrap();
        drop(first);

        let second = FileTransport::open(&path).unwrap();
        second.log(&LogEvent::new(Level::Error, "two")).unwrap();
        second.flush().unwrap();

        let text = std::fs::read_to_string(second.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(second.name(), "exceptions.log");
    }

    #[test]
    fn record_is_on_disk_before_flush() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::open(dir.path().join("rejections.log")).unwrap();

        transport.log(&LogEvent::new(Level::Error, "Unhandled Rejection")).unwrap();

        let text = std::fs::read_to_string(transport.path()).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("Unhandled Rejection"));
    }
}
