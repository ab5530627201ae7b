//! Date- and size-rotated log files.
//!
//! # File naming
//!
//! ```text
//! combined-2026-10-16.log      first file of the day
//! combined-2026-10-16.1.log    opened when the first one would exceed the size cap
//! combined-2026-10-16.2.log    ...
//! combined-2026-10-17.log      first write after midnight (local time)
//! ```
//!
//! # Invariants
//!
//! - A record is never appended to a non-empty file if doing so would push it
//!   past `max_size_bytes`; the next index is opened first. A single record
//!   larger than the cap still lands, alone, in a fresh file.
//! - The active handle is swapped under the same lock that serializes writes,
//!   so concurrent writers never see a half-rotated state.
//! - Every record is flushed to the file before the write returns.
//! - Retention is judged by the date in the file name: files dated more than
//!   `max_age_days` before today are deleted on every day change and by
//!   [`Transport::sweep`]. A failed scan is reported on stderr and never
//!   costs a record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;

use super::event::LogEvent;
use super::level::Level;
use super::sink::Transport;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Per-file limits for a [`RotatingFile`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RotationPolicy {
    pub max_size_bytes: u64,
    pub max_age_days: u32,
}

pub struct RotatingFile {
    dir: PathBuf,
    name: String,
    min_level: Level,
    policy: RotationPolicy,
    active: Mutex<Option<Active>>,
}

struct Active {
    date: NaiveDate,
    index: u32,
    size: u64,
    path: PathBuf,
    out: BufWriter<File>,
}

impl RotatingFile {
    /// Prepare a rotating transport writing `NAME-YYYY-MM-DD[.N].log` under
    /// `dir`. No file is opened until the first write.
    pub fn open(
        dir: impl Into<PathBuf>,
        name: &str,
        min_level: Level,
        policy: RotationPolicy,
    ) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            name: name.to_owned(),
            min_level,
            policy,
            active: Mutex::new(None),
        })
    }

    /// Path of the file currently receiving writes, if one is open.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.active.lock().as_ref().map(|a| a.path.clone())
    }

    /// Append `record` (already newline-terminated) using today's local date.
    pub fn write_record(&self, record: &[u8]) -> io::Result<()> {
        self.write_record_on(Local::now().date_naive(), record)
    }

    pub(crate) fn write_record_on(&self, today: NaiveDate, record: &[u8]) -> io::Result<()> {
        let len = record.len() as u64;
        let mut slot = self.active.lock();

        let mut active = match slot.take() {
            Some(active) if active.date == today => active,
            stale => {
                if let Some(mut stale) = stale {
                    stale.out.flush()?;
                }
                self.prune_or_report(today);
                self.open_for(today, 0)?
            }
        };

        if active.size > 0 && active.size + len > self.policy.max_size_bytes {
            active.out.flush()?;
            let next = active.index + 1;
            active = self.open_for(today, next)?;
        }

        let active = slot.insert(active);
        active.out.write_all(record)?;
        active.size += len;
        active.out.flush()
    }

    fn prune_or_report(&self, today: NaiveDate) {
        if let Err(e) = self.prune(today) {
            eprintln!("waypost: retention scan for `{}` failed: {e}", self.name);
        }
    }

    /// Delete files dated more than `max_age_days` before `today`.
    pub(crate) fn prune(&self, today: NaiveDate) -> io::Result<()> {
        let prefix = format!("{}-", self.name);
        for entry in fs::read_dir(&self.dir)? {
            let Ok(entry) = entry else { continue };
            let file_name = entry.file_name();
            let Some(date) = dated_name(&file_name.to_string_lossy(), &prefix) else {
                continue;
            };
            let age = today.signed_duration_since(date).num_days();
            if age > i64::from(self.policy.max_age_days) {
                // Another process may have removed it already.
                let _ = fs::remove_file(entry.path());
            }
        }
        Ok(())
    }

    /// Open the first file for `today`, starting at `index`, that still has
    /// room. Existing files are appended to, not truncated. A log directory
    /// removed while running is recreated.
    fn open_for(&self, today: NaiveDate, mut index: u32) -> io::Result<Active> {
        fs::create_dir_all(&self.dir)?;
        loop {
            let path = self.path_for(today, index);
            let size = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e),
            };
            if size > 0 && size >= self.policy.max_size_bytes {
                index += 1;
                continue;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            return Ok(Active { date: today, index, size, path, out: BufWriter::new(file) });
        }
    }

    fn path_for(&self, date: NaiveDate, index: u32) -> PathBuf {
        let date = date.format(DATE_FORMAT);
        let file_name = match index {
            0 => format!("{}-{date}.log", self.name),
            n => format!("{}-{date}.{n}.log", self.name),
        };
        self.dir.join(file_name)
    }
}

/// Parse the date out of `NAME-YYYY-MM-DD[.N].log`.
fn dated_name(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let rest = file_name.strip_prefix(prefix)?;
    if !rest.ends_with(".log") {
        return None;
    }
    let date = rest.get(..10)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

impl Transport for RotatingFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn log(&self, event: &LogEvent) -> io::Result<()> {
        let mut line = event.to_json_line();
        line.push('\n');
        self.write_record(line.as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        match self.active.lock().as_mut() {
            Some(active) => active.out.flush(),
            None => Ok(()),
        }
    }

    fn sweep(&self) -> io::Result<()> {
        self.prune(Local::now().date_naive())
    }
}
