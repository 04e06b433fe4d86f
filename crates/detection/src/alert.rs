use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Receives each new fire alert.
pub trait AlertSink: Send {
    fn fire_detected(&self, at: DateTime<Utc>, raw_response: &str) -> io::Result<()>;
}

/// Appends one line per alert to a text file.
pub struct FileAlertLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAlertLog {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn alert_line(at: DateTime<Utc>, raw_response: &str) -> String {
    format!(
        "{} FIRE DETECTED → {}\n",
        at.format("%Y-%m-%d %H:%M:%S%.6f"),
        raw_response.trim()
    )
}

impl AlertSink for FileAlertLog {
    fn fire_detected(&self, at: DateTime<Utc>, raw_response: &str) -> io::Result<()> {
        let line = alert_line(at, raw_response);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}
