use anyhow::Result;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Receiver-side event sink. Every hook defaults to doing nothing.
pub trait Logger: Send + Sync {
    fn listening(&self, _addr: &str, _root: &Path) {}
    fn connected(&self, _transfer: &str, _peer: &str) {}
    fn dir_created(&self, _path: &Path) {}
    fn file_saved(&self, _name: &str, _path: &Path, _bytes: u64) {}
    fn error(&self, _context: &str, _msg: &str) {}
    fn done(&self, _transfer: &str, _files: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Appends to `<dir>/<YYYY-MM-DD>.log`, switching files when the date changes.
pub struct TextLogger {
    dir: PathBuf,
    current: Mutex<Option<(NaiveDate, File)>>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let logger = Self {
            dir,
            current: Mutex::new(None),
        };
        let today = Local::now().date_naive();
        *logger.current.lock() = Some((today, logger.open(today)?));
        Ok(logger)
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.log", date.format("%Y-%m-%d")))
    }

    fn open(&self, date: NaiveDate) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(date))
    }

    fn line(&self, level: &str, msg: &str) {
        let now = Local::now();
        let today = now.date_naive();
        let mut guard = self.current.lock();
        let stale = !matches!(&*guard, Some((date, _)) if *date == today);
        if stale {
            match self.open(today) {
                Ok(f) => *guard = Some((today, f)),
                Err(_) => return,
            }
        }
        if let Some((_, f)) = guard.as_mut() {
            let _ = writeln!(f, "{} : {} : reloc : {}", now.to_rfc3339(), level, msg);
        }
    }
}

impl Logger for TextLogger {
    fn listening(&self, addr: &str, root: &Path) {
        self.line("INFO", &format!("Server started on {}, saving to {}.", addr, root.display()));
    }
    fn connected(&self, transfer: &str, peer: &str) {
        self.line("INFO", &format!("Connected by client {} (transfer {}).", peer, transfer));
    }
    fn dir_created(&self, path: &Path) {
        self.line("INFO", &format!("Created folder on path {}.", path.display()));
    }
    fn file_saved(&self, name: &str, path: &Path, bytes: u64) {
        self.line(
            "INFO",
            &format!("Saved file \"{}\" on path {} ({} bytes).", name, path.display(), bytes),
        );
    }
    fn error(&self, context: &str, msg: &str) {
        self.line("ERROR", &format!("{}: {}", context, msg));
    }
    fn done(&self, transfer: &str, files: u64, bytes: u64, seconds: f64) {
        self.line(
            "INFO",
            &format!("Transfer {transfer} done: files={files} bytes={bytes} seconds={seconds:.3}"),
        );
    }
}
