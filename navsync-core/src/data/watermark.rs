//! Persistent per-subject watermark: `{ "<subject id>": "DD-MM-YYYY" }`.
//!
//! The file is only ever touched by the orchestrator thread. Updates are
//! merged into a fresh read of the file so keys written by other runs
//! survive, then written atomically (`.tmp` + rename). If the write fails the
//! delta is dumped under `{dir}/temp/` so it can be replayed by hand.

use crate::dates::{format_date, parse_date};
use crate::domain::SubjectId;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("watermark file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read watermark {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("failed to parse watermark {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to write watermark {}: {message}{}", .path.display(), fallback_note(.fallback))]
    Write {
        path: PathBuf,
        message: String,
        /// Where the unapplied delta was dumped, if the dump itself succeeded.
        fallback: Option<PathBuf>,
    },
}

fn fallback_note(fallback: &Option<PathBuf>) -> String {
    match fallback {
        Some(p) => format!(" (delta saved to {})", p.display()),
        None => " (delta could not be saved)".to_string(),
    }
}

/// In-memory watermark. Dates are kept in their wire form so entries the
/// pipeline cannot parse are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(BTreeMap<SubjectId, String>);

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.0.contains_key(subject)
    }

    /// Raw stored value for a subject.
    pub fn get(&self, subject: &str) -> Option<&str> {
        self.0.get(subject).map(String::as_str)
    }

    /// Parsed date for a subject; `None` if absent or unparseable.
    pub fn date(&self, subject: &str) -> Option<NaiveDate> {
        self.get(subject).and_then(|v| parse_date(v).ok())
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Split entries into parsed dates and raw values that failed to parse.
    pub fn parsed(&self) -> (Vec<(SubjectId, NaiveDate)>, Vec<(SubjectId, String)>) {
        let mut good = Vec::with_capacity(self.0.len());
        let mut bad = Vec::new();
        for (subject, raw) in &self.0 {
            match parse_date(raw) {
                Ok(date) => good.push((subject.clone(), date)),
                Err(_) => bad.push((subject.clone(), raw.clone())),
            }
        }
        (good, bad)
    }

    /// Set one subject, keeping the later of the stored and new dates.
    /// Returns true if the stored value changed.
    pub fn advance(&mut self, subject: &str, date: NaiveDate) -> bool {
        match self.date(subject) {
            Some(current) if current >= date => false,
            _ => {
                self.0.insert(subject.to_string(), format_date(date));
                true
            }
        }
    }

    /// Merge a delta into this watermark. Never moves a date backwards and
    /// never removes a key. Returns the number of entries that changed.
    pub fn merge(&mut self, delta: &BTreeMap<SubjectId, NaiveDate>) -> usize {
        delta
            .iter()
            .filter(|(subject, date)| self.advance(subject, **date))
            .count()
    }
}

impl FromIterator<(SubjectId, NaiveDate)> for Watermark {
    fn from_iter<I: IntoIterator<Item = (SubjectId, NaiveDate)>>(iter: I) -> Self {
        let mut wm = Watermark::new();
        for (subject, date) in iter {
            wm.advance(&subject, date);
        }
        wm
    }
}

/// File-backed watermark store.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that receives fallback dumps: `{dir}/temp`.
    pub fn fallback_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(|p| p.join("temp"))
            .unwrap_or_else(|| PathBuf::from("temp"))
    }

    /// Load the watermark. A missing file is an error.
    pub fn load(&self) -> Result<Watermark, WatermarkError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(WatermarkError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => {
                return Err(WatermarkError::Read {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Watermark::new());
        }

        serde_json::from_str(&content).map_err(|e| WatermarkError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Load the watermark, treating a missing file as empty.
    pub fn load_or_default(&self) -> Result<Watermark, WatermarkError> {
        match self.load() {
            Err(WatermarkError::NotFound { .. }) => {
                debug!(path = %self.path.display(), "no watermark file yet, starting empty");
                Ok(Watermark::new())
            }
            other => other,
        }
    }

    /// Re-read the file, merge `delta` into it and write it back atomically.
    ///
    /// On a write failure the delta is dumped to
    /// `{dir}/temp/updates_{YYYYMMDDTHHMMSSZ}.json` and the error is returned.
    pub fn merge_update(
        &self,
        delta: &BTreeMap<SubjectId, NaiveDate>,
    ) -> Result<Watermark, WatermarkError> {
        let mut current = self.load_or_default()?;
        let changed = current.merge(delta);
        debug!(changed, delta = delta.len(), "merging watermark delta");

        if let Err(message) = self.write_atomic(&current) {
            let fallback = self.dump_delta(delta);
            error!(
                path = %self.path.display(),
                fallback = ?fallback,
                "watermark write failed: {message}"
            );
            return Err(WatermarkError::Write {
                path: self.path.clone(),
                message,
                fallback,
            });
        }
        Ok(current)
    }

    /// Overwrite the file with `watermark`.
    pub fn replace(&self, watermark: &Watermark) -> Result<(), WatermarkError> {
        self.write_atomic(watermark)
            .map_err(|message| WatermarkError::Write {
                path: self.path.clone(),
                message,
                fallback: None,
            })
    }

    fn write_atomic(&self, watermark: &Watermark) -> Result<(), String> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| format!("create dir: {e}"))?;
        }

        let mut body =
            serde_json::to_string_pretty(watermark).map_err(|e| format!("serialize: {e}"))?;
        body.push('\n');

        let tmp = tmp_path(&self.path).ok_or_else(|| "path has no file name".to_string())?;
        fs::write(&tmp, body).map_err(|e| format!("write temp file: {e}"))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            format!("atomic rename failed: {e}")
        })
    }

    fn dump_delta(&self, delta: &BTreeMap<SubjectId, NaiveDate>) -> Option<PathBuf> {
        let dir = self.fallback_dir();
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let path = dir.join(format!("updates_{stamp}.json"));

        let wire: BTreeMap<&str, String> = delta
            .iter()
            .map(|(k, v)| (k.as_str(), format_date(*v)))
            .collect();

        let result = fs::create_dir_all(&dir)
            .map_err(|e| e.to_string())
            .and_then(|_| serde_json::to_string_pretty(&wire).map_err(|e| e.to_string()))
            .and_then(|body| fs::write(&path, body + "\n").map_err(|e| e.to_string()));

        match result {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), "could not dump watermark delta: {e}");
                None
            }
        }
    }
}

fn tmp_path(path: &Path) -> Option<PathBuf> {
    let mut name = path.file_name()?.to_os_string();
    name.push(".tmp");
    Some(path.with_file_name(name))
}
