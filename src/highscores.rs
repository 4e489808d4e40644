//! Persist the local high-score table to disk (XDG config or ~/.config/matchgrid).
//!
//! One `name:score` record per line, best first. A missing file is seeded with ten defaults.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

const FILENAME: &str = "scores";

/// Entries kept in the table.
pub const SCORE_SLOTS: usize = 10;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad score record on line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// A `(name, score)` pair, as stored in the score file and sent as `HISCORE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub name: String,
    pub score: u32,
}

impl ScoreEntry {
    pub fn new(name: impl Into<String>, score: u32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

impl fmt::Display for ScoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.score)
    }
}

impl FromStr for ScoreEntry {
    type Err = String;

    /// `name:score`; the score is after the last colon so names may contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, score) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| format!("missing ':' in {s:?}"))?;
        let score = score
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("bad score {score:?}: {e}"))?;
        Ok(Self::new(name, score))
    }
}

/// `Level 10`→10000 down to `Level 1`→1000.
pub fn default_scores() -> Vec<ScoreEntry> {
    (1..=SCORE_SLOTS as u32)
        .rev()
        .map(|level| ScoreEntry::new(format!("Level {level}"), level * 1000))
        .collect()
}

/// Returns the default path to the score file (config dir / matchgrid / scores).
pub fn config_path() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if xdg.is_empty() {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".config")
        } else {
            PathBuf::from(xdg)
        }
    } else {
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".config"))
            .unwrap_or_else(|_| PathBuf::from("."))
    };
    base.join("matchgrid").join(FILENAME)
}

/// Sorts best first. Stable, so equal scores keep their order.
pub fn sort_descending(entries: &mut [ScoreEntry]) {
    entries.sort_by(|a, b| b.score.cmp(&a.score));
}

/// The local high-score table and where it lives.
#[derive(Debug, Clone)]
pub struct ScoreStore {
    path: PathBuf,
    entries: Vec<ScoreEntry>,
}

impl ScoreStore {
    /// Loads the table, creating the file with [`default_scores`] if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScoreError> {
        let path = path.into();
        if !path.exists() {
            info!(path = %path.display(), "no score file, writing defaults");
            let store = Self {
                path,
                entries: default_scores(),
            };
            store.save()?;
            return Ok(store);
        }
        let entries = load_entries(&path)?;
        Ok(Self { path, entries })
    }

    /// Like [`ScoreStore::open`], but logs failures and falls back to the defaults in memory.
    pub fn open_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load scores, using defaults");
                Self {
                    path,
                    entries: default_scores(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    /// Best score in the table, 0 when empty.
    pub fn high_score(&self) -> u32 {
        self.entries.first().map_or(0, |e| e.score)
    }

    /// True if `score` would earn a place in the table.
    pub fn qualifies(&self, score: u32) -> bool {
        self.entries.len() < SCORE_SLOTS || self.entries.last().is_some_and(|e| score >= e.score)
    }

    /// Inserts before the first entry with a lower or equal score and drops whatever falls off the end.
    /// Returns the rank the entry landed at, or `None` if it did not qualify.
    pub fn insert(&mut self, name: impl Into<String>, score: u32) -> Option<usize> {
        let position = self
            .entries
            .iter()
            .position(|e| score >= e.score)
            .or_else(|| (self.entries.len() < SCORE_SLOTS).then_some(self.entries.len()))?;
        self.entries.insert(position, ScoreEntry::new(name, score));
        self.entries.truncate(SCORE_SLOTS);
        Some(position)
    }

    /// Writes the table back. Creates the config directory if needed.
    pub fn save(&self) -> Result<(), ScoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut f = BufWriter::new(fs::File::create(&self.path)?);
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        f.flush()?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "scores written");
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<Vec<ScoreEntry>, ScoreError> {
    debug!(path = %path.display(), "reading scores");
    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = line
            .parse::<ScoreEntry>()
            .map_err(|reason| ScoreError::Parse { line: i + 1, reason })?;
        entries.push(entry);
    }
    sort_descending(&mut entries);
    entries.truncate(SCORE_SLOTS);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("matchgrid-test-{}-{}", std::process::id(), name))
            .join(FILENAME)
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_defaults_are_ten_descending() {
        let scores = default_scores();
        assert_eq!(scores.len(), 10);
        assert_eq!(scores[0], ScoreEntry::new("Level 10", 10_000));
        assert_eq!(scores[9], ScoreEntry::new("Level 1", 1_000));
        assert!(scores.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!("bob:900".parse::<ScoreEntry>(), Ok(ScoreEntry::new("bob", 900)));
        assert_eq!("a:b:12".parse::<ScoreEntry>(), Ok(ScoreEntry::new("a:b", 12)));
        assert!("nobody".parse::<ScoreEntry>().is_err());
        assert!("x:lots".parse::<ScoreEntry>().is_err());
    }

    #[test]
    fn test_open_missing_file_seeds_defaults() {
        let path = temp_path("seed");
        cleanup(&path);
        let store = ScoreStore::open(&path).unwrap();
        assert_eq!(store.entries(), default_scores().as_slice());
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().next(), Some("Level 10:10000"));
        assert_eq!(written.lines().count(), 10);
        cleanup(&path);
    }

    #[test]
    fn test_insert_save_reload() {
        let path = temp_path("insert");
        cleanup(&path);
        let mut store = ScoreStore::open(&path).unwrap();
        assert!(store.qualifies(5_500));
        assert_eq!(store.insert("ana", 5_500), Some(5));
        assert_eq!(store.entries().len(), SCORE_SLOTS);
        assert_eq!(store.entries().last().unwrap().name, "Level 2");
        store.save().unwrap();

        let reloaded = ScoreStore::open(&path).unwrap();
        assert_eq!(reloaded.entries()[5], ScoreEntry::new("ana", 5_500));
        assert_eq!(reloaded.high_score(), 10_000);
        cleanup(&path);
    }

    #[test]
    fn test_low_score_does_not_qualify() {
        let path = temp_path("low");
        cleanup(&path);
        let mut store = ScoreStore::open(&path).unwrap();
        assert!(!store.qualifies(999));
        assert_eq!(store.insert("nope", 999), None);
        assert_eq!(store.entries(), default_scores().as_slice());
        cleanup(&path);
    }

    #[test]
    fn test_tie_goes_above_existing() {
        let path = temp_path("tie");
        cleanup(&path);
        let mut store = ScoreStore::open(&path).unwrap();
        assert_eq!(store.insert("tied", 3_000), Some(7));
        assert_eq!(store.entries()[8].name, "Level 3");
        cleanup(&path);
    }

    #[test]
    fn test_corrupt_file_is_error_and_fallback_uses_defaults() {
        let path = temp_path("corrupt");
        cleanup(&path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "ok:10\nbroken line\n").unwrap();
        assert!(matches!(
            ScoreStore::open(&path),
            Err(ScoreError::Parse { line: 2, .. })
        ));
        let store = ScoreStore::open_or_default(&path);
        assert_eq!(store.high_score(), 10_000);
        cleanup(&path);
    }
}
