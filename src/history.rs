//! Bounded, deduplicated prompt history backed by a JSON file.
//!
//! The file holds a plain array of prompt strings, oldest first. Older
//! releases wrote `[{"prompt": "..."}]` objects instead; those are migrated
//! on load. Persistence problems are logged and never surface as errors.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Ordered prompts, oldest first, never longer than its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLog {
    entries: Vec<String>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    fn from_entries(entries: Vec<String>, capacity: usize) -> Self {
        let mut log = Self {
            entries,
            capacity: capacity.max(1),
        };
        log.trim();
        log
    }

    /// Moves `prompt` to the most recent position, evicting the oldest
    /// entries past capacity.
    pub fn record(&mut self, prompt: &str) {
        self.entries.retain(|entry| entry != prompt);
        self.entries.push(prompt.to_string());
        self.trim();
    }

    fn trim(&mut self) {
        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(..overflow);
        }
    }

    pub fn oldest_first(&self) -> &[String] {
        &self.entries
    }

    pub fn newest_first(&self) -> Vec<String> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, prompt: &str) -> bool {
        self.entries.iter().any(|entry| entry == prompt)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredHistory {
    Bare(Vec<String>),
    Legacy(Vec<LegacyEntry>),
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    prompt: Option<String>,
}

impl StoredHistory {
    fn into_entries(self) -> Vec<String> {
        match self {
            // Recency order: a repeat keeps its latest position.
            Self::Bare(prompts) => {
                let mut seen = HashSet::new();
                let mut kept: Vec<String> = prompts
                    .into_iter()
                    .rev()
                    .filter(|prompt| seen.insert(prompt.clone()))
                    .collect();
                kept.reverse();
                kept
            }
            // Legacy files keep first-seen order.
            Self::Legacy(entries) => {
                let mut seen = HashSet::new();
                entries
                    .into_iter()
                    .filter_map(|entry| entry.prompt)
                    .filter(|prompt| seen.insert(prompt.clone()))
                    .collect()
            }
        }
    }
}

/// Parses stored history; `None` means the data is malformed.
fn parse_stored(raw: &str, capacity: usize) -> Option<HistoryLog> {
    let stored: StoredHistory = serde_json::from_str(raw).ok()?;
    Some(HistoryLog::from_entries(stored.into_entries(), capacity))
}

/// File-backed history shared between the aggregator and the host surfaces.
#[derive(Debug)]
pub struct HistoryStore {
    path: Option<PathBuf>,
    log: Mutex<HistoryLog>,
}

impl HistoryStore {
    /// Loads the history at `path`, falling back to an empty log.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let log = match fs::read_to_string(&path) {
            Ok(raw) => parse_stored(&raw, capacity).unwrap_or_else(|| {
                tracing::warn!(path = %path.display(), "prompt history is malformed; starting empty");
                HistoryLog::new(capacity)
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => HistoryLog::new(capacity),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read prompt history; starting empty");
                HistoryLog::new(capacity)
            }
        };
        tracing::debug!(path = %path.display(), entries = log.len(), "prompt history loaded");
        Self {
            path: Some(path),
            log: Mutex::new(log),
        }
    }

    /// History that lives only in memory.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            path: None,
            log: Mutex::new(HistoryLog::new(capacity)),
        }
    }

    pub fn snapshot(&self) -> HistoryLog {
        self.lock().clone()
    }

    /// Records `prompt` and rewrites the whole file.
    ///
    /// A write failure is logged; the in-memory log keeps the new entry.
    pub fn record(&self, prompt: &str) -> HistoryLog {
        let mut log = self.lock();
        log.record(prompt);
        if let Some(path) = &self.path {
            if let Err(err) = persist(path, &log) {
                tracing::warn!(path = %path.display(), error = %err, "failed to save prompt history");
            }
        }
        log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HistoryLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn persist(path: &Path, log: &HistoryLog) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(log.oldest_first()).map_err(io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_of(prompts: &[&str], capacity: usize) -> HistoryLog {
        let mut log = HistoryLog::new(capacity);
        for prompt in prompts {
            log.record(prompt);
        }
        log
    }

    #[test]
    fn records_never_duplicate_or_exceed_capacity() {
        let prompts = ["a", "b", "a", "c", "d", "b", "e", "a", "f", "g", "c"];
        let mut log = HistoryLog::new(4);
        for prompt in prompts {
            log.record(prompt);
            let unique: HashSet<&String> = log.oldest_first().iter().collect();
            assert_eq!(unique.len(), log.len());
            assert!(log.len() <= 4);
        }
        assert_eq!(log.oldest_first(), ["a", "f", "g", "c"]);
    }

    #[test]
    fn re_recording_moves_to_most_recent_without_growing() {
        let mut log = log_of(&["a", "b", "c"], 10);
        log.record("a");
        assert_eq!(log.oldest_first(), ["b", "c", "a"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let prompts: Vec<String> = (0..=DEFAULT_HISTORY_LIMIT).map(|i| format!("p{i}")).collect();
        let mut log = HistoryLog::new(DEFAULT_HISTORY_LIMIT);
        for prompt in &prompts {
            log.record(prompt);
        }
        assert_eq!(log.len(), DEFAULT_HISTORY_LIMIT);
        assert!(!log.contains("p0"));
        assert_eq!(log.oldest_first(), &prompts[1..]);
        assert_eq!(log.newest_first()[0], "p10");
    }

    #[test]
    fn legacy_entries_migrate_keeping_first_seen_order() {
        let log = parse_stored(r#"[{"prompt":"a"},{"prompt":"b"},{"prompt":"a"}]"#, 10).unwrap();
        assert_eq!(log.oldest_first(), ["a", "b"]);
    }

    #[test]
    fn legacy_entries_without_prompt_are_skipped() {
        let raw = r#"[{"prompt":"a","timestamp":"2024-01-01"},{"timestamp":"x"},{"prompt":"b"}]"#;
        let log = parse_stored(raw, 10).unwrap();
        assert_eq!(log.oldest_first(), ["a", "b"]);
    }

    #[test]
    fn bare_duplicates_collapse_onto_latest_occurrence() {
        let log = parse_stored(r#"["a","b","a","c"]"#, 10).unwrap();
        assert_eq!(log.oldest_first(), ["b", "a", "c"]);
    }

    #[test]
    fn oversized_file_is_trimmed_on_load() {
        let log = parse_stored(r#"["a","b","c","d"]"#, 2).unwrap();
        assert_eq!(log.oldest_first(), ["c", "d"]);
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        assert!(parse_stored("not json", 10).is_none());
        assert!(parse_stored(r#"{"prompt":"a"}"#, 10).is_none());
        assert!(parse_stored(r#"[1, 2]"#, 10).is_none());
        assert_eq!(parse_stored("[]", 10).unwrap().len(), 0);
    }

    #[test]
    fn store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let store = HistoryStore::load(&path, 3);
        assert!(store.snapshot().is_empty());
        store.record("first");
        store.record("second");
        let updated = store.record("first");
        assert_eq!(updated.oldest_first(), ["second", "first"]);

        let on_disk: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, ["second", "first"]);

        let reloaded = HistoryStore::load(&path, 3);
        assert_eq!(reloaded.snapshot(), updated);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ broken").unwrap();

        let store = HistoryStore::load(&path, 10);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn unwritable_path_keeps_in_memory_effect() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        let path = dir.path().join("history.json");
        fs::create_dir(&path).unwrap();

        let store = HistoryStore::load(&path, 10);
        let log = store.record("still here");
        assert_eq!(log.oldest_first(), ["still here"]);
        assert_eq!(store.snapshot().oldest_first(), ["still here"]);
    }
}
