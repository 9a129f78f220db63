//! Durable session exports.
//!
//! - `game_history_<id>.json`: full history, rewritten atomically after every
//!   mutation so the file is always a complete snapshot.
//! - `planning_log_<id>.json`: every oracle consultation, written at session end.
//! - `performance_<id>_<stamp>.csv`: one row per action entry, written at session end.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{PlanningEntry, StateEntry};
use crate::io::atomic::write_atomic;

const PERFORMANCE_HEADER: [&str; 5] = [
    "Move Number",
    "Action",
    "Score",
    "Timestamp",
    "Planning Notes",
];

/// Destination for session history.
pub trait HistorySink {
    /// Replace the stored history with `history` in full.
    fn write_history(&mut self, history: &[StateEntry]) -> Result<()>;

    /// Store the planning log; returns where it went, if anywhere on disk.
    fn write_planning_log(&mut self, planning: &[PlanningEntry]) -> Result<Option<PathBuf>>;

    /// Store the per-action performance table; returns where it went, if anywhere on disk.
    fn write_performance(&mut self, history: &[StateEntry]) -> Result<Option<PathBuf>>;

    fn history_location(&self) -> Option<PathBuf> {
        None
    }
}

/// Writes the three exports as files in one directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    session_id: String,
    planning_note_limit: usize,
}

impl FileSink {
    pub fn new(dir: &Path, session_id: &str, planning_note_limit: usize) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            session_id: session_id.to_string(),
            planning_note_limit,
        })
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(format!("game_history_{}.json", self.session_id))
    }

    pub fn planning_log_path(&self) -> PathBuf {
        self.dir.join(format!("planning_log_{}.json", self.session_id))
    }

    pub fn performance_path(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!(
            "performance_{}_{}.csv",
            self.session_id,
            at.format("%Y%m%d_%H%M%S")
        ))
    }
}

impl HistorySink for FileSink {
    fn write_history(&mut self, history: &[StateEntry]) -> Result<()> {
        let path = self.history_path();
        debug!(path = %path.display(), entries = history.len(), "rewriting history");
        write_atomic(&path, &render_json(history)?)
    }

    fn write_planning_log(&mut self, planning: &[PlanningEntry]) -> Result<Option<PathBuf>> {
        let path = self.planning_log_path();
        debug!(path = %path.display(), entries = planning.len(), "writing planning log");
        write_atomic(&path, &render_json(planning)?)?;
        Ok(Some(path))
    }

    fn write_performance(&mut self, history: &[StateEntry]) -> Result<Option<PathBuf>> {
        let path = self.performance_path(Utc::now());
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let rows = write_performance_csv(file, history, self.planning_note_limit)
            .with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), rows, "wrote performance table");
        Ok(Some(path))
    }

    fn history_location(&self) -> Option<PathBuf> {
        Some(self.history_path())
    }
}

/// Serialize to pretty-printed JSON with trailing newline.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    Ok(payload)
}

/// Read a history export back.
pub fn load_history(path: &Path) -> Result<Vec<StateEntry>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read history {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse history {}", path.display()))
}

/// Write one CSV row per action entry; returns the number of rows written.
pub fn write_performance_csv<W: std::io::Write>(
    out: W,
    history: &[StateEntry],
    planning_note_limit: usize,
) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(PERFORMANCE_HEADER)
        .context("write csv header")?;
    let mut rows = 0usize;
    for entry in history {
        let Some(action) = entry.action.as_deref() else {
            continue;
        };
        let notes = truncate_chars(entry.planning.as_deref().unwrap_or(""), planning_note_limit);
        writer
            .write_record([
                entry.move_number.to_string().as_str(),
                action,
                entry.score.to_string().as_str(),
                format_timestamp(entry.timestamp).as_str(),
                notes,
            ])
            .context("write csv row")?;
        rows += 1;
    }
    writer.flush().context("flush csv")?;
    Ok(rows)
}

/// RFC 3339 with a `Z` suffix, matching how timestamps appear in the JSON exports.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::SessionState;

    fn sample_state() -> SessionState {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_000).expect("timestamp");
        let mut state = SessionState::new();
        state.record_observation("West of House Score: 0".to_string(), at);
        state.record_action("open mailbox", Some("plan A\nACTION: open mailbox"), at);
        state.record_observation("Opening the mailbox reveals a leaflet. Score: 5".to_string(), at);
        state.record_action("read leaflet", None, at);
        state.record_plan("West of House", "ACTION: open mailbox", at);
        state
    }

    #[test]
    fn history_rewrite_is_a_stable_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = FileSink::new(temp.path(), "abcd1234", 1_000).expect("sink");
        let state = sample_state();

        sink.write_history(&state.history()[..2]).expect("first write");
        sink.write_history(state.history()).expect("second write");

        let path = sink.history_path();
        let on_disk = fs::read_to_string(&path).expect("read");
        let loaded = load_history(&path).expect("load");
        assert_eq!(loaded, state.history());
        assert_eq!(render_json(&loaded).expect("render"), on_disk);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn history_entries_keep_their_shape() {
        let state = sample_state();
        let json = render_json(state.history()).expect("render");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");

        let keys = |idx: usize| -> Vec<String> {
            let mut keys: Vec<String> = value[idx]
                .as_object()
                .expect("object")
                .keys()
                .cloned()
                .collect();
            keys.sort();
            keys
        };
        assert_eq!(keys(0), vec!["game_state", "move_number", "score", "timestamp"]);
        assert_eq!(
            keys(1),
            vec!["action", "move_number", "planning", "score", "timestamp"]
        );
        assert!(value[3].get("planning").is_none());

        // Field order in the document follows the record layout.
        let first = &json[..json.find('}').expect("first object")];
        let move_at = first.find("\"move_number\"").expect("move_number");
        let state_at = first.find("\"game_state\"").expect("game_state");
        assert!(move_at < state_at);
    }

    #[test]
    fn performance_table_has_one_row_per_action() {
        let state = sample_state();
        let mut buf = Vec::new();
        let rows = write_performance_csv(&mut buf, state.history(), 1_000).expect("csv");
        assert_eq!(rows, 2);

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let header = reader.headers().expect("headers").clone();
        assert_eq!(
            header.iter().collect::<Vec<_>>(),
            PERFORMANCE_HEADER.to_vec()
        );
        let records: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "1");
        assert_eq!(&records[0][1], "open mailbox");
        assert_eq!(&records[0][4], "plan A\nACTION: open mailbox");
        assert_eq!(&records[1][2], "5");
        assert_eq!(&records[1][4], "");
    }

    #[test]
    fn performance_timestamps_match_history_json() {
        let state = sample_state();
        let mut buf = Vec::new();
        write_performance_csv(&mut buf, state.history(), 1_000).expect("csv");
        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let first = reader.records().next().expect("row").expect("record");

        let json = serde_json::to_value(&state.history()[1]).expect("serialize");
        assert_eq!(json["timestamp"].as_str(), Some(&first[3]));
        assert_eq!(&first[3], "2023-11-14T22:13:20.123456Z");
    }

    #[test]
    fn planning_notes_are_truncated_by_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn file_sink_names_exports_by_session() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = FileSink::new(&temp.path().join("out"), "abcd1234", 4).expect("sink");
        let state = sample_state();

        let planning = sink
            .write_planning_log(state.planning())
            .expect("planning")
            .expect("path");
        assert!(planning.ends_with("planning_log_abcd1234.json"));
        let logged: Vec<PlanningEntry> =
            serde_json::from_str(&fs::read_to_string(&planning).expect("read")).expect("parse");
        assert_eq!(logged, state.planning());

        let performance = sink
            .write_performance(state.history())
            .expect("performance")
            .expect("path");
        let name = performance
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.starts_with("performance_abcd1234_"));
        assert!(name.ends_with(".csv"));
        let contents = fs::read_to_string(&performance).expect("read csv");
        assert!(contents.contains("plan"));
        assert!(!contents.contains("plan A"));
    }
}
