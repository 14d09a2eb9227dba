//! SQLite event store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Error, Event, EventKind, Result, RunId};

/// SQLite-backed event store.
///
/// The connection sits behind a mutex so one store can be shared by
/// concurrent runs; each call holds the lock only for its own statement.
pub struct EventStore {
    conn: Mutex<Connection>,
}

/// Overview of one run, as listed by [`EventStore::list_runs`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub id: RunId,
    pub prompt: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tool_calls: usize,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_run
                ON events(run_id, timestamp);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn().execute(
            "INSERT INTO events (id, run_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.run_id.to_string(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load the events of one run in insertion order, optionally only those
    /// of one kind (`message`, `tool_call`, ...).
    pub fn load_run(&self, run_id: RunId, kind: Option<&str>) -> Result<Vec<Event>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, run_id, timestamp, data FROM events
             WHERE run_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![run_id.to_string(), kind], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, run, timestamp, data) = row?;
            events.push(Event {
                id: id.parse().map_err(|_| Error::Corrupt(format!("event id {id:?}")))?,
                run_id: parse_run_id(&run)?,
                timestamp: parse_time(&timestamp)?,
                kind: serde_json::from_str(&data)?,
            });
        }
        Ok(events)
    }

    /// Every run in the store, most recent first.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT run_id,
                    MIN(timestamp),
                    MAX(CASE WHEN kind = 'run_end' THEN timestamp END),
                    SUM(CASE WHEN kind = 'tool_call' THEN 1 ELSE 0 END),
                    MAX(CASE WHEN kind = 'run_start' THEN data END)
             FROM events
             GROUP BY run_id
             ORDER BY MIN(timestamp) DESC",
        )?;
        let rows = stmt.query_map([], summary_columns)?;

        let mut runs = Vec::new();
        for row in rows {
            let (id, started, ended, tool_calls, start) = row?;
            let prompt = match start.map(|data| serde_json::from_str::<EventKind>(&data)).transpose()? {
                Some(EventKind::RunStart { prompt }) => prompt,
                _ => String::new(),
            };
            runs.push(RunSummary {
                id: parse_run_id(&id)?,
                prompt,
                started_at: parse_time(&started)?,
                ended_at: ended.as_deref().map(parse_time).transpose()?,
                tool_calls: usize::try_from(tool_calls).unwrap_or_default(),
            });
        }
        Ok(runs)
    }

    /// Whether any event was recorded for `run_id`.
    pub fn contains(&self, run_id: RunId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM events WHERE run_id = ?1 LIMIT 1",
                [run_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

type SummaryRow = (String, String, Option<String>, i64, Option<String>);

fn summary_columns(row: &Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn parse_run_id(raw: &str) -> Result<RunId> {
    raw.parse()
        .map_err(|_| Error::Corrupt(format!("run id {raw:?}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::Corrupt(format!("timestamp {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn at(run_id: RunId, offset_secs: i64, kind: EventKind) -> Event {
        let mut event = Event::new(run_id, kind);
        event.timestamp = DateTime::from_timestamp(1_700_000_000 + offset_secs, 0).unwrap();
        event
    }

    fn record_run(store: &EventStore, run: RunId, start: i64, prompt: &str, finished: bool) {
        store
            .append(&at(run, start, EventKind::RunStart { prompt: prompt.into() }))
            .unwrap();
        store
            .append(&at(
                run,
                start + 1,
                EventKind::ToolCall {
                    name: "bin_packing".into(),
                    arguments: r#"{"items":[5,5],"bin_capacity":10}"#.into(),
                },
            ))
            .unwrap();
        store
            .append(&at(
                run,
                start + 2,
                EventKind::ToolResult {
                    name: "bin_packing".into(),
                    record: serde_json::json!({"result": {"num_bins": 1}}),
                },
            ))
            .unwrap();
        if finished {
            store
                .append(&at(run, start + 3, EventKind::RunEnd { turns: 2 }))
                .unwrap();
        }
    }

    #[test]
    fn append_and_load_in_order() {
        let store = EventStore::in_memory().unwrap();
        let run = RunId::new();
        store.append(&Event::message(run, Role::User, "pack my boxes")).unwrap();
        store.append(&Event::message(run, Role::Assistant, "done")).unwrap();
        store.append(&Event::new(run, EventKind::RunEnd { turns: 1 })).unwrap();

        let events = store.load_run(run, None).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0].kind,
            EventKind::Message { role: Role::User, content } if content == "pack my boxes"
        ));
        assert_eq!(events[2].kind, EventKind::RunEnd { turns: 1 });
        assert!(events.iter().all(|e| e.run_id == run));
    }

    #[test]
    fn load_filters_by_kind() {
        let store = EventStore::in_memory().unwrap();
        let run = RunId::new();
        record_run(&store, run, 0, "prompt", true);

        let calls = store.load_run(run, Some("tool_call")).unwrap();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0].kind, EventKind::ToolCall { name, .. } if name == "bin_packing"));
        assert!(store.load_run(run, Some("message")).unwrap().is_empty());
        assert!(store.load_run(RunId::new(), None).unwrap().is_empty());
    }

    #[test]
    fn list_runs_newest_first() {
        let store = EventStore::in_memory().unwrap();
        let older = RunId::new();
        let newer = RunId::new();
        record_run(&store, older, 0, "first", true);
        record_run(&store, newer, 100, "second", false);

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, newer);
        assert_eq!(runs[0].prompt, "second");
        assert_eq!(runs[0].ended_at, None);
        assert_eq!(runs[1].id, older);
        assert_eq!(runs[1].tool_calls, 1);
        assert!(runs[1].ended_at.unwrap() > runs[1].started_at);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let run = RunId::new();
        {
            let store = EventStore::open(&path).unwrap();
            record_run(&store, run, 0, "persisted", true);
        }
        let store = EventStore::open(&path).unwrap();
        assert!(store.contains(run).unwrap());
        assert!(!store.contains(RunId::new()).unwrap());
        assert_eq!(store.load_run(run, None).unwrap().len(), 4);
    }
}
