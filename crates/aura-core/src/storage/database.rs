//! SQLite-backed context persistence.
//!
//! Provides persistent storage for:
//! - The current context snapshot (single kv slot, compare-and-swap)
//! - The append-only context history log with retention pruning
//! - User-declared saved locations
//! - Key-value store for engine flags and operating mode
//!
//! The current-snapshot slot is guarded by the snapshot sequence
//! number: a commit whose sequence is not exactly one past the stored
//! one loses the race and is rejected, which is what makes concurrent
//! trigger callbacks safe without any in-process locking.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations, HistoryConfig, PrivacyMode};
use crate::context::ContextSnapshot;
use crate::error::{DatabaseError, Result, ValidationError};
use crate::health::{Mode, ReconcileSummary};
use crate::places::{PlaceKind, SavedLocation};

/// kv key for the current snapshot slot.
pub const KEY_CURRENT_SNAPSHOT: &str = "current_context_snapshot";
/// kv key for the operating mode.
pub const KEY_BACKGROUND_MODE: &str = "background_mode";
/// kv key for the manual sleep override flag.
pub const KEY_SLEEP_OVERRIDE: &str = "sleep_override_flag";
/// kv key for the sleep ghost-mode flag.
pub const KEY_SLEEP_GHOST_MODE: &str = "sleep_ghost_mode_flag";
/// kv key for the runtime privacy mode override.
pub const KEY_PRIVACY_MODE: &str = "context_privacy_mode";
/// kv key for the last reconcile summary.
pub const KEY_LAST_RECONCILE: &str = "last_reconcile_result";

// Entries below this confidence count as low-trust in summaries.
const LOW_CONFIDENCE: f64 = 0.3;

/// One row of the history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub snapshot: ContextSnapshot,
    pub recorded_at: DateTime<Utc>,
}

/// Share of one state or label within a summarized window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupShare {
    pub name: String,
    pub count: u64,
    pub share: f64,
}

/// Aggregate view over a history window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub since: DateTime<Utc>,
    pub total: u64,
    pub avg_confidence: f64,
    /// Entries with confidence below 0.3.
    pub low_confidence: u64,
    pub by_state: Vec<GroupShare>,
    /// Distribution over resolved place labels.
    pub by_label: Vec<GroupShare>,
}

/// Selects which data domains a reset wipes.
#[derive(Debug, Clone, Copy)]
pub struct DataResetOptions {
    /// Drop every history row.
    pub history: bool,
    /// Drop every saved place.
    pub places: bool,
    /// Clear the kv table: current slot, mode, sleep flags, privacy
    /// override and reconcile record all revert to their defaults.
    pub engine_state: bool,
}

impl DataResetOptions {
    pub fn everything() -> Self {
        Self {
            history: true,
            places: true,
            engine_state: true,
        }
    }
}

/// Row counts present before a reset deleted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResetSummary {
    pub deleted_history: usize,
    pub deleted_places: usize,
    pub cleared_engine_state: bool,
}

/// SQLite database for context storage.
pub struct ContextStore {
    conn: Connection,
}

impl ContextStore {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/aura/aura.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("aura.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    ///
    /// The store is shared between the app process and the CLI, so the
    /// connection runs in WAL mode with a busy timeout.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| DatabaseError::OpenFailed {
            path: PathBuf::from(path),
            source: e,
        })?;
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            log::warn!("failed to enable WAL mode: {e}");
        }
        if let Err(e) = conn.pragma_update(None, "busy_timeout", 5000) {
            log::warn!("failed to set busy timeout: {e}");
        }
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (tests and ephemeral sessions).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    pub fn schema_version(&self) -> i32 {
        migrations::get_schema_version(&self.conn)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        kv_get_on(&self.conn, key)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// The current context snapshot, if any evaluation has committed.
    pub fn current_snapshot(&self) -> Result<Option<ContextSnapshot>> {
        match self.kv_get(KEY_CURRENT_SNAPSHOT)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Commit an evaluation result: compare-and-swap the current slot,
    /// append to history and prune, all in one transaction.
    ///
    /// The candidate's sequence must be exactly one past the stored
    /// slot's sequence (or 1 for an empty slot); anything else means a
    /// concurrent evaluation won the race and this result is rejected
    /// with [`DatabaseError::StaleWrite`].
    ///
    /// Returns the snapshot as persisted, which under
    /// [`PrivacyMode::Minimal`] has coordinates stripped.
    pub fn commit_snapshot(
        &self,
        snapshot: &ContextSnapshot,
        privacy: PrivacyMode,
        retention: &HistoryConfig,
    ) -> Result<ContextSnapshot> {
        let stored = match privacy {
            PrivacyMode::Full => snapshot.clone(),
            PrivacyMode::Minimal => snapshot.redacted(),
        };

        let tx = self.conn.unchecked_transaction()?;
        let json = cas_slot(&tx, &stored)?;
        tx.execute(
            "INSERT INTO context_history (state, source, confidence, recorded_at, snapshot, label, sequence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stored.state.name(),
                stored.source.name(),
                stored.effective_confidence(),
                stored.updated_at.to_rfc3339(),
                json,
                stored.location_label.display(),
                stored.sequence,
            ],
        )?;

        prune_on(&tx, retention, stored.updated_at)?;

        tx.commit()?;
        Ok(stored)
    }

    /// Compare-and-swap the current-snapshot slot without appending to
    /// history. Used while sleep ghost mode is on: the live slot stays
    /// fresh but the night leaves no history trail.
    pub fn commit_snapshot_slot_only(
        &self,
        snapshot: &ContextSnapshot,
        privacy: PrivacyMode,
    ) -> Result<ContextSnapshot> {
        let stored = match privacy {
            PrivacyMode::Full => snapshot.clone(),
            PrivacyMode::Minimal => snapshot.redacted(),
        };

        let tx = self.conn.unchecked_transaction()?;
        cas_slot(&tx, &stored)?;
        tx.commit()?;
        Ok(stored)
    }

    /// Most recent history entries, newest first.
    pub fn history_recent(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, snapshot, recorded_at FROM context_history
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, json, recorded_at) = row?;
            entries.push(HistoryEntry {
                id,
                snapshot: serde_json::from_str(&json)?,
                recorded_at: parse_rfc3339(&recorded_at)?,
            });
        }
        Ok(entries)
    }

    pub fn history_count(&self) -> Result<u64> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM context_history", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Oldest retained history timestamp, if the log is non-empty.
    pub fn history_oldest(&self) -> Result<Option<DateTime<Utc>>> {
        let result = self.conn.query_row(
            "SELECT recorded_at FROM context_history ORDER BY id ASC LIMIT 1",
            [],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(s) => Ok(Some(parse_rfc3339(&s)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply the retention policy outside of a commit.
    ///
    /// Returns the number of rows dropped.
    pub fn prune_history(&self, retention: &HistoryConfig, now: DateTime<Utc>) -> Result<usize> {
        prune_on(&self.conn, retention, now)
    }

    /// Aggregate the history window starting at `since`.
    pub fn summarize_history(&self, since: DateTime<Utc>) -> Result<HistorySummary> {
        let cutoff = since.to_rfc3339();
        let (total, avg_confidence, low_confidence): (u64, f64, u64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(AVG(confidence), 0.0),
                    COALESCE(SUM(confidence < ?2), 0)
             FROM context_history WHERE recorded_at >= ?1",
            params![cutoff, LOW_CONFIDENCE],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let by_state = group_shares(
            &self.conn,
            "SELECT state, COUNT(*) FROM context_history
             WHERE recorded_at >= ?1
             GROUP BY state ORDER BY COUNT(*) DESC, state ASC",
            &cutoff,
            total,
        )?;
        let by_label = group_shares(
            &self.conn,
            "SELECT label, COUNT(*) FROM context_history
             WHERE recorded_at >= ?1
             GROUP BY label ORDER BY COUNT(*) DESC, label ASC",
            &cutoff,
            total,
        )?;

        Ok(HistorySummary {
            since,
            total,
            avg_confidence,
            low_confidence,
            by_state,
            by_label,
        })
    }

    /// Register a saved place.
    ///
    /// `Home`, `Work` and `Gym` are singletons; `Other` places must
    /// carry a display name unique among them.
    pub fn add_place(&self, place: &SavedLocation) -> Result<i64> {
        let duplicate = match place.kind {
            PlaceKind::Other => {
                let name = place.display_name.as_deref().ok_or_else(|| {
                    ValidationError::InvalidValue {
                        field: "display_name".into(),
                        message: "required for custom places".into(),
                    }
                })?;
                let count: u64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM saved_locations WHERE kind = 'other' AND display_name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                count > 0
            }
            kind => {
                let count: u64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM saved_locations WHERE kind = ?1",
                    params![kind.name()],
                    |row| row.get(0),
                )?;
                count > 0
            }
        };
        if duplicate {
            return Err(ValidationError::DuplicateLabel(place.display()).into());
        }

        self.conn.execute(
            "INSERT INTO saved_locations (kind, display_name, latitude, longitude, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                place.kind.name(),
                place.display_name,
                place.latitude,
                place.longitude,
                place.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All saved places in registration order.
    ///
    /// The order matters: equidistant place resolution keeps the
    /// earliest registered entry, so callers must not re-sort.
    pub fn places(&self) -> Result<Vec<SavedLocation>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, display_name, latitude, longitude, created_at
             FROM saved_locations ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut places = Vec::new();
        for row in rows {
            let (kind, display_name, latitude, longitude, created_at) = row?;
            let kind = PlaceKind::parse(&kind).ok_or_else(|| {
                DatabaseError::QueryFailed(format!("unknown place kind '{kind}'"))
            })?;
            places.push(SavedLocation {
                kind,
                latitude,
                longitude,
                display_name,
                created_at: parse_rfc3339(&created_at)?,
            });
        }
        Ok(places)
    }

    /// Remove a saved place. For `Other`, `name` selects which one.
    ///
    /// Returns whether a row was deleted.
    pub fn remove_place(&self, kind: PlaceKind, name: Option<&str>) -> Result<bool> {
        let changed = match (kind, name) {
            (PlaceKind::Other, Some(name)) => self.conn.execute(
                "DELETE FROM saved_locations WHERE kind = 'other' AND display_name = ?1",
                params![name],
            )?,
            (PlaceKind::Other, None) => {
                return Err(ValidationError::InvalidValue {
                    field: "display_name".into(),
                    message: "required to remove a custom place".into(),
                }
                .into())
            }
            (kind, _) => self.conn.execute(
                "DELETE FROM saved_locations WHERE kind = ?1",
                params![kind.name()],
            )?,
        };
        Ok(changed > 0)
    }

    /// Operating mode; defaults to `Full` until explicitly set.
    pub fn background_mode(&self) -> Result<Mode> {
        match self.kv_get(KEY_BACKGROUND_MODE)? {
            Some(s) => Ok(Mode::parse(&s).unwrap_or_else(|| {
                log::warn!("unrecognized background_mode '{s}', falling back to full");
                Mode::Full
            })),
            None => Ok(Mode::Full),
        }
    }

    pub fn set_background_mode(&self, mode: Mode) -> Result<()> {
        self.kv_set(KEY_BACKGROUND_MODE, mode.as_str())
    }

    pub fn sleep_override(&self) -> Result<bool> {
        self.kv_flag(KEY_SLEEP_OVERRIDE)
    }

    pub fn set_sleep_override(&self, on: bool) -> Result<()> {
        self.kv_set(KEY_SLEEP_OVERRIDE, if on { "true" } else { "false" })
    }

    pub fn sleep_ghost_mode(&self) -> Result<bool> {
        self.kv_flag(KEY_SLEEP_GHOST_MODE)
    }

    pub fn set_sleep_ghost_mode(&self, on: bool) -> Result<()> {
        self.kv_set(KEY_SLEEP_GHOST_MODE, if on { "true" } else { "false" })
    }

    /// Runtime privacy mode; `default` applies when never set.
    pub fn privacy_mode(&self, default: PrivacyMode) -> Result<PrivacyMode> {
        match self.kv_get(KEY_PRIVACY_MODE)? {
            Some(s) => Ok(PrivacyMode::parse(&s).unwrap_or_else(|| {
                log::warn!("unrecognized privacy mode '{s}', falling back to {}", default.as_str());
                default
            })),
            None => Ok(default),
        }
    }

    pub fn set_privacy_mode(&self, mode: PrivacyMode) -> Result<()> {
        self.kv_set(KEY_PRIVACY_MODE, mode.as_str())
    }

    pub fn last_reconcile(&self) -> Result<Option<ReconcileSummary>> {
        match self.kv_get(KEY_LAST_RECONCILE)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn set_last_reconcile(&self, summary: &ReconcileSummary) -> Result<()> {
        self.kv_set(KEY_LAST_RECONCILE, &serde_json::to_string(summary)?)
    }

    /// Reset selected data domains in a single transaction.
    ///
    /// Intended for destructive "factory reset" style actions. Returns
    /// how many rows each selected domain held before deletion.
    pub fn reset_selected_data(&self, options: DataResetOptions) -> Result<DataResetSummary> {
        let deleted_history = if options.history {
            self.history_count()? as usize
        } else {
            0
        };
        let deleted_places = if options.places {
            self.places()?.len()
        } else {
            0
        };

        let tx = self.conn.unchecked_transaction()?;
        if options.history {
            tx.execute("DELETE FROM context_history", [])?;
        }
        if options.places {
            tx.execute("DELETE FROM saved_locations", [])?;
        }
        if options.engine_state {
            tx.execute("DELETE FROM kv", [])?;
        }
        tx.commit()?;

        Ok(DataResetSummary {
            deleted_history,
            deleted_places,
            cleared_engine_state: options.engine_state,
        })
    }

    fn kv_flag(&self, key: &str) -> Result<bool> {
        Ok(matches!(self.kv_get(key)?.as_deref(), Some("true")))
    }
}

fn group_shares(
    conn: &Connection,
    sql: &str,
    cutoff: &str,
    total: u64,
) -> Result<Vec<GroupShare>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![cutoff], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
    })?;
    let mut shares = Vec::new();
    for row in rows {
        let (name, count) = row?;
        let share = if total > 0 {
            count as f64 / total as f64
        } else {
            0.0
        };
        shares.push(GroupShare { name, count, share });
    }
    Ok(shares)
}

fn kv_get_on(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `stored` into the current-snapshot slot if and only if its
/// sequence is exactly one past the slot's. Returns the serialized
/// snapshot for reuse by the history insert.
fn cas_slot(conn: &Connection, stored: &ContextSnapshot) -> Result<String> {
    let slot_sequence = match kv_get_on(conn, KEY_CURRENT_SNAPSHOT)? {
        Some(json) => {
            let current: ContextSnapshot = serde_json::from_str(&json)?;
            current.sequence
        }
        None => 0,
    };
    if stored.sequence != slot_sequence + 1 {
        return Err(DatabaseError::StaleWrite {
            slot: slot_sequence,
            candidate: stored.sequence,
        }
        .into());
    }

    let json = serde_json::to_string(stored)?;
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![KEY_CURRENT_SNAPSHOT, json],
    )?;
    Ok(json)
}

/// Enforce the retention policy: drop rows past the age limit, then
/// rows beyond the entry cap (oldest first).
fn prune_on(conn: &Connection, retention: &HistoryConfig, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = (now - Duration::days(i64::from(retention.max_age_days.max(1)))).to_rfc3339();
    let by_age = conn.execute(
        "DELETE FROM context_history WHERE recorded_at < ?1",
        params![cutoff],
    )?;
    let by_count = conn.execute(
        "DELETE FROM context_history WHERE id NOT IN (
            SELECT id FROM context_history ORDER BY id DESC LIMIT ?1
        )",
        params![retention.effective_max_entries()],
    )?;
    Ok(by_age + by_count)
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp '{s}': {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextState, EvaluationSource, LocationLabel};
    use crate::error::CoreError;

    fn snapshot(sequence: u64, at: DateTime<Utc>) -> ContextSnapshot {
        let mut snap = ContextSnapshot::initial(at);
        snap.state = ContextState::Working;
        snap.source = EvaluationSource::PeriodicFetch;
        snap.location_label = LocationLabel::Work;
        snap.confidence = 0.8;
        snap.sequence = sequence;
        snap.latitude = Some(35.6586);
        snap.longitude = Some(139.7454);
        snap.accuracy_m = Some(10.0);
        snap
    }

    #[test]
    fn kv_store() {
        let store = ContextStore::open_memory().unwrap();
        assert!(store.kv_get("test").unwrap().is_none());
        store.kv_set("test", "hello").unwrap();
        assert_eq!(store.kv_get("test").unwrap().unwrap(), "hello");
    }

    #[test]
    fn slot_only_commit_advances_slot_without_history() {
        let store = ContextStore::open_memory().unwrap();
        let retention = HistoryConfig::default();
        let now = Utc::now();

        store
            .commit_snapshot(&snapshot(1, now), PrivacyMode::Full, &retention)
            .unwrap();
        assert_eq!(store.history_count().unwrap(), 1);

        store
            .commit_snapshot_slot_only(&snapshot(2, now), PrivacyMode::Full)
            .unwrap();
        assert_eq!(store.history_count().unwrap(), 1);
        assert_eq!(store.current_snapshot().unwrap().unwrap().sequence, 2);

        // The slot-only path still rejects stale sequences.
        let err = store
            .commit_snapshot_slot_only(&snapshot(2, now), PrivacyMode::Full)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Database(DatabaseError::StaleWrite { slot: 2, candidate: 2 })
        ));
    }

    #[test]
    fn reset_clears_only_selected_domains() {
        let store = ContextStore::open_memory().unwrap();
        let retention = HistoryConfig::default();
        let now = Utc::now();
        store
            .commit_snapshot(&snapshot(1, now), PrivacyMode::Full, &retention)
            .unwrap();
        store
            .commit_snapshot(&snapshot(2, now), PrivacyMode::Full, &retention)
            .unwrap();
        let place = SavedLocation::new(PlaceKind::Home, 52.52, 13.405).unwrap();
        store.add_place(&place).unwrap();

        let summary = store
            .reset_selected_data(DataResetOptions {
                history: true,
                places: false,
                engine_state: false,
            })
            .unwrap();
        assert_eq!(summary.deleted_history, 2);
        assert_eq!(summary.deleted_places, 0);
        assert!(!summary.cleared_engine_state);
        assert_eq!(store.history_count().unwrap(), 0);
        assert_eq!(store.places().unwrap().len(), 1);
        // The slot survives a history-only reset.
        assert_eq!(store.current_snapshot().unwrap().unwrap().sequence, 2);

        let summary = store.reset_selected_data(DataResetOptions::everything()).unwrap();
        assert_eq!(summary.deleted_places, 1);
        assert!(summary.cleared_engine_state);
        assert!(store.places().unwrap().is_empty());
        assert!(store.current_snapshot().unwrap().is_none());
        assert_eq!(store.background_mode().unwrap(), Mode::Full);
    }

    #[test]
    fn commit_and_read_current() {
        let store = ContextStore::open_memory().unwrap();
        assert!(store.current_snapshot().unwrap().is_none());

        let snap = snapshot(1, Utc::now());
        store
            .commit_snapshot(&snap, PrivacyMode::Full, &HistoryConfig::default())
            .unwrap();

        let current = store.current_snapshot().unwrap().unwrap();
        assert_eq!(current.sequence, 1);
        assert_eq!(current.state, ContextState::Working);
        assert_eq!(current.latitude, Some(35.6586));
        assert_eq!(store.history_count().unwrap(), 1);
    }

    #[test]
    fn stale_sequence_is_rejected() {
        let store = ContextStore::open_memory().unwrap();
        let retention = HistoryConfig::default();
        let now = Utc::now();
        store
            .commit_snapshot(&snapshot(1, now), PrivacyMode::Full, &retention)
            .unwrap();
        store
            .commit_snapshot(&snapshot(2, now), PrivacyMode::Full, &retention)
            .unwrap();

        // A second writer that also built on sequence 1 must lose.
        let err = store
            .commit_snapshot(&snapshot(2, now), PrivacyMode::Full, &retention)
            .unwrap_err();
        match err {
            CoreError::Database(DatabaseError::StaleWrite { slot, candidate }) => {
                assert_eq!(slot, 2);
                assert_eq!(candidate, 2);
            }
            other => panic!("expected StaleWrite, got {other}"),
        }

        // The slot still holds the winner and history has no extra row.
        assert_eq!(store.current_snapshot().unwrap().unwrap().sequence, 2);
        assert_eq!(store.history_count().unwrap(), 2);
    }

    #[test]
    fn empty_slot_only_accepts_sequence_one() {
        let store = ContextStore::open_memory().unwrap();
        let err = store
            .commit_snapshot(
                &snapshot(5, Utc::now()),
                PrivacyMode::Full,
                &HistoryConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Database(DatabaseError::StaleWrite { slot: 0, candidate: 5 })
        ));
    }

    #[test]
    fn minimal_privacy_strips_coordinates_everywhere() {
        let store = ContextStore::open_memory().unwrap();
        let written = store
            .commit_snapshot(
                &snapshot(1, Utc::now()),
                PrivacyMode::Minimal,
                &HistoryConfig::default(),
            )
            .unwrap();
        assert!(written.latitude.is_none());

        let current = store.current_snapshot().unwrap().unwrap();
        assert!(current.latitude.is_none() && current.accuracy_m.is_none());
        // The label survives redaction.
        assert_eq!(current.location_label, LocationLabel::Work);

        let history = store.history_recent(1).unwrap();
        assert!(history[0].snapshot.latitude.is_none());
    }

    #[test]
    fn history_is_pruned_by_entry_cap() {
        let store = ContextStore::open_memory().unwrap();
        let retention = HistoryConfig {
            max_age_days: 14,
            max_entries: Some(5),
        };
        let now = Utc::now();
        for seq in 1..=10 {
            store
                .commit_snapshot(&snapshot(seq, now), PrivacyMode::Full, &retention)
                .unwrap();
        }
        assert_eq!(store.history_count().unwrap(), 5);
        // Newest entries survive.
        let recent = store.history_recent(10).unwrap();
        assert_eq!(recent[0].snapshot.sequence, 10);
        assert_eq!(recent.last().unwrap().snapshot.sequence, 6);
    }

    #[test]
    fn history_is_pruned_by_age() {
        let store = ContextStore::open_memory().unwrap();
        let retention = HistoryConfig {
            max_age_days: 7,
            max_entries: None,
        };
        let now = Utc::now();
        let old = now - Duration::days(30);
        store
            .commit_snapshot(&snapshot(1, old), PrivacyMode::Full, &retention)
            .unwrap();
        // Committing a fresh snapshot prunes the 30-day-old row.
        store
            .commit_snapshot(&snapshot(2, now), PrivacyMode::Full, &retention)
            .unwrap();
        assert_eq!(store.history_count().unwrap(), 1);
        let oldest = store.history_oldest().unwrap().unwrap();
        assert!(oldest > now - Duration::days(7));
    }

    #[test]
    fn summarize_groups_by_state_and_label() {
        let store = ContextStore::open_memory().unwrap();
        let retention = HistoryConfig::default();
        let now = Utc::now();
        for seq in 1..=3 {
            store
                .commit_snapshot(&snapshot(seq, now), PrivacyMode::Full, &retention)
                .unwrap();
        }
        let mut resting = snapshot(4, now);
        resting.state = ContextState::Resting;
        resting.location_label = LocationLabel::Home;
        resting.confidence = 0.1;
        store
            .commit_snapshot(&resting, PrivacyMode::Full, &retention)
            .unwrap();

        let summary = store.summarize_history(now - Duration::hours(1)).unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.by_state[0].name, "working");
        assert_eq!(summary.by_state[0].count, 3);
        assert!((summary.by_state[0].share - 0.75).abs() < 1e-9);
        assert_eq!(summary.by_label[0].name, "work");
        assert_eq!(summary.by_label[0].count, 3);
        assert_eq!(summary.by_label[1].name, "home");
        assert_eq!(summary.low_confidence, 1);
    }

    #[test]
    fn place_singletons_are_enforced() {
        let store = ContextStore::open_memory().unwrap();
        let home = SavedLocation::new(PlaceKind::Home, 52.52, 13.405).unwrap();
        store.add_place(&home).unwrap();

        let second = SavedLocation::new(PlaceKind::Home, 48.85, 2.35).unwrap();
        let err = store.add_place(&second).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn other_places_are_unique_by_name() {
        let store = ContextStore::open_memory().unwrap();
        let cafe = SavedLocation::new(PlaceKind::Other, 52.0, 13.0)
            .unwrap()
            .with_display_name("cafe");
        store.add_place(&cafe).unwrap();

        let dup = SavedLocation::new(PlaceKind::Other, 52.1, 13.1)
            .unwrap()
            .with_display_name("cafe");
        assert!(store.add_place(&dup).is_err());

        let studio = SavedLocation::new(PlaceKind::Other, 52.2, 13.2)
            .unwrap()
            .with_display_name("studio");
        store.add_place(&studio).unwrap();
        assert_eq!(store.places().unwrap().len(), 2);
    }

    #[test]
    fn unnamed_other_place_is_rejected() {
        let store = ContextStore::open_memory().unwrap();
        let anonymous = SavedLocation::new(PlaceKind::Other, 52.0, 13.0).unwrap();
        assert!(store.add_place(&anonymous).is_err());
    }

    #[test]
    fn places_come_back_in_registration_order() {
        let store = ContextStore::open_memory().unwrap();
        let work = SavedLocation::new(PlaceKind::Work, 52.52, 13.405).unwrap();
        let home = SavedLocation::new(PlaceKind::Home, 48.85, 2.35).unwrap();
        store.add_place(&work).unwrap();
        store.add_place(&home).unwrap();

        let places = store.places().unwrap();
        assert_eq!(places[0].kind, PlaceKind::Work);
        assert_eq!(places[1].kind, PlaceKind::Home);
    }

    #[test]
    fn remove_place_by_kind_and_name() {
        let store = ContextStore::open_memory().unwrap();
        let gym = SavedLocation::new(PlaceKind::Gym, 52.5, 13.4).unwrap();
        store.add_place(&gym).unwrap();
        assert!(store.remove_place(PlaceKind::Gym, None).unwrap());
        assert!(!store.remove_place(PlaceKind::Gym, None).unwrap());

        let cafe = SavedLocation::new(PlaceKind::Other, 52.0, 13.0)
            .unwrap()
            .with_display_name("cafe");
        store.add_place(&cafe).unwrap();
        assert!(store.remove_place(PlaceKind::Other, None).is_err());
        assert!(store.remove_place(PlaceKind::Other, Some("cafe")).unwrap());
    }

    #[test]
    fn typed_flags_roundtrip() {
        let store = ContextStore::open_memory().unwrap();
        assert_eq!(store.background_mode().unwrap(), Mode::Full);
        store.set_background_mode(Mode::Light).unwrap();
        assert_eq!(store.background_mode().unwrap(), Mode::Light);

        assert!(!store.sleep_override().unwrap());
        store.set_sleep_override(true).unwrap();
        assert!(store.sleep_override().unwrap());

        assert_eq!(
            store.privacy_mode(PrivacyMode::Full).unwrap(),
            PrivacyMode::Full
        );
        store.set_privacy_mode(PrivacyMode::Minimal).unwrap();
        assert_eq!(
            store.privacy_mode(PrivacyMode::Full).unwrap(),
            PrivacyMode::Minimal
        );
    }
}
