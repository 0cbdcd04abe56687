//! SQLite implementation of [`CacheStore`]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, Row};

use super::{CacheStore, StoreError, StoreResult};
use crate::models::{Contest, Phase, Problem, RatingChange};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS contest (
        id           INTEGER NOT NULL,
        name         TEXT,
        start_time   INTEGER,
        duration     INTEGER,
        type         TEXT,
        phase        TEXT,
        prepared_by  TEXT,
        PRIMARY KEY (id)
    );

    CREATE TABLE IF NOT EXISTS problem (
        contest_id       INTEGER,
        problemset_name  TEXT,
        [index]          TEXT,
        name             TEXT NOT NULL,
        type             TEXT,
        points           REAL,
        rating           INTEGER,
        tags             TEXT,
        PRIMARY KEY (name)
    );

    CREATE TABLE IF NOT EXISTS rating_change (
        contest_id          INTEGER NOT NULL,
        handle              TEXT NOT NULL,
        rank                INTEGER,
        rating_update_time  INTEGER,
        old_rating          INTEGER,
        new_rating          INTEGER,
        UNIQUE (contest_id, handle)
    );

    CREATE INDEX IF NOT EXISTS ix_rating_change_contest_id
        ON rating_change (contest_id);

    CREATE INDEX IF NOT EXISTS ix_rating_change_handle
        ON rating_change (handle);

    -- Same problem appears once per division here, unlike `problem`
    CREATE TABLE IF NOT EXISTS problem2 (
        contest_id       INTEGER,
        problemset_name  TEXT,
        [index]          TEXT,
        name             TEXT NOT NULL,
        type             TEXT,
        points           REAL,
        rating           INTEGER,
        tags             TEXT,
        PRIMARY KEY (contest_id, [index])
    );

    CREATE INDEX IF NOT EXISTS ix_problem2_contest_id
        ON problem2 (contest_id);
"#;

const PROBLEM_COLUMNS: &str =
    "contest_id, problemset_name, [index], name, type, points, rating, tags";

const RATING_CHANGE_SELECT: &str = r#"
    SELECT r.contest_id, c.name, r.handle, r.rank, r.rating_update_time,
           r.old_rating, r.new_rating
    FROM rating_change r
    LEFT JOIN contest c ON r.contest_id = c.id
"#;

/// SQLite-backed cache store
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open or create the database at `path`
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite cache store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> StoreResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert_problems(&self, table: &str, problems: &[Problem]) -> StoreResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {table} ({PROBLEM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for problem in problems {
                let tags = serde_json::to_string(&problem.tags)?;
                written += stmt.execute(params![
                    problem.contest_id,
                    problem.problemset_name,
                    problem.index,
                    problem.name,
                    problem.kind,
                    problem.points,
                    problem.rating,
                    tags,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn select_problems(&self, sql: &str, contest_id: Option<i32>) -> StoreResult<Vec<Problem>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = match contest_id {
            Some(id) => stmt
                .query_map(params![id], problem_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], problem_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        rows.into_iter()
            .map(|(mut problem, tags)| {
                problem.tags = serde_json::from_str(&tags)?;
                Ok(problem)
            })
            .collect()
    }

    fn select_rating_changes(
        &self,
        filter: &str,
        param: Option<&dyn rusqlite::ToSql>,
    ) -> StoreResult<Vec<RatingChange>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{RATING_CHANGE_SELECT} {filter}"))?;
        let changes = match param {
            Some(p) => stmt
                .query_map([p], rating_change_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], rating_change_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(changes)
    }
}

fn problem_from_row(row: &Row<'_>) -> rusqlite::Result<(Problem, String)> {
    let problem = Problem {
        contest_id: row.get(0)?,
        problemset_name: row.get(1)?,
        index: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        name: row.get(3)?,
        kind: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        points: row.get(5)?,
        rating: row.get(6)?,
        tags: Vec::new(),
    };
    let tags: Option<String> = row.get(7)?;
    Ok((problem, tags.unwrap_or_else(|| "[]".to_string())))
}

fn rating_change_from_row(row: &Row<'_>) -> rusqlite::Result<RatingChange> {
    Ok(RatingChange {
        contest_id: row.get(0)?,
        contest_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        handle: row.get(2)?,
        rank: row.get::<_, Option<i32>>(3)?.unwrap_or_default(),
        rating_update_time: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
        old_rating: row.get::<_, Option<i32>>(5)?.unwrap_or_default(),
        new_rating: row.get::<_, Option<i32>>(6)?.unwrap_or_default(),
    })
}

impl CacheStore for SqliteCacheStore {
    fn cache_contests(&self, contests: &[Contest]) -> StoreResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO contest (id, name, start_time, duration, type, phase, prepared_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for contest in contests {
                written += stmt.execute(params![
                    contest.id,
                    contest.name,
                    contest.start_time,
                    contest.duration,
                    contest.kind,
                    contest.phase.as_str(),
                    contest.prepared_by,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn fetch_contests(&self) -> StoreResult<Vec<Contest>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, start_time, duration, type, phase, prepared_by FROM contest",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, start_time, duration, kind, phase, prepared_by)| {
                let phase = phase
                    .unwrap_or_default()
                    .parse::<Phase>()
                    .map_err(StoreError::InvalidData)?;
                Ok(Contest {
                    id,
                    name: name.unwrap_or_default(),
                    start_time,
                    duration,
                    kind: kind.unwrap_or_default(),
                    phase,
                    prepared_by,
                })
            })
            .collect()
    }

    fn cache_problems(&self, problems: &[Problem]) -> StoreResult<usize> {
        self.insert_problems("problem", problems)
    }

    fn fetch_problems(&self) -> StoreResult<Vec<Problem>> {
        self.select_problems(&format!("SELECT {PROBLEM_COLUMNS} FROM problem"), None)
    }

    fn save_rating_changes(&self, changes: &[RatingChange]) -> StoreResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO rating_change
                    (contest_id, handle, rank, rating_update_time, old_rating, new_rating)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for change in changes {
                written += stmt.execute(params![
                    change.contest_id,
                    change.handle,
                    change.rank,
                    change.rating_update_time,
                    change.old_rating,
                    change.new_rating,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn clear_rating_changes(&self, contest_id: Option<i32>) -> StoreResult<()> {
        let conn = self.conn();
        match contest_id {
            Some(id) => conn.execute("DELETE FROM rating_change WHERE contest_id = ?1", params![id])?,
            None => conn.execute("DELETE FROM rating_change", [])?,
        };
        Ok(())
    }

    fn get_users_with_more_than_n_contests(&self, time_cutoff: i64, n: usize) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT handle, COUNT(*) AS num_contests
             FROM rating_change
             GROUP BY handle
             HAVING num_contests >= ?1 AND MAX(rating_update_time) >= ?2",
        )?;
        let handles = stmt
            .query_map(params![n as i64, time_cutoff], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(handles)
    }

    fn get_all_rating_changes(&self) -> StoreResult<Vec<RatingChange>> {
        self.select_rating_changes("ORDER BY r.rating_update_time", None)
    }

    fn get_latest_rating_by_handle(&self) -> StoreResult<HashMap<String, i32>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT handle, new_rating FROM rating_change ORDER BY rating_update_time",
        )?;
        let mut latest = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<i32>>(1)?))
        })?;
        for row in rows {
            let (handle, rating) = row?;
            if let Some(rating) = rating {
                latest.insert(handle, rating);
            }
        }
        Ok(latest)
    }

    fn get_rating_changes_for_contest(&self, contest_id: i32) -> StoreResult<Vec<RatingChange>> {
        self.select_rating_changes("WHERE r.contest_id = ?1", Some(&contest_id))
    }

    fn get_rating_changes_for_handle(&self, handle: &str) -> StoreResult<Vec<RatingChange>> {
        self.select_rating_changes("WHERE r.handle = ?1 ORDER BY r.rating_update_time", Some(&handle))
    }

    fn has_rating_changes_saved(&self, contest_id: i32) -> StoreResult<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM rating_change WHERE contest_id = ?1)",
            params![contest_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn cache_problemset(&self, problems: &[Problem]) -> StoreResult<usize> {
        self.insert_problems("problem2", problems)
    }

    fn fetch_problems2(&self) -> StoreResult<Vec<Problem>> {
        self.select_problems(&format!("SELECT {PROBLEM_COLUMNS} FROM problem2"), None)
    }

    fn clear_problemset(&self, contest_id: Option<i32>) -> StoreResult<()> {
        let conn = self.conn();
        match contest_id {
            Some(id) => conn.execute("DELETE FROM problem2 WHERE contest_id = ?1", params![id])?,
            None => conn.execute("DELETE FROM problem2", [])?,
        };
        Ok(())
    }

    fn fetch_problemset(&self, contest_id: i32) -> StoreResult<Vec<Problem>> {
        self.select_problems(
            &format!("SELECT {PROBLEM_COLUMNS} FROM problem2 WHERE contest_id = ?1"),
            Some(contest_id),
        )
    }

    fn problemset_empty(&self) -> StoreResult<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM problem2)",
            [],
            |row| row.get(0),
        )?;
        Ok(!exists)
    }
}
