use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_time: Option<NaiveTime>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub url: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyStatus {
    pub id: i64,
    pub task_id: i64,
    pub date: NaiveDate,
    pub done: bool,
}

/// One row of a day's list: the status joined with its task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayEntry {
    pub status_id: i64,
    pub date: NaiveDate,
    pub done: bool,
    pub task: Task,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteTaskResult {
    pub tasks_deleted: usize,
    pub statuses_deleted: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BotSettings {
    pub active_chat_id: Option<i64>,
    pub updated_at: Option<String>,
}

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS task (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL CHECK (length(trim(name)) > 0),
  url TEXT,
  due_date TEXT,
  due_time TEXT
);

CREATE TABLE IF NOT EXISTS daily_status (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  task_id INTEGER NOT NULL REFERENCES task(id) ON DELETE CASCADE,
  date TEXT NOT NULL,
  done INTEGER NOT NULL DEFAULT 0,
  UNIQUE(task_id, date)
);
CREATE INDEX IF NOT EXISTS idx_daily_status_date ON daily_status(date, done);

CREATE TABLE IF NOT EXISTS bot_settings (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  active_chat_id INTEGER,
  updated_at TEXT NOT NULL
);
INSERT INTO bot_settings (id, active_chat_id, updated_at)
VALUES (1, NULL, '1970-01-01T00:00:00Z')
ON CONFLICT(id) DO NOTHING;
"#,
    )?;
    ensure_task_columns(conn)?;
    Ok(())
}

// Databases created before deadlines existed only have (id, name, url).
fn ensure_task_columns(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(task)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut cols: HashSet<String> = HashSet::new();
    for r in rows {
        cols.insert(r?);
    }

    if !cols.contains("url") {
        conn.execute("ALTER TABLE task ADD COLUMN url TEXT", [])?;
    }
    if !cols.contains("due_date") {
        conn.execute("ALTER TABLE task ADD COLUMN due_date TEXT", [])?;
    }
    if !cols.contains("due_time") {
        conn.execute("ALTER TABLE task ADD COLUMN due_time TEXT", [])?;
    }

    Ok(())
}

const TASK_COLUMNS: &str = "id, name, url, due_date, due_time";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        due_date: row.get(3)?,
        due_time: row.get(4)?,
    })
}

pub fn insert_task(conn: &mut Connection, task: &NewTask) -> rusqlite::Result<Task> {
    conn.execute(
        "INSERT INTO task (name, url, due_date, due_time) VALUES (?1, ?2, ?3, ?4)",
        (
            task.name.trim(),
            task.url.as_deref(),
            task.due_date,
            task.due_time,
        ),
    )?;
    let id = conn.last_insert_rowid();
    Ok(Task {
        id,
        name: task.name.trim().to_string(),
        url: task.url.clone(),
        due_date: task.due_date,
        due_time: task.due_time,
    })
}

/// All tasks in storage (creation) order.
pub fn list_tasks(conn: &mut Connection) -> rusqlite::Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM task ORDER BY id ASC"))?;
    let rows = stmt.query_map([], task_from_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn count_tasks(conn: &mut Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM task", [], |row| row.get(0))
}

pub fn get_task(conn: &mut Connection, id: i64) -> rusqlite::Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?1"))?;
    stmt.query_row([id], task_from_row).optional()
}

pub fn find_task_by_name(conn: &mut Connection, name: &str) -> rusqlite::Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM task WHERE name = ?1 ORDER BY id ASC LIMIT 1"
    ))?;
    stmt.query_row([name.trim()], task_from_row).optional()
}

/// Overwrites every mutable column of the task row with `task`'s values.
pub fn update_task(conn: &mut Connection, task: &Task) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE task SET name = ?1, url = ?2, due_date = ?3, due_time = ?4 WHERE id = ?5",
        (
            task.name.trim(),
            task.url.as_deref(),
            task.due_date,
            task.due_time,
            task.id,
        ),
    )
}

/// Deletes a task and every status row that belongs to it, atomically.
pub fn delete_task(conn: &mut Connection, id: i64) -> rusqlite::Result<DeleteTaskResult> {
    let tx = conn.transaction()?;
    let statuses_deleted = tx.execute("DELETE FROM daily_status WHERE task_id = ?1", [id])?;
    let tasks_deleted = tx.execute("DELETE FROM task WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(DeleteTaskResult {
        tasks_deleted,
        statuses_deleted,
    })
}

pub fn get_status(
    conn: &mut Connection,
    task_id: i64,
    date: NaiveDate,
) -> rusqlite::Result<Option<DailyStatus>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, date, done FROM daily_status WHERE task_id = ?1 AND date = ?2",
    )?;
    stmt.query_row((task_id, date), |row| {
        let done: i64 = row.get(3)?;
        Ok(DailyStatus {
            id: row.get(0)?,
            task_id: row.get(1)?,
            date: row.get(2)?,
            done: done != 0,
        })
    })
    .optional()
}

/// Status rows for `date` joined with their tasks, in task creation order.
/// `done` narrows the result to finished or unfinished rows.
pub fn list_day_entries(
    conn: &mut Connection,
    date: NaiveDate,
    done: Option<bool>,
) -> rusqlite::Result<Vec<DayEntry>> {
    let mut stmt = conn.prepare(
        r#"
SELECT s.id, s.date, s.done, t.id, t.name, t.url, t.due_date, t.due_time
FROM daily_status s
JOIN task t ON t.id = s.task_id
WHERE s.date = ?1 AND (?2 IS NULL OR s.done = ?2)
ORDER BY t.id ASC
"#,
    )?;
    let rows = stmt.query_map((date, done.map(|d| d as i64)), |row| {
        let done: i64 = row.get(2)?;
        Ok(DayEntry {
            status_id: row.get(0)?,
            date: row.get(1)?,
            done: done != 0,
            task: Task {
                id: row.get(3)?,
                name: row.get(4)?,
                url: row.get(5)?,
                due_date: row.get(6)?,
                due_time: row.get(7)?,
            },
        })
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Flips the done flag in a single statement and returns the new value.
pub fn toggle_status(conn: &mut Connection, status_id: i64) -> rusqlite::Result<bool> {
    let done: i64 = conn.query_row(
        "UPDATE daily_status SET done = 1 - done WHERE id = ?1 RETURNING done",
        [status_id],
        |row| row.get(0),
    )?;
    Ok(done != 0)
}

pub fn load_bot_settings(conn: &mut Connection) -> rusqlite::Result<BotSettings> {
    let mut stmt =
        conn.prepare("SELECT active_chat_id, updated_at FROM bot_settings WHERE id = 1")?;
    match stmt.query_row([], |row| {
        Ok(BotSettings {
            active_chat_id: row.get(0)?,
            updated_at: row.get(1)?,
        })
    }) {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(BotSettings::default()),
        Err(err) => Err(err),
    }
}

pub fn set_active_chat(
    conn: &mut Connection,
    chat_id: i64,
    updated_at: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"
INSERT INTO bot_settings (id, active_chat_id, updated_at)
VALUES (1, ?1, ?2)
ON CONFLICT(id) DO UPDATE SET
  active_chat_id=excluded.active_chat_id,
  updated_at=excluded.updated_at
        "#,
        (chat_id, updated_at),
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn open_test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_db(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(name: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            ..NewTask::default()
        }
    }

    fn status_rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM daily_status", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn insert_and_list_keeps_creation_order() {
        let mut conn = open_test_db();
        insert_task(&mut conn, &new_task("b")).unwrap();
        insert_task(&mut conn, &new_task("a")).unwrap();

        let names: Vec<String> = list_tasks(&mut conn)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(count_tasks(&mut conn).unwrap(), 2);
    }

    #[test]
    fn deadline_columns_round_trip() {
        let mut conn = open_test_db();
        let t = insert_task(
            &mut conn,
            &NewTask {
                name: "  Pay bills ".to_string(),
                url: Some("https://pay.example".to_string()),
                due_date: NaiveDate::from_ymd_opt(2025, 12, 25),
                due_time: NaiveTime::from_hms_opt(18, 30, 0),
            },
        )
        .unwrap();

        let loaded = get_task(&mut conn, t.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Pay bills");
        assert_eq!(loaded.url.as_deref(), Some("https://pay.example"));
        assert_eq!(loaded.due_date, NaiveDate::from_ymd_opt(2025, 12, 25));
        assert_eq!(loaded.due_time, NaiveTime::from_hms_opt(18, 30, 0));
    }

    #[test]
    fn blank_name_is_rejected_by_schema() {
        let mut conn = open_test_db();
        assert!(insert_task(&mut conn, &new_task("   ")).is_err());
    }

    #[test]
    fn delete_task_cascades_statuses() {
        let mut conn = open_test_db();
        let keep = insert_task(&mut conn, &new_task("keep")).unwrap();
        let gone = insert_task(&mut conn, &new_task("gone")).unwrap();
        for day in 1..=3 {
            let date = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
            for id in [keep.id, gone.id] {
                conn.execute(
                    "INSERT INTO daily_status (task_id, date, done) VALUES (?1, ?2, 0)",
                    (id, date),
                )
                .unwrap();
            }
        }

        let res = delete_task(&mut conn, gone.id).unwrap();
        assert_eq!(res.tasks_deleted, 1);
        assert_eq!(res.statuses_deleted, 3);
        assert_eq!(status_rows(&conn), 3);

        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM daily_status WHERE task_id NOT IN (SELECT id FROM task)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn duplicate_status_row_violates_unique() {
        let mut conn = open_test_db();
        let t = insert_task(&mut conn, &new_task("x")).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        conn.execute(
            "INSERT INTO daily_status (task_id, date) VALUES (?1, ?2)",
            (t.id, date),
        )
        .unwrap();
        assert!(conn
            .execute(
                "INSERT INTO daily_status (task_id, date) VALUES (?1, ?2)",
                (t.id, date),
            )
            .is_err());
    }

    #[test]
    fn day_entries_filter_by_done() {
        let mut conn = open_test_db();
        let a = insert_task(&mut conn, &new_task("a")).unwrap();
        let b = insert_task(&mut conn, &new_task("b")).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        conn.execute(
            "INSERT INTO daily_status (task_id, date, done) VALUES (?1, ?2, 1)",
            (a.id, date),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO daily_status (task_id, date, done) VALUES (?1, ?2, 0)",
            (b.id, date),
        )
        .unwrap();

        assert_eq!(list_day_entries(&mut conn, date, None).unwrap().len(), 2);
        let open = list_day_entries(&mut conn, date, Some(false)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].task.name, "b");

        let st = get_status(&mut conn, a.id, date).unwrap().unwrap();
        assert!(st.done);
        assert!(!toggle_status(&mut conn, st.id).unwrap());
        assert!(!get_status(&mut conn, a.id, date).unwrap().unwrap().done);
        assert_eq!(list_day_entries(&mut conn, date, Some(false)).unwrap().len(), 2);
    }

    #[test]
    fn settings_default_then_update() {
        let mut conn = open_test_db();
        assert_eq!(load_bot_settings(&mut conn).unwrap().active_chat_id, None);

        set_active_chat(&mut conn, 4242, "2026-03-01T09:00:00Z").unwrap();
        let s = load_bot_settings(&mut conn).unwrap();
        assert_eq!(s.active_chat_id, Some(4242));
        assert_eq!(s.updated_at.as_deref(), Some("2026-03-01T09:00:00Z"));
    }

    #[test]
    fn init_db_is_repeatable_and_migrates_old_task_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE task (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);",
        )
        .unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let t = insert_task(
            &mut conn,
            &NewTask {
                name: "old".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 1, 2),
                ..NewTask::default()
            },
        )
        .unwrap();
        assert_eq!(
            get_task(&mut conn, t.id).unwrap().unwrap().due_date,
            NaiveDate::from_ymd_opt(2026, 1, 2)
        );
    }
}
