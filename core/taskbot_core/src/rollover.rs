//! Daily rollover: every task gets exactly one status row per calendar day.
//!
//! Positional commands address tasks by their index in the day's list, so this
//! must run before anything reads or indexes "today".

use chrono::NaiveDate;
use rusqlite::{Connection, TransactionBehavior};

/// Creates a `done = 0` status row for every task that has none for `today`.
///
/// Runs in one IMMEDIATE transaction so concurrent callers serialize on the
/// write lock; a failure rolls back the whole pass and the next call starts
/// over. Returns how many rows were created.
pub fn ensure_today(conn: &mut Connection, today: NaiveDate) -> rusqlite::Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let created = tx.execute(
        r#"
INSERT INTO daily_status (task_id, date, done)
SELECT t.id, ?1, 0 FROM task t
WHERE NOT EXISTS (
  SELECT 1 FROM daily_status s WHERE s.task_id = t.id AND s.date = ?1
)
ON CONFLICT(task_id, date) DO NOTHING
"#,
        [today],
    )?;
    tx.commit()?;
    if created > 0 {
        tracing::debug!(%today, created, "rollover created status rows");
    }
    Ok(created)
}
