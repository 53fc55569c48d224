//! Task and status operations behind the chat commands.
//!
//! Positional operations take a 1-based index into today's list. They always
//! run rollover first and re-query the list, so bounds are checked against the
//! rows as they are now, not as the user last saw them.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::command::TaskFields;
use crate::error::{BotError, BotResult};
use crate::rollover::ensure_today;
use crate::store::{self, DayEntry, NewTask, Task};

/// Seeded by `start` when the store is empty.
pub const DEFAULT_TASKS: [&str; 4] = [
    "Airdrop hunting",
    "Research",
    "Write X.com post",
    "Run automation",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub date: NaiveDate,
    pub entries: Vec<DayEntry>,
    pub done: usize,
    pub total: usize,
}

impl StatusReport {
    pub fn all_done(&self) -> bool {
        self.total > 0 && self.done == self.total
    }
}

pub fn seed_defaults(conn: &mut Connection) -> BotResult<usize> {
    if store::count_tasks(conn)? > 0 {
        return Ok(0);
    }
    for name in DEFAULT_TASKS {
        store::insert_task(
            conn,
            &NewTask {
                name: name.to_string(),
                ..NewTask::default()
            },
        )?;
    }
    Ok(DEFAULT_TASKS.len())
}

/// Creates a task. A task with the same name is reported, not duplicated.
pub fn add_task(conn: &mut Connection, new: &NewTask) -> BotResult<Task> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(BotError::usage("Task name must not be empty."));
    }
    if store::find_task_by_name(conn, name)?.is_some() {
        return Err(BotError::Duplicate(format!("Task \"{name}\" already exists.")));
    }
    Ok(store::insert_task(conn, new)?)
}

pub fn list_all(conn: &mut Connection) -> BotResult<Vec<Task>> {
    Ok(store::list_tasks(conn)?)
}

pub fn list_today(conn: &mut Connection, today: NaiveDate) -> BotResult<Vec<DayEntry>> {
    ensure_today(conn, today)?;
    Ok(store::list_day_entries(conn, today, None)?)
}

/// Today's unfinished tasks, in list order.
pub fn unfinished_today(conn: &mut Connection, today: NaiveDate) -> BotResult<Vec<Task>> {
    ensure_today(conn, today)?;
    Ok(store::list_day_entries(conn, today, Some(false))?
        .into_iter()
        .map(|e| e.task)
        .collect())
}

fn resolve_index(entries: Vec<DayEntry>, index: usize) -> BotResult<DayEntry> {
    if entries.is_empty() {
        return Err(BotError::not_found(
            "You have no tasks yet. Add one with `/addtask`.",
        ));
    }
    let count = entries.len();
    index
        .checked_sub(1)
        .and_then(|i| entries.into_iter().nth(i))
        .ok_or_else(|| {
            BotError::not_found(format!(
                "No task #{index}. Pick a number from 1 to {count} (see `/tasks`)."
            ))
        })
}

/// Flips today's done flag for the task at `index`; returns the updated entry.
pub fn toggle_done(conn: &mut Connection, today: NaiveDate, index: usize) -> BotResult<DayEntry> {
    let mut entry = resolve_index(list_today(conn, today)?, index)?;
    entry.done = store::toggle_status(conn, entry.status_id)?;
    Ok(entry)
}

pub fn remove_task(conn: &mut Connection, today: NaiveDate, index: usize) -> BotResult<Task> {
    let entry = resolve_index(list_today(conn, today)?, index)?;
    let res = store::delete_task(conn, entry.task.id)?;
    tracing::info!(
        task_id = entry.task.id,
        statuses_deleted = res.statuses_deleted,
        "task removed"
    );
    Ok(entry.task)
}

/// Applies only the supplied fields; omitted fields keep their values.
pub fn edit_task(
    conn: &mut Connection,
    today: NaiveDate,
    index: usize,
    fields: &TaskFields,
) -> BotResult<Task> {
    if fields.is_empty() {
        return Err(BotError::usage("Nothing to change."));
    }
    let mut task = resolve_index(list_today(conn, today)?, index)?.task;

    if let Some(name) = fields.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(BotError::usage("Task name must not be empty."));
        }
        if let Some(other) = store::find_task_by_name(conn, name)? {
            if other.id != task.id {
                return Err(BotError::Duplicate(format!("Task \"{name}\" already exists.")));
            }
        }
        task.name = name.to_string();
    }
    if let Some(url) = &fields.url {
        task.url = Some(url.clone());
    }
    if let Some(date) = fields.due_date {
        task.due_date = Some(date);
    }
    if let Some(time) = fields.due_time {
        task.due_time = Some(time);
    }

    store::update_task(conn, &task)?;
    Ok(task)
}

pub fn status_report(conn: &mut Connection, today: NaiveDate) -> BotResult<StatusReport> {
    let entries = list_today(conn, today)?;
    let done = entries.iter().filter(|e| e.done).count();
    Ok(StatusReport {
        date: today,
        total: entries.len(),
        done,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{parse_edit, parse_new_task};
    use crate::store::open_test_db;
    use chrono::NaiveTime;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn add(conn: &mut Connection, text: &str) -> Task {
        add_task(conn, &parse_new_task(text).unwrap()).unwrap()
    }

    fn names(entries: &[DayEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.task.name.as_str()).collect()
    }

    #[test]
    fn add_then_list() {
        let mut conn = open_test_db();
        add(&mut conn, "Buy milk");
        let all = list_all(&mut conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Buy milk");

        let t = add(&mut conn, "Pay bills https://pay.example 25-12-2025 18:30");
        assert_eq!(t.name, "Pay bills");
        assert_eq!(t.url.as_deref(), Some("https://pay.example"));
        assert_eq!(t.due_date, NaiveDate::from_ymd_opt(2025, 12, 25));
        assert_eq!(t.due_time, NaiveTime::from_hms_opt(18, 30, 0));
    }

    #[test]
    fn duplicate_add_is_reported_and_skipped() {
        let mut conn = open_test_db();
        add(&mut conn, "Research");
        let err = add_task(&mut conn, &parse_new_task("Research").unwrap()).unwrap_err();
        assert!(matches!(err, BotError::Duplicate(_)));
        assert_eq!(list_all(&mut conn).unwrap().len(), 1);
    }

    #[test]
    fn toggle_is_its_own_inverse() {
        let mut conn = open_test_db();
        for n in ["A", "B", "C"] {
            add(&mut conn, n);
        }
        for i in 1..=3 {
            let before = list_today(&mut conn, today()).unwrap()[i - 1].done;
            assert_eq!(toggle_done(&mut conn, today(), i).unwrap().done, !before);
            assert_eq!(toggle_done(&mut conn, today(), i).unwrap().done, before);
            assert_eq!(list_today(&mut conn, today()).unwrap()[i - 1].done, before);
        }
    }

    #[test]
    fn done_two_toggles_only_b() {
        let mut conn = open_test_db();
        for n in ["A", "B", "C"] {
            add(&mut conn, n);
        }
        let entries = list_today(&mut conn, today()).unwrap();
        assert_eq!(names(&entries), vec!["A", "B", "C"]);

        let e = toggle_done(&mut conn, today(), 2).unwrap();
        assert_eq!(e.task.name, "B");
        let done: Vec<bool> = list_today(&mut conn, today())
            .unwrap()
            .iter()
            .map(|e| e.done)
            .collect();
        assert_eq!(done, vec![false, true, false]);
    }

    #[test]
    fn out_of_range_index_changes_nothing() {
        let mut conn = open_test_db();
        for n in ["A", "B"] {
            add(&mut conn, n);
        }
        let before = list_today(&mut conn, today()).unwrap();
        for bad in [0, before.len() + 1] {
            assert!(matches!(
                toggle_done(&mut conn, today(), bad),
                Err(BotError::NotFound(_))
            ));
            assert!(matches!(
                remove_task(&mut conn, today(), bad),
                Err(BotError::NotFound(_))
            ));
            let (_, fields) = parse_edit("1 renamed").unwrap();
            assert!(matches!(
                edit_task(&mut conn, today(), bad, &fields),
                Err(BotError::NotFound(_))
            ));
        }
        assert_eq!(list_today(&mut conn, today()).unwrap(), before);
    }

    #[test]
    fn positional_ops_on_empty_store_are_not_found() {
        let mut conn = open_test_db();
        assert!(matches!(
            toggle_done(&mut conn, today(), 1),
            Err(BotError::NotFound(_))
        ));
    }

    #[test]
    fn toggle_runs_rollover_first() {
        let mut conn = open_test_db();
        add(&mut conn, "A");
        // No list_today call yet: today's rows do not exist until toggle creates them.
        let e = toggle_done(&mut conn, today(), 1).unwrap();
        assert!(e.done);
        assert_eq!(e.date, today());
    }

    #[test]
    fn remove_cascades_and_shifts_positions() {
        let mut conn = open_test_db();
        for n in ["A", "B", "C"] {
            add(&mut conn, n);
        }
        list_today(&mut conn, today()).unwrap();
        let removed = remove_task(&mut conn, today(), 2).unwrap();
        assert_eq!(removed.name, "B");
        assert_eq!(names(&list_today(&mut conn, today()).unwrap()), vec!["A", "C"]);
        assert!(store::get_status(&mut conn, removed.id, today()).unwrap().is_none());
    }

    #[test]
    fn edit_applies_only_supplied_fields() {
        let mut conn = open_test_db();
        add(&mut conn, "Pay bills https://pay.example 25-12-2025 18:30");

        let (i, f) = parse_edit("1 20:00").unwrap();
        let t = edit_task(&mut conn, today(), i, &f).unwrap();
        assert_eq!(t.name, "Pay bills");
        assert_eq!(t.url.as_deref(), Some("https://pay.example"));
        assert_eq!(t.due_date, NaiveDate::from_ymd_opt(2025, 12, 25));
        assert_eq!(t.due_time, NaiveTime::from_hms_opt(20, 0, 0));

        let (i, f) = parse_edit("1 Pay all bills").unwrap();
        edit_task(&mut conn, today(), i, &f).unwrap();
        let stored = store::get_task(&mut conn, t.id).unwrap().unwrap();
        assert_eq!(stored.name, "Pay all bills");
        assert_eq!(stored.due_time, NaiveTime::from_hms_opt(20, 0, 0));
    }

    #[test]
    fn edit_rename_onto_existing_name_is_duplicate() {
        let mut conn = open_test_db();
        add(&mut conn, "A");
        add(&mut conn, "B");
        let (i, f) = parse_edit("2 A").unwrap();
        assert!(matches!(
            edit_task(&mut conn, today(), i, &f),
            Err(BotError::Duplicate(_))
        ));
        // Renaming to its own name is fine.
        let (i, f) = parse_edit("1 A").unwrap();
        assert_eq!(edit_task(&mut conn, today(), i, &f).unwrap().name, "A");
    }

    #[test]
    fn status_report_counts() {
        let mut conn = open_test_db();
        for n in ["A", "B"] {
            add(&mut conn, n);
        }
        toggle_done(&mut conn, today(), 1).unwrap();
        let r = status_report(&mut conn, today()).unwrap();
        assert_eq!((r.done, r.total), (1, 2));
        assert!(!r.all_done());
        toggle_done(&mut conn, today(), 2).unwrap();
        assert!(status_report(&mut conn, today()).unwrap().all_done());
    }

    #[test]
    fn unfinished_today_skips_done_tasks() {
        let mut conn = open_test_db();
        for n in ["A", "B", "C"] {
            add(&mut conn, n);
        }
        toggle_done(&mut conn, today(), 1).unwrap();
        let open: Vec<String> = unfinished_today(&mut conn, today())
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(open, vec!["B", "C"]);
    }

    #[test]
    fn seed_defaults_only_on_empty_store() {
        let mut conn = open_test_db();
        assert_eq!(seed_defaults(&mut conn).unwrap(), DEFAULT_TASKS.len());
        assert_eq!(seed_defaults(&mut conn).unwrap(), 0);
        assert_eq!(list_all(&mut conn).unwrap().len(), DEFAULT_TASKS.len());
    }
}
