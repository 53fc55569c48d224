//! Chat command handlers: run the operation, render the reply.
//!
//! Domain errors never escape from here; they become reply messages.

use tracing::{debug, error, info};

use crate::app::AppState;
use crate::command::{Command, InboundCommand};
use crate::error::{BotError, BotResult};
use crate::ops::{self, StatusReport};
use crate::reminder::{self, ReminderOutcome};
use crate::store::{self, DayEntry, Task};
use crate::transport::{bold, escape_markdown, OutboundMessage};

const MENU_KEYBOARD: &[&[&str]] = &[
    &["/tasks", "/status", "/list"],
    &["/addtask", "/removetask", "/done"],
    &["/edittask", "/testreminder", "/help"],
];

const COMMANDS_TEXT: &str = "\
• 📋 `/tasks` - today's tasks
• 📜 `/list` - all tasks
• ➕ `/addtask <name> [url] [DD-MM-YYYY] [HH:MM]` - add a task
• ✏️ `/edittask <n> [name] [url] [DD-MM-YYYY] [HH:MM]` - change task #n
• ➖ `/removetask <n>` - delete task #n
• ✅ `/done <n>` - mark / unmark task #n
• 📊 `/status` - today's progress
• 🔔 `/testreminder` - send the reminder now
• ❓ `/help` - this help";

fn due_suffix(task: &Task) -> Option<String> {
    match (task.due_date, task.due_time) {
        (Some(d), Some(t)) => Some(format!("due {} {}", d.format("%d-%m-%Y"), t.format("%H:%M"))),
        (Some(d), None) => Some(format!("due {}", d.format("%d-%m-%Y"))),
        (None, Some(t)) => Some(format!("due {}", t.format("%H:%M"))),
        (None, None) => None,
    }
}

/// `1. Buy milk`, `2. Pay bills (due 25-12-2025 18:30)`.
pub fn list_lines(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .enumerate()
        .map(|(i, t)| match due_suffix(t) {
            Some(due) => format!("{}. {} ({due})", i + 1, t.name),
            None => format!("{}. {}", i + 1, t.name),
        })
        .collect()
}

fn status_icon(done: bool) -> &'static str {
    if done {
        "✅"
    } else {
        "❌"
    }
}

fn day_line(position: usize, entry: &DayEntry) -> String {
    let mut line = format!(
        "{position}. {} {}",
        status_icon(entry.done),
        bold(&entry.task.name)
    );
    if let Some(due) = due_suffix(&entry.task) {
        line.push_str(&format!(" _({due})_"));
    }
    line
}

fn with_task_links<'a>(
    mut msg: OutboundMessage,
    tasks: impl Iterator<Item = (usize, &'a Task)>,
) -> OutboundMessage {
    for (position, task) in tasks {
        if let Some(url) = &task.url {
            msg = msg.with_link(format!("🔗 {position}. {}", task.name), url.clone());
        }
    }
    msg
}

pub fn render_today(entries: &[DayEntry]) -> OutboundMessage {
    if entries.is_empty() {
        return OutboundMessage::markdown("📋 No tasks yet. Add one with `/addtask`.");
    }
    let lines: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| day_line(i + 1, e))
        .collect();
    let date = entries[0].date.format("%d-%m-%Y");
    let msg = OutboundMessage::markdown(format!(
        "📋 *Today's tasks* ({date}):\n{}",
        lines.join("\n")
    ));
    with_task_links(msg, entries.iter().enumerate().map(|(i, e)| (i + 1, &e.task)))
}

pub fn render_all(tasks: &[Task]) -> OutboundMessage {
    if tasks.is_empty() {
        return OutboundMessage::plain("📜 No tasks yet.");
    }
    let lines: Vec<String> = list_lines(tasks).iter().map(|l| escape_markdown(l)).collect();
    let msg = OutboundMessage::markdown(format!("📜 *All tasks*:\n{}", lines.join("\n")));
    with_task_links(msg, tasks.iter().enumerate().map(|(i, t)| (i + 1, t)))
}

pub fn render_status(report: &StatusReport) -> OutboundMessage {
    if report.entries.is_empty() {
        return OutboundMessage::plain("You have no tasks yet 🤷");
    }
    let lines: Vec<String> = report
        .entries
        .iter()
        .map(|e| format!("{} {}", status_icon(e.done), escape_markdown(&e.task.name)))
        .collect();
    let suffix = if report.all_done() {
        "🎉 Everything is done today. Great job!"
    } else {
        "💪 Keep going!"
    };
    OutboundMessage::markdown(format!(
        "📊 *Progress today*: {}/{}\n{}\n\n{suffix}",
        report.done,
        report.total,
        lines.join("\n")
    ))
}

fn render_reminder_outcome(outcome: &ReminderOutcome) -> OutboundMessage {
    if outcome.unfinished == 0 {
        return OutboundMessage::plain("🎉 Nothing left to remind you about today.");
    }
    if outcome.sent {
        let to = outcome
            .recipient
            .map(|id| id.to_string())
            .unwrap_or_default();
        return OutboundMessage::plain(format!(
            "🔔 Reminder sent to chat {to} ({} unfinished).",
            outcome.unfinished
        ));
    }
    match outcome.error.as_deref() {
        Some("no_recipient") => OutboundMessage::plain(
            "⚠️ No reminder recipient yet. Send /start from the chat that should get reminders.",
        ),
        Some(err) => OutboundMessage::plain(format!("⚠️ Reminder delivery failed: {err}")),
        None => OutboundMessage::plain("⚠️ Reminder was not sent."),
    }
}

pub fn help_message() -> OutboundMessage {
    OutboundMessage::markdown(format!(
        "❓ *How to use this bot*:\n\n• `/start` - greeting and menu\n{COMMANDS_TEXT}\n\n\
         Numbers refer to positions in today's `/tasks` list."
    ))
}

/// Converts an operation error into the reply the user sees.
pub fn reply_for_error(err: &BotError) -> OutboundMessage {
    match err {
        BotError::Usage(msg) => OutboundMessage::markdown(format!("❗️ {msg}")),
        BotError::NotFound(msg) => OutboundMessage::markdown(format!("⚠️ {msg}")),
        BotError::Duplicate(msg) => OutboundMessage::plain(format!("⚠️ {msg}")),
        BotError::Storage(_) => {
            OutboundMessage::plain("⚠️ Something went wrong while saving. Please try again.")
        }
    }
}

/// Runs one inbound command and returns the replies for its chat.
pub async fn handle_command(state: &AppState, inbound: &InboundCommand) -> Vec<OutboundMessage> {
    info!(chat_id = inbound.chat_id, command = %inbound.keyword, "command received");
    let result = match Command::from_inbound(inbound) {
        Ok(command) => dispatch(state, inbound, command).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(replies) => replies,
        Err(err) => {
            if err.is_user_facing() {
                debug!(chat_id = inbound.chat_id, "command rejected: {err}");
            } else {
                error!(chat_id = inbound.chat_id, command = %inbound.keyword, "command failed: {err}");
            }
            vec![reply_for_error(&err)]
        }
    }
}

async fn dispatch(
    state: &AppState,
    inbound: &InboundCommand,
    command: Command,
) -> BotResult<Vec<OutboundMessage>> {
    if let Command::TestReminder = command {
        let outcome = reminder::run_reminder(state).await?;
        return Ok(vec![render_reminder_outcome(&outcome)]);
    }

    let mut conn = state.conn.lock().await;
    let today = state.today();

    let replies = match command {
        Command::Start => {
            let seeded = ops::seed_defaults(&mut conn)?;
            if seeded > 0 {
                info!(seeded, "seeded default tasks");
            }
            store::set_active_chat(&mut conn, inbound.chat_id, &state.clock.now().to_rfc3339())?;
            let name = bold(inbound.sender.as_deref().unwrap_or("there"));
            vec![
                OutboundMessage::markdown(format!(
                    "👋 Hello {name}!\nReminders will be sent to this chat.\n\n{COMMANDS_TEXT}"
                )),
                OutboundMessage::plain("Or tap one of the buttons:")
                    .with_quick_replies(MENU_KEYBOARD),
            ]
        }
        Command::Tasks => vec![render_today(&ops::list_today(&mut conn, today)?)],
        Command::List => vec![render_all(&ops::list_all(&mut conn)?)],
        Command::AddTask(new) => {
            let task = ops::add_task(&mut conn, &new)?;
            info!(task_id = task.id, "task added");
            vec![OutboundMessage::markdown(format!(
                "✅ Added task: {}",
                bold(&task.name)
            ))]
        }
        Command::RemoveTask(index) => {
            let task = ops::remove_task(&mut conn, today, index)?;
            vec![OutboundMessage::markdown(format!(
                "🗑️ Removed: {}",
                bold(&task.name)
            ))]
        }
        Command::EditTask { index, fields } => {
            let task = ops::edit_task(&mut conn, today, index, &fields)?;
            let mut text = format!("✏️ Updated task #{index}: {}", bold(&task.name));
            if let Some(due) = due_suffix(&task) {
                text.push_str(&format!(" _({due})_"));
            }
            vec![OutboundMessage::markdown(text)]
        }
        Command::Done(index) => {
            let entry = ops::toggle_done(&mut conn, today, index)?;
            let name = bold(&entry.task.name);
            let text = if entry.done {
                format!("🎉 {name} done!")
            } else {
                format!("↩️ Unmarked {name}.")
            };
            vec![OutboundMessage::markdown(text)]
        }
        Command::Status => vec![render_status(&ops::status_report(&mut conn, today)?)],
        Command::Help => vec![help_message()],
        Command::Unknown(keyword) => vec![OutboundMessage::plain(format!(
            "❓ Unknown command /{keyword}. See /help."
        ))],
        Command::TestReminder => Vec::new(),
    };
    Ok(replies)
}
