//! Turns inbound chat text into commands and structured task fields.

use chrono::{NaiveDate, NaiveTime};

use crate::error::{BotError, BotResult};
use crate::store::NewTask;
use crate::transport::escape_markdown;

pub const ADD_USAGE: &str = "Usage: `/addtask <name> [url] [DD-MM-YYYY] [HH:MM]`";
pub const EDIT_USAGE: &str = "Usage: `/edittask <n> [new name] [url] [DD-MM-YYYY] [HH:MM]`";
pub const DONE_USAGE: &str = "Usage: `/done <n>` (see `/tasks` for numbers)";
pub const REMOVE_USAGE: &str = "Usage: `/removetask <n>` (see `/tasks` for numbers)";

/// A chat message that starts with `/`, split into keyword and arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundCommand {
    pub chat_id: i64,
    pub sender: Option<String>,
    /// Lowercased, without the leading `/` or a trailing `@botname`.
    pub keyword: String,
    /// Everything after the keyword, trimmed.
    pub text: String,
    pub args: Vec<String>,
}

impl InboundCommand {
    /// Returns `None` for plain text that is not a command.
    pub fn parse(chat_id: i64, sender: Option<String>, message: &str) -> Option<Self> {
        let message = message.trim();
        let rest = message.strip_prefix('/')?;
        let (head, text) = match rest.split_once(char::is_whitespace) {
            Some((head, text)) => (head, text.trim()),
            None => (rest, ""),
        };
        let keyword = head.split('@').next().unwrap_or(head).to_lowercase();
        if keyword.is_empty() {
            return None;
        }
        Some(InboundCommand {
            chat_id,
            sender,
            keyword,
            text: text.to_string(),
            args: text.split_whitespace().map(str::to_string).collect(),
        })
    }
}

/// Fields extracted from free text. `None` means "not supplied".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskFields {
    pub name: Option<String>,
    pub url: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
}

impl TaskFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.due_date.is_none()
            && self.due_time.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Tasks,
    List,
    AddTask(NewTask),
    RemoveTask(usize),
    EditTask { index: usize, fields: TaskFields },
    Done(usize),
    Status,
    TestReminder,
    Help,
    Unknown(String),
}

impl Command {
    pub fn from_inbound(cmd: &InboundCommand) -> BotResult<Command> {
        let parsed = match cmd.keyword.as_str() {
            "start" => Command::Start,
            "tasks" => Command::Tasks,
            "list" => Command::List,
            "addtask" => Command::AddTask(parse_new_task(&cmd.text)?),
            "removetask" => {
                Command::RemoveTask(parse_index(cmd.args.first().map(String::as_str), REMOVE_USAGE)?)
            }
            "edittask" => {
                let (index, fields) = parse_edit(&cmd.text)?;
                Command::EditTask { index, fields }
            }
            "done" => Command::Done(parse_index(cmd.args.first().map(String::as_str), DONE_USAGE)?),
            "status" => Command::Status,
            "testreminder" => Command::TestReminder,
            "help" => Command::Help,
            other => Command::Unknown(other.to_string()),
        };
        Ok(parsed)
    }
}

/// Splits `text` into name, url, due date and due time.
///
/// Tokens are scanned in order and the first token of each kind wins. Anything
/// not claimed (including a second url or date) stays part of the name.
pub fn parse_task_fields(text: &str) -> BotResult<TaskFields> {
    let mut fields = TaskFields::default();
    let mut name_parts: Vec<&str> = Vec::new();

    for token in text.split_whitespace() {
        if fields.url.is_none() && (token.starts_with("http://") || token.starts_with("https://")) {
            fields.url = Some(token.to_string());
        } else if fields.due_date.is_none() && looks_like_date(token) {
            fields.due_date = Some(parse_date(token)?);
        } else if fields.due_time.is_none() && looks_like_time(token) {
            fields.due_time = Some(parse_time(token)?);
        } else {
            name_parts.push(token);
        }
    }

    let name = name_parts.join(" ").trim().to_string();
    if !name.is_empty() {
        fields.name = Some(name);
    }
    Ok(fields)
}

pub fn parse_new_task(text: &str) -> BotResult<NewTask> {
    let fields = parse_task_fields(text)?;
    let Some(name) = fields.name else {
        return Err(BotError::usage(format!("Task name is missing. {ADD_USAGE}")));
    };
    Ok(NewTask {
        name,
        url: fields.url,
        due_date: fields.due_date,
        due_time: fields.due_time,
    })
}

/// `<n> [fields...]` where `n` is a 1-based position in today's list.
pub fn parse_edit(text: &str) -> BotResult<(usize, TaskFields)> {
    let text = text.trim();
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest),
        None => (text, ""),
    };
    let index = parse_index(Some(head), EDIT_USAGE)?;
    let fields = parse_task_fields(rest)?;
    if fields.is_empty() {
        return Err(BotError::usage(format!("Nothing to change. {EDIT_USAGE}")));
    }
    Ok((index, fields))
}

pub fn parse_index(arg: Option<&str>, usage: &str) -> BotResult<usize> {
    let Some(arg) = arg.map(str::trim).filter(|a| !a.is_empty()) else {
        return Err(BotError::usage(usage));
    };
    if !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BotError::usage(format!(
            "{} is not a number. {usage}",
            escape_markdown(arg)
        )));
    }
    arg.parse::<usize>()
        .map_err(|_| BotError::usage(format!("`{arg}` is too large. {usage}")))
}

fn all_digits(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

// D{1,2}-D{1,2}-D{4}
fn looks_like_date(token: &str) -> bool {
    let parts: Vec<&str> = token.split('-').collect();
    parts.len() == 3
        && all_digits(parts[0], 1, 2)
        && all_digits(parts[1], 1, 2)
        && all_digits(parts[2], 4, 4)
}

// D{1,2}:D{2}
fn looks_like_time(token: &str) -> bool {
    match token.split_once(':') {
        Some((h, m)) => all_digits(h, 1, 2) && all_digits(m, 2, 2),
        None => false,
    }
}

fn parse_date(token: &str) -> BotResult<NaiveDate> {
    NaiveDate::parse_from_str(token, "%d-%m-%Y")
        .map_err(|_| BotError::usage(format!("`{token}` is not a valid date (DD-MM-YYYY).")))
}

fn parse_time(token: &str) -> BotResult<NaiveTime> {
    NaiveTime::parse_from_str(token, "%H:%M")
        .map_err(|_| BotError::usage(format!("`{token}` is not a valid time (HH:MM, 24h).")))
}
