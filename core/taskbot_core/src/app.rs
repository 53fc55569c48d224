use chrono::NaiveDate;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::reminder::{Clock, ReminderWindow};
use crate::transport::Transport;

/// Shared by the chat poller, the reminder scheduler and the admin API.
///
/// `conn` is the only shared mutable resource. Every read-then-write sequence
/// runs while holding its lock.
#[derive(Clone)]
pub struct AppState {
    pub conn: Arc<Mutex<Connection>>,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub window: ReminderWindow,
    /// Static recipient; a chat that sent `/start` takes precedence.
    pub default_chat_id: Option<i64>,
}

impl AppState {
    pub fn today(&self) -> NaiveDate {
        self.window.local_date(self.clock.now())
    }
}
