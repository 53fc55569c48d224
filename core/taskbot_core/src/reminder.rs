//! Hourly reminder: on the hour, inside a fixed window of hours in a named
//! timezone, send the list of today's unfinished tasks.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::error::BotResult;
use crate::ops;
use crate::store;
use crate::transport::OutboundMessage;

pub const DEFAULT_TIMEZONE: &str = "Asia/Ho_Chi_Minh";
pub const DEFAULT_START_HOUR: u32 = 9;
pub const DEFAULT_END_HOUR: u32 = 23;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hours `[start_hour, end_hour]` (inclusive) of the day in `tz`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReminderWindow {
    pub tz: Tz,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl ReminderWindow {
    pub fn new(tz: Tz, start_hour: u32, end_hour: u32) -> anyhow::Result<Self> {
        if start_hour > 23 || end_hour > 23 {
            anyhow::bail!("reminder hours must be within 0..=23 (got {start_hour}..={end_hour})");
        }
        if start_hour > end_hour {
            anyhow::bail!("reminder start hour {start_hour} is after end hour {end_hour}");
        }
        Ok(ReminderWindow {
            tz,
            start_hour,
            end_hour,
        })
    }

    pub fn parse_timezone(name: &str) -> anyhow::Result<Tz> {
        name.trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone '{name}': {e}"))
    }

    /// Calendar date of `now` in the window's timezone. This is "today" for
    /// every task operation.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    fn hour_in_window(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }

    /// True when `now` is within the first minute of a window hour.
    pub fn should_fire(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        local.minute() == 0 && self.hour_in_window(local.hour())
    }

    /// The next top-of-hour strictly after `now` whose local hour is in the window.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.tz).naive_local();
        let mut candidate = local
            .date()
            .and_hms_opt(local.hour(), 0, 0)
            .unwrap_or(local);
        // Two days of hours always reaches a window hour, DST gaps included.
        for _ in 0..48 {
            candidate += Duration::hours(1);
            if !self.hour_in_window(candidate.hour()) {
                continue;
            }
            if let Some(at) = self.tz.from_local_datetime(&candidate).earliest() {
                let at = at.with_timezone(&Utc);
                if at > now {
                    return at;
                }
            }
        }
        now + Duration::hours(1)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReminderOutcome {
    pub unfinished: usize,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn render_reminder(names: &[String]) -> String {
    let lines: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}", i + 1, name))
        .collect();
    format!(
        "🔔 You still have unfinished tasks today:\n{}",
        lines.join("\n")
    )
}

/// The on-fire logic. Scheduled runs and manual triggers both call this.
///
/// Nothing is sent when every task is done. Delivery failures are logged and
/// reported in the outcome; only storage failures are returned as errors.
pub async fn run_reminder(state: &AppState) -> BotResult<ReminderOutcome> {
    let (unfinished, recipient) = {
        let mut conn = state.conn.lock().await;
        let today = state.today();
        let unfinished = ops::unfinished_today(&mut conn, today)?;
        let settings = store::load_bot_settings(&mut conn)?;
        (unfinished, settings.active_chat_id.or(state.default_chat_id))
    };

    let mut outcome = ReminderOutcome {
        unfinished: unfinished.len(),
        recipient,
        ..ReminderOutcome::default()
    };

    if unfinished.is_empty() {
        info!("all tasks done, reminder suppressed");
        return Ok(outcome);
    }
    let Some(chat_id) = recipient else {
        warn!(
            unfinished = outcome.unfinished,
            "no recipient configured; send /start or pass --chat-id"
        );
        outcome.error = Some("no_recipient".to_string());
        return Ok(outcome);
    };

    let names: Vec<String> = unfinished.into_iter().map(|t| t.name).collect();
    let message = OutboundMessage::plain(render_reminder(&names));
    match state.transport.send(chat_id, &message).await {
        Ok(()) => {
            info!(chat_id, unfinished = outcome.unfinished, "reminder sent");
            outcome.sent = true;
        }
        Err(err) => {
            error!(chat_id, "reminder delivery failed: {err}");
            outcome.error = Some(err.to_string());
        }
    }
    Ok(outcome)
}

/// Sleeps until each window hour and fires the reminder, until shutdown.
pub async fn run_scheduler(state: AppState, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(
        tz = %state.window.tz,
        start_hour = state.window.start_hour,
        end_hour = state.window.end_hour,
        "reminder scheduler started"
    );
    loop {
        let now = state.clock.now();
        let next = state.window.next_fire_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next.with_timezone(&state.window.tz), "next reminder scheduled");

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("reminder scheduler shutting down");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                let woke = state.clock.now();
                if !state.window.should_fire(woke) {
                    debug!(%woke, "woke outside the reminder window, rescheduling");
                    continue;
                }
                if let Err(err) = run_reminder(&state).await {
                    error!("scheduled reminder failed: {err}");
                }
            }
        }
    }
}
