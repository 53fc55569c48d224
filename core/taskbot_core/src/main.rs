use clap::Parser;
use rusqlite::Connection;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use taskbot_core::{
    app::AppState,
    reminder::{
        self, ReminderWindow, SystemClock, DEFAULT_END_HOUR, DEFAULT_START_HOUR, DEFAULT_TIMEZONE,
    },
    store::{init_db, load_bot_settings},
    telegram::{self, TelegramClient, DEFAULT_API_BASE_URL},
};

const DEFAULT_PORT: u16 = 17601;

#[derive(Parser, Debug)]
#[command(name = "taskbot_core", version)]
struct Args {
    /// Telegram bot token.
    #[arg(long, env = "TASKBOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Chat that receives reminders until someone sends /start.
    #[arg(long, env = "TASKBOT_CHAT_ID")]
    chat_id: Option<i64>,

    /// SQLite database path.
    #[arg(long, default_value = "./data/taskbot.db")]
    db: PathBuf,

    /// IANA timezone for "today" and the reminder window.
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// First local hour (0-23) a reminder fires.
    #[arg(long, default_value_t = DEFAULT_START_HOUR)]
    reminder_start_hour: u32,

    /// Last local hour (0-23) a reminder fires.
    #[arg(long, default_value_t = DEFAULT_END_HOUR)]
    reminder_end_hour: u32,

    /// Admin API listen address.
    ///
    /// Accepts:
    /// - ip:port, e.g. 127.0.0.1:17601
    /// - ip (implies port 17601), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:17601")]
    listen: String,

    /// Long-poll timeout for getUpdates (seconds).
    #[arg(long, default_value_t = 30)]
    poll_timeout_seconds: u64,

    /// Bot API base URL.
    #[arg(long, default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskbot_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let tz = ReminderWindow::parse_timezone(&args.timezone)?;
    let window = ReminderWindow::new(tz, args.reminder_start_hour, args.reminder_end_hour)?;
    let addr = parse_listen(&args.listen)?;

    if let Some(parent) = args.db.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut conn = Connection::open(&args.db)?;
    init_db(&conn)?;
    let settings = load_bot_settings(&mut conn)?;
    if settings.active_chat_id.is_none() && args.chat_id.is_none() {
        warn!("no reminder recipient yet; send /start to the bot or pass --chat-id");
    }

    let client = Arc::new(TelegramClient::new(
        &args.api_base_url,
        &args.bot_token,
        args.poll_timeout_seconds,
    )?);

    let state = AppState {
        conn: Arc::new(Mutex::new(conn)),
        transport: client.clone(),
        clock: Arc::new(SystemClock),
        window,
        default_chat_id: args.chat_id,
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let scheduler = tokio::spawn(reminder::run_scheduler(
        state.clone(),
        shutdown_tx.subscribe(),
    ));
    let poller = tokio::spawn(telegram::run_poller(
        state.clone(),
        client,
        shutdown_tx.subscribe(),
    ));

    let app = taskbot_core::http::router(state);
    info!("Admin API listening on http://{addr}");
    info!("DB: {}", args.db.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    let (scheduler_res, poller_res) = tokio::join!(scheduler, poller);
    for msg in [
        join_failure("reminder scheduler", scheduler_res),
        join_failure("chat poller", poller_res),
    ]
    .into_iter()
    .flatten()
    {
        warn!("{msg}");
    }
    Ok(())
}

fn join_failure(task: &str, res: Result<(), tokio::task::JoinError>) -> Option<String> {
    match res {
        Ok(()) => None,
        Err(e) if e.is_panic() => Some(format!("{task} panicked: {e}")),
        Err(e) => Some(format!("{task} did not finish cleanly: {e}")),
    }
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some(("localhost", port_str)) = input.rsplit_once(':') {
        let port: u16 = port_str.parse().map_err(|_| {
            anyhow::anyhow!(
                "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                input,
                DEFAULT_PORT
            )
        })?;
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
