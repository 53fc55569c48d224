//! Local admin API.
//!
//! - `GET /health`
//! - `GET /tasks/today`: today's checklist, after rollover
//! - `POST /reminder/trigger`: run the reminder now, same path as the scheduler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::app::AppState;
use crate::error::BotError;
use crate::ops;
use crate::reminder::run_reminder;
use crate::store::DayEntry;

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(data),
    })
    .into_response()
}

fn db_error(context: &str, err: &BotError) -> Response {
    error!("{context} failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrResponse {
            ok: false,
            error: "db_error",
        }),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks/today", get(get_tasks_today))
        .route("/reminder/trigger", post(post_reminder_trigger))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "taskbot_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

#[derive(Serialize)]
struct TodayView {
    date: String,
    done: usize,
    total: usize,
    tasks: Vec<DayEntry>,
}

async fn get_tasks_today(State(state): State<AppState>) -> Response {
    let mut conn = state.conn.lock().await;
    match ops::status_report(&mut conn, state.today()) {
        Ok(report) => ok(TodayView {
            date: report.date.format("%Y-%m-%d").to_string(),
            done: report.done,
            total: report.total,
            tasks: report.entries,
        }),
        Err(err) => db_error("status_report", &err),
    }
}

async fn post_reminder_trigger(State(state): State<AppState>) -> Response {
    match run_reminder(&state).await {
        Ok(outcome) => ok(outcome),
        Err(err) => db_error("run_reminder", &err),
    }
}
