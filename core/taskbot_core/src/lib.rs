//! Personal daily-task reminder bot.
//!
//! Tasks live in SQLite. Each day gets a fresh set of done flags, created
//! lazily by [`rollover::ensure_today`]. Chat commands arrive through
//! [`telegram`], and an hourly scheduler in [`reminder`] nags about whatever is
//! still unfinished.

pub mod app;
pub mod command;
pub mod error;
pub mod handlers;
pub mod http;
pub mod ops;
pub mod reminder;
pub mod rollover;
pub mod store;
pub mod telegram;
pub mod transport;
