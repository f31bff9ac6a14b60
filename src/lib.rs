#![forbid(unsafe_code)]

//! Reply desk: routes marketplace buyer messages to a Telegram operator
//! channel and resolves each one exactly once by manual, template, or AI
//! reply.

pub mod ai;
pub mod config;
pub mod errors;
pub mod intake;
pub mod marketplace;
pub mod models;
pub mod operator;
pub mod persistence;
pub mod state;
pub mod telegram;
pub mod telemetry;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
