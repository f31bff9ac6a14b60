//! Telegram Bot API integration: transport, rate-limited gateway, update
//! types and routing, and the webhook server.

pub mod client;
pub mod events;
pub mod gateway;
pub mod keyboard;
pub mod updates;
pub mod webhook;
