//! AI-assisted reply generation.

pub mod backend;
pub mod cache;
pub mod engine;
pub mod prompts;

pub use engine::{AiReply, AiReplyEngine, ReplyRequest};
