//! Operator command handling: parsing, the guarded resolve path, reply
//! mode, quoted-reply matching, and response rendering.

pub mod callbacks;
pub mod command;
pub mod dispatcher;
pub mod housekeeping;
pub mod locks;
pub mod matcher;
pub mod render;
pub mod reply_state;
pub mod resolve;
pub mod suggestions;
