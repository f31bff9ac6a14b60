//! Usage telemetry.

pub mod batcher;
pub mod sink;

pub use batcher::{UsageBatcher, UsageEvent};
pub use sink::{HttpTelemetrySink, TelemetrySink};
