//! Run lifecycle event system for SolveStudio.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{Event, EventEnvelope};
