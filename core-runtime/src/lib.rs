//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the playback crates:
//! - Logging and tracing bootstrap with host [`LoggerSink`](bridge_traits::logger::LoggerSink) forwarding
//! - The owner-facing event bus carrying [`CoordinatorEvent`](events::CoordinatorEvent)s
//! - The runtime error type used for configuration and wiring failures

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
