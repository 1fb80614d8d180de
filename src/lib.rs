//! Workspace facade crate.
//!
//! Hosts that embed the external-engine playback coordinator can depend on
//! `engine-playback-workspace` and pick a feature instead of wiring each crate:
//!
//! - `coordinator` (default): the state machine core plus its runtime
//! - `runtime-only`: logging bootstrap and event bus without the coordinator

pub use bridge_traits;

#[cfg(feature = "coordinator")]
pub use core_playback;

#[cfg(any(feature = "coordinator", feature = "runtime-only"))]
pub use core_runtime;
