//! Process-wide engine crash accounting.
//!
//! Every coordinator in the process shares one [`CrashMonitor`] by default, so
//! a crash-looping engine host stops being recovered no matter which media
//! element hit it. Tests and embedders can inject an isolated monitor through
//! the coordinator builder.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

static GLOBAL: OnceLock<Arc<CrashMonitor>> = OnceLock::new();

/// Thread-safe crash counter.
#[derive(Debug, Default)]
pub struct CrashMonitor {
    crashes: AtomicU32,
    shut_down: AtomicBool,
}

impl CrashMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The monitor shared by all coordinators of this process.
    pub fn global() -> Arc<CrashMonitor> {
        GLOBAL.get_or_init(|| Arc::new(CrashMonitor::new())).clone()
    }

    /// Marks the process-wide monitor as shut down; no further recoveries
    /// are allowed.
    pub fn shutdown_global() {
        if let Some(monitor) = GLOBAL.get() {
            monitor.shutdown();
        }
    }

    /// Records one engine host crash and returns the updated count.
    ///
    /// Crashes are no longer counted once the monitor is shut down.
    pub fn notify_crash(&self) -> u32 {
        if self.is_shut_down() {
            return self.crashes.load(Ordering::Acquire);
        }
        let previous = self
            .crashes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or_else(|n| n);
        let crashes = previous.saturating_add(1);
        warn!(crashes, "engine host process crashed");
        crashes
    }

    /// Whether another recovery attempt is allowed under `max_crashes`.
    pub fn should_recover(&self, max_crashes: u32) -> bool {
        if self.is_shut_down() {
            debug!("crash monitor shut down, not recovering");
            return false;
        }
        self.crash_count() <= max_crashes
    }

    pub fn crash_count(&self) -> u32 {
        self.crashes.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
