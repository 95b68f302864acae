//! Workspace cleanup
//!
//! Releases every workspace a dispatch allocated. Failures are collected
//! and logged, never returned as errors.

use crate::scratch::{ReleaseFailure, ScratchManager, ScratchWorkspace};

/// Outcome of releasing a batch's workspaces
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Workspaces fully removed
    pub released: usize,
    /// Entries that survived, across all workspaces
    pub failures: Vec<ReleaseFailure>,
}

impl CleanupReport {
    /// Whether every workspace was fully removed
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Release every workspace
pub fn release_all(scratch: &ScratchManager, workspaces: Vec<ScratchWorkspace>) -> CleanupReport {
    let total = workspaces.len();
    let mut report = CleanupReport::default();
    for workspace in workspaces {
        let released = scratch.release(workspace);
        if released.is_clean() {
            report.released += 1;
        }
        report.failures.extend(released.failures);
    }

    if report.is_clean() {
        tracing::info!("Removed {} scratch workspaces", report.released);
    } else {
        tracing::warn!(
            "Removed {}/{} scratch workspaces, {} entries left behind",
            report.released,
            total,
            report.failures.len()
        );
    }
    report
}
