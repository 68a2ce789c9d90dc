//! Startup integrity sweep.
//!
//! Audits every integrity record: files that no longer exist are pruned from
//! both tables, live files are re-hashed and compared against their sealed
//! root. A single mismatch faults the whole sweep; the fault is never cleared
//! by a later match.

use merkle::root_of;
use std::collections::HashSet;
use std::fs;
use tracing::{info, warn};

use crate::error::Result;
use crate::{not_found, SecureFs};

/// Aggregate outcome of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultStatus {
    /// Every live tracked file matched its sealed root.
    #[default]
    Clean,
    /// At least one live tracked file failed verification.
    Faulted,
}

/// What a sweep found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub status: FaultStatus,
    /// Live files whose content matched.
    pub verified: Vec<String>,
    /// Live files whose content did not match or could not be read.
    pub tampered: Vec<String>,
    /// Records dropped because the file no longer exists.
    pub pruned: Vec<String>,
}

impl SweepReport {
    pub fn is_faulted(&self) -> bool {
        self.status == FaultStatus::Faulted
    }
}

impl SecureFs {
    /// Re-verifies every tracked file and compacts away records of missing
    /// files.
    ///
    /// Size records are compacted in the same pass: entries without a live
    /// integrity record are dropped, so both tables describe the same set of
    /// files afterwards. Tampered files keep their records.
    ///
    /// A tracked name that can no longer be read as a file (replaced by a
    /// directory, permission denied) counts as tampered; the sweep carries on
    /// with the remaining records.
    pub fn sweep(&mut self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut missing = HashSet::new();
        let mut live = HashSet::new();

        for (name, stored) in self.integrity.entries()? {
            match fs::read(self.path_of(&name)) {
                Err(e) if not_found(&e) => {
                    missing.insert(name);
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "sweep: tracked file unreadable");
                    report.status = FaultStatus::Faulted;
                    report.tampered.push(name.clone());
                    live.insert(name);
                }
                Ok(content) => {
                    if root_of(&content) == Some(stored) {
                        report.verified.push(name.clone());
                    } else {
                        warn!(name = %name, "sweep: root mismatch");
                        report.status = FaultStatus::Faulted;
                        report.tampered.push(name.clone());
                    }
                    live.insert(name);
                }
            }
        }

        report.pruned = self.integrity.compact(|name, _| !missing.contains(name))?;
        let orphaned = self.sizes.compact(|name, _| live.contains(name))?;
        for name in &report.pruned {
            self.registry.forget(name);
        }

        info!(
            verified = report.verified.len(),
            tampered = report.tampered.len(),
            pruned = report.pruned.len(),
            orphaned_sizes = orphaned.len(),
            status = ?report.status,
            "integrity sweep finished"
        );
        Ok(report)
    }
}
