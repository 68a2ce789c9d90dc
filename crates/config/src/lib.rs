//! # Config - SealFS Overlay Settings
//!
//! All settings can be supplied through environment variables:
//!
//! ```text
//! SEALFS_ROOT         overlay root directory             (default: ".")
//! SEALFS_READ_VERIFY  verify root before every read      (default: "true")
//! SEALFS_SYNC         fsync integrity/size table rewrites (default: "true")
//! ```
//!
//! Values that fail to parse fall back to their defaults.

use std::path::{Path, PathBuf};

pub const ENV_ROOT: &str = "SEALFS_ROOT";
pub const ENV_READ_VERIFY: &str = "SEALFS_READ_VERIFY";
pub const ENV_SYNC: &str = "SEALFS_SYNC";

/// What `read` does before returning data from a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Recompute the file's root and refuse the read on mismatch.
    #[default]
    Verify,
    /// Delegate straight to the underlying read.
    PassThrough,
}

/// Settings for one overlay instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Directory holding the tracked files and the record tables.
    pub root: PathBuf,
    pub read_policy: ReadPolicy,
    /// If `true`, every table rewrite is fsynced before the swap.
    pub sync: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            read_policy: ReadPolicy::Verify,
            sync: true,
        }
    }
}

impl OverlayConfig {
    /// Default settings rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Loads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let root = lookup(ENV_ROOT)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.root);
        let verify = parse_bool(lookup(ENV_READ_VERIFY)).unwrap_or(true);
        let sync = parse_bool(lookup(ENV_SYNC)).unwrap_or(defaults.sync);

        Self {
            root,
            read_policy: if verify {
                ReadPolicy::Verify
            } else {
                ReadPolicy::PassThrough
            },
            sync,
        }
    }

    #[must_use]
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

fn parse_bool(raw: Option<String>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
