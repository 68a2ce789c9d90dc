//! # Overlay - SealFS Secure File API
//!
//! Wraps ordinary file I/O with a Merkle-root integrity check so that bytes
//! modified behind the overlay's back are detected the next time the file is
//! opened, written, or read through it.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────┐
//! │                     SecureFs                         │
//! │                                                      │
//! │ open.rs  → root_of(file) ⇄ INTEGRITY → delegate open │
//! │ write.rs → registry → pre-check → write → reseal     │
//! │ read.rs  → (verify) → read | seek(End → SIZES)       │
//! │ sweep.rs → audit every record, prune missing files   │
//! └──────────────────────────────────────────────────────┘
//!            |                         |
//!            v                         v
//!     merkle::root_of        records::{IntegrityStore, SizeStore}
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                  |
//! |-------------|----------------------------------------------------------|
//! | `lib.rs`    | `SecureFs`, `SecureFile`, `OpenFlags`, constructor, sealing |
//! | [`registry`] | device/inode → name resolution for open handles          |
//! | `open`      | `open()` verify / first-time registration / stale pruning |
//! | `write`     | `write()` pre-write check and reseal                      |
//! | `read`      | `read()`, `seek()`, `close()`, `status()`, `tracked()`    |
//! | [`sweep`]   | startup audit and compaction                              |
//!
//! ## On-disk State
//!
//! The overlay root directory holds the tracked files plus two record tables,
//! [`INTEGRITY_FILENAME`] (name → root digest) and [`SIZES_FILENAME`]
//! (name → logical size). Both are replaced atomically on every change.
//!
//! ## Example
//!
//! ```rust,no_run
//! use config::OverlayConfig;
//! use overlay::{OpenFlags, SecureFs};
//!
//! let (mut fs, report) = SecureFs::init(&OverlayConfig::new("/srv/sealed")).unwrap();
//! assert!(!report.is_faulted());
//!
//! let mut f = fs.open("notes.txt", OpenFlags::read_write().create(true)).unwrap();
//! fs.write(&mut f, b"hello").unwrap();
//! fs.close(f).unwrap();
//! ```

mod error;
mod open;
mod read;
pub mod registry;
pub mod sweep;
mod write;

pub use config::{OverlayConfig, ReadPolicy};
pub use error::{OverlayError, Result};
pub use merkle::Digest;
pub use read::{FileStatus, TrackedFile};
pub use registry::{FileIdentity, Registry};
pub use sweep::{FaultStatus, SweepReport};

use merkle::root_of;
use records::{IntegrityStore, SizeStore, MAX_NAME_LEN};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the integrity table within the overlay root.
pub const INTEGRITY_FILENAME: &str = "INTEGRITY";

/// Name of the size table within the overlay root.
pub const SIZES_FILENAME: &str = "SIZES";

/// Names that can never be opened as tracked files.
const RESERVED_NAMES: [&str; 4] = [
    INTEGRITY_FILENAME,
    SIZES_FILENAME,
    "INTEGRITY.tmp",
    "SIZES.tmp",
];

/// How a file should be opened. Mirrors [`std::fs::OpenOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn read(mut self, on: bool) -> Self {
        self.read = on;
        self
    }

    #[must_use]
    pub fn write(mut self, on: bool) -> Self {
        self.write = on;
        self
    }

    #[must_use]
    pub fn append(mut self, on: bool) -> Self {
        self.append = on;
        self
    }

    #[must_use]
    pub fn create(mut self, on: bool) -> Self {
        self.create = on;
        self
    }

    #[must_use]
    pub fn truncate(mut self, on: bool) -> Self {
        self.truncate = on;
        self
    }

    pub(crate) fn to_options(self) -> OpenOptions {
        let mut opts = OpenOptions::new();
        opts.read(self.read)
            .write(self.write)
            .append(self.append)
            .create(self.create)
            .truncate(self.truncate);
        opts
    }
}

/// An open file handle returned by [`SecureFs::open`].
///
/// The handle knows its device/inode identity but not its name; the overlay
/// resolves the name through its [`Registry`].
#[derive(Debug)]
pub struct SecureFile {
    pub(crate) file: File,
    pub(crate) identity: FileIdentity,
    pub(crate) append: bool,
}

impl SecureFile {
    pub fn identity(&self) -> FileIdentity {
        self.identity
    }
}

/// The tamper-evident overlay over one root directory.
///
/// # Protocol
///
/// - **open**: verify a tracked file before opening it; register an untracked
///   non-empty file on first sight; drop records of files that vanished.
/// - **write**: verify before overwriting sealed bytes; reseal after every
///   accepted write.
/// - **read**: verify before returning data (with [`ReadPolicy::Verify`]).
/// - **seek**: `End` is relative to the recorded logical size.
///
/// All operations are synchronous and assume a single writer.
pub struct SecureFs {
    pub(crate) root: PathBuf,
    pub(crate) integrity: IntegrityStore,
    pub(crate) sizes: SizeStore,
    pub(crate) registry: Registry,
    pub(crate) read_policy: ReadPolicy,
}

impl std::fmt::Debug for SecureFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureFs")
            .field("root", &self.root)
            .field("read_policy", &self.read_policy)
            .field("integrity", &self.integrity.path())
            .field("sizes", &self.sizes.path())
            .field("registered_handles", &self.registry.len())
            .finish()
    }
}

/// Outcome of comparing current content against the integrity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Check {
    /// No record; carries the freshly computed root (`None` for empty content).
    Untracked(Option<Digest>),
    Verified,
    Tampered,
}

impl SecureFs {
    /// Opens the overlay without running the startup sweep.
    ///
    /// Creates the root directory if needed and removes table images left
    /// behind by an interrupted rewrite.
    pub fn new(config: &OverlayConfig) -> Result<Self> {
        let root = config.root.clone();
        std::fs::create_dir_all(&root)?;

        let integrity = IntegrityStore::open(root.join(INTEGRITY_FILENAME), config.sync);
        let sizes = SizeStore::open(root.join(SIZES_FILENAME), config.sync);
        integrity.cleanup_tmp()?;
        sizes.cleanup_tmp()?;

        debug!(root = %root.display(), policy = ?config.read_policy, "overlay opened");

        Ok(Self {
            root,
            integrity,
            sizes,
            registry: Registry::new(),
            read_policy: config.read_policy,
        })
    }

    /// Opens the overlay and runs the startup sweep.
    ///
    /// The returned report says whether any live tracked file failed
    /// verification; records of files that no longer exist are pruned.
    pub fn init(config: &OverlayConfig) -> Result<(Self, SweepReport)> {
        let mut fs = Self::new(config)?;
        let report = fs.sweep()?;
        Ok((fs, report))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.read_policy
    }

    pub fn set_read_policy(&mut self, policy: ReadPolicy) {
        self.read_policy = policy;
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn integrity_store(&self) -> &IntegrityStore {
        &self.integrity
    }

    pub fn size_store(&self) -> &SizeStore {
        &self.sizes
    }

    pub(crate) fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Compares `content` against the stored root for `name`.
    pub(crate) fn check(&self, name: &str, content: &[u8]) -> Result<Check> {
        let root = root_of(content);
        Ok(match self.integrity.lookup(name)? {
            None => Check::Untracked(root),
            Some(stored) if Some(stored) == root => Check::Verified,
            Some(_) => Check::Tampered,
        })
    }

    /// Persists the root and size of `content` as the new sealed state of
    /// `name`. Empty content has no root, so its records are dropped instead.
    pub(crate) fn seal(&self, name: &str, content: &[u8]) -> Result<Option<Digest>> {
        match root_of(content) {
            Some(root) => {
                self.integrity.upsert(name, root)?;
                self.sizes.upsert(name, content.len() as u64)?;
                info!(name, root = %root, size = content.len(), "sealed");
                Ok(Some(root))
            }
            None => {
                self.integrity.remove(name)?;
                self.sizes.remove(name)?;
                info!(name, "emptied; records dropped");
                Ok(None)
            }
        }
    }

    /// Re-reads `name` from disk and seals it.
    pub(crate) fn reseal(&self, name: &str) -> Result<Option<Digest>> {
        let content = std::fs::read(self.path_of(name))?;
        self.seal(name, &content)
    }
}

/// Checks that `name` is a plain file name inside the overlay root.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("name longer than 255 bytes")
    } else if name == "." || name == ".." {
        Some("name must not be a directory reference")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name must not contain path separators")
    } else if RESERVED_NAMES.contains(&name) {
        Some("name is reserved for overlay metadata")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(OverlayError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

pub(crate) fn not_found(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

#[cfg(test)]
mod tests;
