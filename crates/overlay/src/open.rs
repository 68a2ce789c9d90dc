//! Open path: verify-before-trust, first-time registration, stale-record
//! pruning.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{OverlayError, Result};
use crate::{not_found, validate_name, Check, FileIdentity, OpenFlags, SecureFile, SecureFs};

impl SecureFs {
    /// Opens `name` (relative to the overlay root) through the overlay.
    ///
    /// # Steps
    ///
    /// 1. **Missing file**: drop any integrity/size record left for it, then
    ///    delegate (which fails with `NotFound` unless `create` is set).
    /// 2. **Existing, untracked, non-empty**: seal its current content
    ///    (first-time registration), then delegate.
    /// 3. **Existing, tracked**: recompute the root; on mismatch fail with
    ///    [`OverlayError::TamperDetected`] without opening the file.
    /// 4. **Existing, untracked, empty**: nothing to check; delegate.
    ///
    /// The opened handle's device/inode identity is registered so later
    /// `write`/`read`/`seek` calls can resolve it. Opening a file with
    /// `truncate` reseals it afterwards.
    ///
    /// A file reachable under several hard links can only be opened through
    /// the first name registered for it; other links fail with
    /// [`OverlayError::AliasedName`] before anything is verified or sealed.
    pub fn open(&mut self, name: &str, flags: OpenFlags) -> Result<SecureFile> {
        validate_name(name)?;
        let path = self.path_of(name);
        self.refuse_alias(name, &path)?;

        let existed = match fs::read(&path) {
            Ok(content) => {
                self.admit(name, &content)?;
                true
            }
            Err(e) if not_found(&e) => {
                self.drop_stale(name)?;
                false
            }
            Err(e) => return Err(e.into()),
        };

        let file = flags.to_options().open(&path)?;
        let identity = FileIdentity::of(&file)?;
        if let Some(prev) = self.registry.register(identity, name.to_string()) {
            if prev != name {
                debug!(name, previous = %prev, "identity re-registered");
            }
        }

        if existed && flags.truncate {
            self.reseal(name)?;
        }

        Ok(SecureFile {
            file,
            identity,
            append: flags.append,
        })
    }

    /// Fails when `path` is a hard link to a file registered under another
    /// name that still points at the same inode. A registration whose name no
    /// longer links there (delete and inode reuse) is stale and gets replaced.
    fn refuse_alias(&self, name: &str, path: &Path) -> Result<()> {
        let identity = match FileIdentity::of_path(path) {
            Ok(identity) => identity,
            Err(e) if not_found(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let Ok(registered) = self.registry.resolve(&identity) else {
            return Ok(());
        };
        if registered != name
            && FileIdentity::of_path(self.path_of(registered)).ok() == Some(identity)
        {
            warn!(name, registered, "refusing hard-link alias");
            return Err(OverlayError::AliasedName {
                name: name.to_string(),
                registered: registered.to_string(),
            });
        }
        Ok(())
    }

    /// Verifies existing content, or registers it when untracked.
    fn admit(&self, name: &str, content: &[u8]) -> Result<()> {
        match self.check(name, content)? {
            Check::Verified => {
                debug!(name, "verified on open");
                Ok(())
            }
            Check::Untracked(Some(_)) => {
                self.seal(name, content)?;
                info!(name, size = content.len(), "registered new file");
                Ok(())
            }
            Check::Untracked(None) => {
                debug!(name, "empty untracked file, nothing to verify");
                Ok(())
            }
            Check::Tampered => {
                warn!(name, "tamper detected on open");
                Err(OverlayError::TamperDetected {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Removes the records of a tracked file that no longer exists.
    fn drop_stale(&mut self, name: &str) -> Result<()> {
        if self.integrity.remove(name)? {
            self.sizes.remove(name)?;
            self.registry.forget(name);
            info!(name, "file missing; dropped stale records");
        }
        Ok(())
    }
}
