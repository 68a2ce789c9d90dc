//! Read path: `read()`, `seek()`, `close()` and the non-mutating inspection
//! helpers `status()`, `tracked()`, `logical_size()`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

use crate::error::{OverlayError, Result};
use crate::{not_found, validate_name, Check, Digest, ReadPolicy, SecureFile, SecureFs};

/// Integrity state of a single name, as reported by [`SecureFs::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// No integrity record.
    Untracked,
    /// Current content matches the sealed root.
    Verified,
    /// Current content differs from the sealed root.
    Tampered,
    /// A record exists but the file is gone.
    Missing,
}

/// One row of [`SecureFs::tracked`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub name: String,
    pub root: Digest,
    pub size: Option<u64>,
}

impl SecureFs {
    /// Reads into `buf` from the handle's current offset.
    ///
    /// With [`ReadPolicy::Verify`] a tracked file's root is recomputed first
    /// and the read fails with [`OverlayError::TamperDetected`] on mismatch,
    /// before any data is returned. With [`ReadPolicy::PassThrough`] the read
    /// is delegated unchanged.
    pub fn read(&mut self, handle: &mut SecureFile, buf: &mut [u8]) -> Result<usize> {
        if self.read_policy == ReadPolicy::Verify {
            if let Ok(name) = self.registry.resolve(&handle.identity) {
                let content = fs::read(self.path_of(name))?;
                if self.check(name, &content)? == Check::Tampered {
                    let offset = handle.file.stream_position()?;
                    let blocks = merkle::block_range(offset, buf.len());
                    warn!(name, offset, ?blocks, "tamper detected before read");
                    return Err(OverlayError::TamperDetected {
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(handle.file.read(buf)?)
    }

    /// Moves the handle's offset.
    ///
    /// `SeekFrom::End(delta)` is taken relative to the logical size recorded
    /// in the size table rather than the file's raw length; when the file has
    /// no size record the underlying seek is used. Other modes delegate.
    pub fn seek(&mut self, handle: &mut SecureFile, pos: SeekFrom) -> Result<u64> {
        if let SeekFrom::End(delta) = pos {
            let name = self.registry.resolve(&handle.identity)?;
            if let Some(size) = self.sizes.lookup(name)? {
                let target = size.checked_add_signed(delta).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "invalid seek to a negative or overflowing position",
                    )
                })?;
                debug!(name, size, target, "seek relative to logical size");
                return Ok(handle.file.seek(SeekFrom::Start(target))?);
            }
        }
        Ok(handle.file.seek(pos)?)
    }

    /// Flushes and releases the handle.
    pub fn close(&mut self, mut handle: SecureFile) -> Result<()> {
        handle.file.flush()?;
        Ok(())
    }

    /// Logical size recorded for the handle's file, if any.
    pub fn logical_size(&self, handle: &SecureFile) -> Result<Option<u64>> {
        let name = self.registry.resolve(&handle.identity)?;
        Ok(self.sizes.lookup(name)?)
    }

    /// Checks a single name without modifying anything.
    pub fn status(&self, name: &str) -> Result<FileStatus> {
        validate_name(name)?;
        let tracked = self.integrity.lookup(name)?.is_some();
        let content = match fs::read(self.path_of(name)) {
            Ok(content) => content,
            Err(e) if not_found(&e) => {
                return Ok(if tracked {
                    FileStatus::Missing
                } else {
                    FileStatus::Untracked
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(match self.check(name, &content)? {
            Check::Untracked(_) => FileStatus::Untracked,
            Check::Verified => FileStatus::Verified,
            Check::Tampered => FileStatus::Tampered,
        })
    }

    /// Every tracked file with its sealed root and logical size.
    pub fn tracked(&self) -> Result<Vec<TrackedFile>> {
        let sizes: HashMap<String, u64> = self.sizes.entries()?.into_iter().collect();
        Ok(self
            .integrity
            .entries()?
            .into_iter()
            .map(|(name, root)| TrackedFile {
                size: sizes.get(&name).copied(),
                name,
                root,
            })
            .collect())
    }
}
