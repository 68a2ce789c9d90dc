//! Write path: pre-write verification of sealed bytes and reseal after every
//! accepted write.

use std::fs;
use std::io::{Seek, Write};
use tracing::{debug, warn};

use crate::error::{OverlayError, Result};
use crate::{Check, SecureFile, SecureFs};

impl SecureFs {
    /// Writes `buf` at the handle's current offset.
    ///
    /// # Steps
    ///
    /// 1. Resolve the handle to its name ([`OverlayError::IdentityUnresolved`]
    ///    if it was not opened through this overlay).
    /// 2. If the offset lies inside the sealed region (below the recorded
    ///    logical size, or the on-disk size when there is no size record),
    ///    recompute the root of the current content. A mismatch rejects the
    ///    write with [`OverlayError::TamperDetected`] and nothing is written.
    ///    Writes at or past the end of the sealed region skip this check, so a
    ///    same-length out-of-band edit made after open is absorbed by the
    ///    reseal that follows an append.
    /// 3. Perform the underlying write.
    /// 4. Reseal: persist the root and size of the new content.
    ///
    /// Returns the number of bytes the underlying write accepted.
    pub fn write(&mut self, handle: &mut SecureFile, buf: &[u8]) -> Result<usize> {
        let name = self.registry.resolve(&handle.identity)?.to_string();
        let path = self.path_of(&name);

        let sealed_len = match self.sizes.lookup(&name)? {
            Some(size) => size,
            None => fs::metadata(&path)?.len(),
        };
        let offset = if handle.append {
            fs::metadata(&path)?.len()
        } else {
            handle.file.stream_position()?
        };

        if offset < sealed_len {
            let content = fs::read(&path)?;
            match self.check(&name, &content)? {
                Check::Tampered => {
                    warn!(name = %name, offset, "tamper detected before write");
                    return Err(OverlayError::TamperDetected { name });
                }
                Check::Verified => debug!(name = %name, offset, "sealed region verified"),
                Check::Untracked(_) => debug!(name = %name, offset, "first tracked write"),
            }
        }

        let written = handle.file.write(buf)?;
        handle.file.flush()?;

        self.reseal(&name)?;
        debug!(name = %name, offset, written, "write accepted");
        Ok(written)
    }

    /// Writes the whole buffer, resealing after each underlying write.
    pub fn write_all(&mut self, handle: &mut SecureFile, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.write(handle, buf)? {
                0 => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    )
                    .into())
                }
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }
}
