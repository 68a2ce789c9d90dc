use records::StoreError;
use std::io;
use thiserror::Error;

/// Result alias used throughout the overlay.
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Errors surfaced by [`SecureFs`](crate::SecureFs) operations.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The recomputed root of a tracked file differs from its sealed root.
    /// No mutation was performed.
    #[error("tamper detected: {name} does not match its sealed root")]
    TamperDetected { name: String },

    /// The handle's device/inode identity is not in the registry.
    #[error("handle does not belong to a file opened through the overlay")]
    IdentityUnresolved,

    /// `name` is another hard link to a file already registered under
    /// `registered`. One identity maps to one name, so the alias is refused.
    #[error("{name} is a hard link to {registered}, which is already open through the overlay")]
    AliasedName { name: String, registered: String },

    /// Reading or rewriting an integrity/size table failed.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    /// The wrapped file operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid file name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

impl OverlayError {
    /// `true` for [`OverlayError::TamperDetected`].
    pub fn is_tamper(&self) -> bool {
        matches!(self, OverlayError::TamperDetected { .. })
    }
}
