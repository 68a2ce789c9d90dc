use std::fmt;

/// Length of a [`Digest`] in bytes (160 bits).
pub const DIGEST_LEN: usize = 20;

/// Fixed-length output of the hash primitive.
///
/// Opaque and only compared for equality. `Display` and `Debug` render
/// lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a digest from a slice, returning `None` unless it is exactly
    /// [`DIGEST_LEN`] bytes long.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering (40 chars).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// The hash primitive used for leaves and internal nodes.
///
/// Implementations must be pure: identical input always yields the identical
/// digest.
pub trait Digester {
    /// Digests an arbitrary byte span.
    fn digest(&self, data: &[u8]) -> Digest;

    /// Digests the concatenation `left ++ right` (40 bytes).
    fn digest_pair(&self, left: &Digest, right: &Digest) -> Digest {
        let mut buf = [0u8; DIGEST_LEN * 2];
        buf[..DIGEST_LEN].copy_from_slice(left.as_bytes());
        buf[DIGEST_LEN..].copy_from_slice(right.as_bytes());
        self.digest(&buf)
    }
}

/// BLAKE3 in extendable-output mode, truncated to [`DIGEST_LEN`] bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Digester;

impl Digester for Blake3Digester {
    fn digest(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(data);
        let mut out = [0u8; DIGEST_LEN];
        hasher.finalize_xof().fill(&mut out);
        Digest(out)
    }
}
