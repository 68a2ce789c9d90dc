//! Tracked-file registry: resolves an open handle to the name it was opened
//! under.
//!
//! Handles do not carry their origin path. Instead every file opened through
//! the overlay is registered under its device/inode pair, and later
//! operations look the handle's own device/inode up here. The map grows as
//! files are opened and has no fixed capacity.

use std::collections::HashMap;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::Path;

use crate::error::{OverlayError, Result};

/// Device and inode numbers identifying an underlying file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl FileIdentity {
    /// Reads the identity of an open file.
    pub fn of(file: &File) -> io::Result<Self> {
        Self::from_metadata(&file.metadata()?)
    }

    /// Reads the identity of the file at `path` without opening it.
    pub fn of_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::from_metadata(&fs::metadata(path)?)
    }

    #[cfg(unix)]
    fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_meta: &Metadata) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "device/inode identity is only available on unix",
        ))
    }
}

/// Identity-to-name map for files opened through the overlay.
#[derive(Debug, Default)]
pub struct Registry {
    by_identity: HashMap<FileIdentity, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `identity` under `name`, returning the name it previously
    /// mapped to (inode reuse after a delete/recreate).
    pub fn register(&mut self, identity: FileIdentity, name: String) -> Option<String> {
        self.by_identity.insert(identity, name)
    }

    /// Resolves a handle identity to its registered name.
    pub fn resolve(&self, identity: &FileIdentity) -> Result<&str> {
        self.by_identity
            .get(identity)
            .map(String::as_str)
            .ok_or(OverlayError::IdentityUnresolved)
    }

    /// Drops every registration for `name`. Returns how many were removed.
    pub fn forget(&mut self, name: &str) -> usize {
        let before = self.by_identity.len();
        self.by_identity.retain(|_, n| n != name);
        before - self.by_identity.len()
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(dev: u64, ino: u64) -> FileIdentity {
        FileIdentity { dev, ino }
    }

    #[test]
    fn resolve_registered_identity() {
        let mut reg = Registry::new();
        reg.register(id(1, 10), "a.txt".to_string());
        reg.register(id(1, 11), "b.txt".to_string());

        assert_eq!(reg.resolve(&id(1, 10)).unwrap(), "a.txt");
        assert_eq!(reg.resolve(&id(1, 11)).unwrap(), "b.txt");
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn same_inode_on_other_device_is_distinct() {
        let mut reg = Registry::new();
        reg.register(id(1, 10), "a.txt".to_string());
        assert!(matches!(
            reg.resolve(&id(2, 10)),
            Err(OverlayError::IdentityUnresolved)
        ));
    }

    #[test]
    fn reregister_returns_previous_name() {
        let mut reg = Registry::new();
        assert_eq!(reg.register(id(1, 10), "old".to_string()), None);
        assert_eq!(
            reg.register(id(1, 10), "new".to_string()),
            Some("old".to_string())
        );
        assert_eq!(reg.resolve(&id(1, 10)).unwrap(), "new");
    }

    #[test]
    fn forget_drops_all_identities_for_name() {
        let mut reg = Registry::new();
        reg.register(id(1, 10), "a.txt".to_string());
        reg.register(id(1, 12), "a.txt".to_string());
        reg.register(id(1, 11), "b.txt".to_string());

        assert_eq!(reg.forget("a.txt"), 2);
        assert_eq!(reg.len(), 1);
        assert!(reg.resolve(&id(1, 10)).is_err());
        assert_eq!(reg.forget("a.txt"), 0);
    }

    #[test]
    fn no_capacity_limit() {
        let mut reg = Registry::new();
        for ino in 0..1_000 {
            reg.register(id(7, ino), format!("f{}", ino));
        }
        assert_eq!(reg.len(), 1_000);
        assert_eq!(reg.resolve(&id(7, 999)).unwrap(), "f999");
    }

    #[cfg(unix)]
    #[test]
    fn identity_of_same_file_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"x").unwrap();

        let a = File::open(&path).unwrap();
        let b = File::open(&path).unwrap();
        assert_eq!(FileIdentity::of(&a).unwrap(), FileIdentity::of(&b).unwrap());

        let other = dir.path().join("y");
        std::fs::write(&other, b"y").unwrap();
        let c = File::open(&other).unwrap();
        assert_ne!(FileIdentity::of(&a).unwrap(), FileIdentity::of(&c).unwrap());
        assert_eq!(FileIdentity::of_path(&path).unwrap(), FileIdentity::of(&a).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn hard_links_share_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"x").unwrap();
        std::fs::hard_link(&path, dir.path().join("alias")).unwrap();

        assert_eq!(
            FileIdentity::of_path(&path).unwrap(),
            FileIdentity::of_path(dir.path().join("alias")).unwrap()
        );
    }
}
