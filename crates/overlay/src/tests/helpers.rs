use crate::*;
use std::fs;
use std::path::Path;

pub fn overlay(root: &Path) -> SecureFs {
    SecureFs::new(&OverlayConfig::new(root).with_sync(false)).unwrap()
}

/// Writes `content` directly, bypassing the overlay.
pub fn tamper(root: &Path, name: &str, content: &[u8]) {
    fs::write(root.join(name), content).unwrap();
}

/// Flips one bit at `offset`, bypassing the overlay.
pub fn flip_bit(root: &Path, name: &str, offset: usize) {
    let path = root.join(name);
    let mut bytes = fs::read(&path).unwrap();
    bytes[offset] ^= 0x01;
    fs::write(&path, bytes).unwrap();
}

pub fn sealed_root(fs: &SecureFs, name: &str) -> Option<Digest> {
    fs.integrity_store().lookup(name).unwrap()
}

pub fn sealed_size(fs: &SecureFs, name: &str) -> Option<u64> {
    fs.size_store().lookup(name).unwrap()
}
