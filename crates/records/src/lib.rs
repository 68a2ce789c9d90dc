//! # Records - Persistent Integrity and Size Tables
//!
//! Flat, header-less tables of `(name, value)` records used by SealFS to
//! remember the last-known-good Merkle root ([`IntegrityStore`]) and the
//! logical size ([`SizeStore`]) of every tracked file.
//!
//! ## Record Format
//!
//! ```text
//! [crc32: u32 LE][name_len: u16 LE][name bytes][value]
//! ```
//!
//! | Table       | Value                          |
//! |-------------|--------------------------------|
//! | `INTEGRITY` | root digest, 20 raw bytes      |
//! | `SIZES`     | logical size, `u64` LE         |
//!
//! The end of the table is the end of the file; there is no count header.
//!
//! ## Rewrite-and-Swap
//!
//! Tables are never edited in place. Every mutation reads the whole table,
//! writes the new image to `<table>.tmp`, fsyncs it, and renames it over the
//! table. A crash before the rename leaves the old table, a crash after it
//! leaves the new one. Because a table is only ever replaced whole, a short
//! or checksum-failing record is reported as [`StoreError::Corrupt`] rather
//! than skipped.
//!
//! ## Example
//!
//! ```rust,no_run
//! use records::SizeStore;
//!
//! let sizes = SizeStore::open("SIZES", true);
//! sizes.upsert("notes.txt", 42).unwrap();
//! assert_eq!(sizes.lookup("notes.txt").unwrap(), Some(42));
//! ```

mod format;

pub use format::{validate_name, RecordValue, Records, MAX_NAME_LEN};

use format::encode_record;
use merkle::Digest;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Maps a tracked file name to its last-known-good root digest.
pub type IntegrityStore = RecordTable<Digest>;

/// Maps a tracked file name to its logical size in bytes.
pub type SizeStore = RecordTable<u64>;

/// Errors raised by record tables.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O error while reading or rewriting the table.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The table image contains a malformed record.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: &'static str },

    /// The name cannot be stored in a record.
    #[error("invalid record name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// A persistent table holding at most one `V` per name.
///
/// The table keeps no in-memory state besides its path: every call reads the
/// file, so the table on disk is the single source of truth.
#[derive(Debug, Clone)]
pub struct RecordTable<V> {
    path: PathBuf,
    tmp_path: PathBuf,
    sync: bool,
    _value: PhantomData<V>,
}

impl<V: RecordValue> RecordTable<V> {
    /// Binds a table to `path`. A missing file is an empty table.
    ///
    /// When `sync` is `true` every rewrite is fsynced before the swap.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Self {
        let path = path.as_ref().to_path_buf();
        let tmp_path = path.with_extension("tmp");
        Self {
            path,
            tmp_path,
            sync,
            _value: PhantomData,
        }
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record in file order.
    pub fn entries(&self) -> Result<Vec<(String, V)>, StoreError> {
        let image = self.read_image()?;
        Records::<V>::new(&image).collect()
    }

    /// Linear scan from the start of the table, returning the first match.
    pub fn lookup(&self, name: &str) -> Result<Option<V>, StoreError> {
        let image = self.read_image()?;
        for record in Records::<V>::new(&image) {
            let (n, v) = record?;
            if n == name {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    /// Number of records in the table.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Replaces the record for `name`, or appends one if absent.
    ///
    /// All other records are rewritten in their original order and the new
    /// record goes last.
    pub fn upsert(&self, name: &str, value: V) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut entries = self.entries()?;
        entries.retain(|(n, _)| n != name);
        entries.push((name.to_string(), value));
        self.rewrite(&entries)?;
        debug!(table = %self.path.display(), name, "record upserted");
        Ok(())
    }

    /// Drops the record for `name`. Returns `false` (without rewriting) when
    /// there was none.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|(n, _)| n != name);
        if entries.len() == before {
            return Ok(false);
        }
        self.rewrite(&entries)?;
        debug!(table = %self.path.display(), name, "record removed");
        Ok(true)
    }

    /// Drops every record for which `keep` returns `false`, in a single
    /// rewrite. Returns the dropped names in table order.
    pub fn compact<F>(&self, mut keep: F) -> Result<Vec<String>, StoreError>
    where
        F: FnMut(&str, &V) -> bool,
    {
        let entries = self.entries()?;
        let mut kept = Vec::with_capacity(entries.len());
        let mut dropped = Vec::new();
        for (name, value) in entries {
            if keep(&name, &value) {
                kept.push((name, value));
            } else {
                dropped.push(name);
            }
        }
        if !dropped.is_empty() {
            self.rewrite(&kept)?;
            debug!(
                table = %self.path.display(),
                dropped = dropped.len(),
                kept = kept.len(),
                "table compacted"
            );
        }
        Ok(dropped)
    }

    /// Removes a `.tmp` image left behind by an interrupted rewrite.
    pub fn cleanup_tmp(&self) -> Result<bool, StoreError> {
        match fs::remove_file(&self.tmp_path) {
            Ok(()) => {
                debug!(tmp = %self.tmp_path.display(), "removed stale table image");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_image(&self) -> Result<Vec<u8>, StoreError> {
        match fs::read(&self.path) {
            Ok(image) => Ok(image),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `entries` to the tmp image and swaps it over the table.
    ///
    /// The rename only happens after the image is fully written and flushed,
    /// so a failed rewrite leaves the current table untouched.
    fn rewrite(&self, entries: &[(String, V)]) -> Result<(), StoreError> {
        let mut image = Vec::with_capacity(entries.len() * (32 + V::WIDTH));
        for (name, value) in entries {
            encode_record(&mut image, name, value);
        }

        {
            let raw = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.tmp_path)?;
            let mut file = BufWriter::new(raw);
            file.write_all(&image)?;
            file.flush()?;
            let raw = file.into_inner().map_err(|e| e.into_error())?;
            if self.sync {
                raw.sync_all()?;
            }
        }

        fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }
}
