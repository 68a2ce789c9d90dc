use super::helpers::*;
use crate::*;
use anyhow::Result;
use merkle::root_of;
use std::fs;
use std::io;
use tempfile::tempdir;

// --------------------- Registration ---------------------

#[test]
fn first_open_registers_existing_file() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "notes.txt", b"hello");
    let mut fs = overlay(dir.path());

    let f = fs.open("notes.txt", OpenFlags::read_only())?;
    fs.close(f)?;

    assert_eq!(sealed_root(&fs, "notes.txt"), root_of(b"hello"));
    assert_eq!(sealed_size(&fs, "notes.txt"), Some(5));
    assert_eq!(fs.integrity_store().len()?, 1);
    assert_eq!(fs.size_store().len()?, 1);
    Ok(())
}

#[test]
fn reopen_does_not_duplicate_records() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "a", b"alpha");
    let mut fs = overlay(dir.path());

    for _ in 0..3 {
        let f = fs.open("a", OpenFlags::read_only())?;
        fs.close(f)?;
    }

    assert_eq!(fs.integrity_store().len()?, 1);
    assert_eq!(fs.size_store().len()?, 1);
    Ok(())
}

#[test]
fn records_survive_a_new_overlay_instance() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "a", b"persisted");
    {
        let mut fs = overlay(dir.path());
        let f = fs.open("a", OpenFlags::read_only())?;
        fs.close(f)?;
    }

    let mut fs = overlay(dir.path());
    assert_eq!(sealed_root(&fs, "a"), root_of(b"persisted"));
    let f = fs.open("a", OpenFlags::read_only())?;
    fs.close(f)?;
    Ok(())
}

#[test]
fn creating_a_new_file_leaves_it_untracked() -> Result<()> {
    let dir = tempdir()?;
    let mut fs = overlay(dir.path());

    let f = fs.open("fresh", OpenFlags::read_write().create(true))?;
    fs.close(f)?;

    assert!(dir.path().join("fresh").exists());
    assert_eq!(sealed_root(&fs, "fresh"), None);
    assert_eq!(fs.status("fresh")?, FileStatus::Untracked);
    Ok(())
}

// --------------------- Tamper detection ---------------------

#[test]
fn out_of_band_change_rejects_open() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "a", b"original");
    let mut fs = overlay(dir.path());
    let f = fs.open("a", OpenFlags::read_only())?;
    fs.close(f)?;

    tamper(dir.path(), "a", b"modified");

    let err = fs.open("a", OpenFlags::read_only()).unwrap_err();
    assert!(err.is_tamper(), "expected tamper, got {err:?}");
    assert_eq!(sealed_root(&fs, "a"), root_of(b"original"));
    assert_eq!(fs.registry().len(), 1, "rejected open must not register");
    Ok(())
}

#[test]
fn single_bit_flip_in_zero_file_is_detected() -> Result<()> {
    let dir = tempdir()?;
    let mut fs = overlay(dir.path());

    let mut f = fs.open("zeros", OpenFlags::read_write().create(true))?;
    fs.write_all(&mut f, &[0u8; 10])?;
    fs.close(f)?;
    assert_eq!(sealed_size(&fs, "zeros"), Some(10));

    flip_bit(dir.path(), "zeros", 3);

    let err = fs.open("zeros", OpenFlags::read_only()).unwrap_err();
    assert!(matches!(err, OverlayError::TamperDetected { ref name } if name == "zeros"));
    Ok(())
}

#[test]
fn bit_flip_in_last_block_is_detected() -> Result<()> {
    let dir = tempdir()?;
    let content: Vec<u8> = (0..200u8).collect();
    tamper(dir.path(), "big", &content);
    let mut fs = overlay(dir.path());
    let f = fs.open("big", OpenFlags::read_only())?;
    fs.close(f)?;

    flip_bit(dir.path(), "big", 199);

    assert!(fs.open("big", OpenFlags::read_only()).unwrap_err().is_tamper());
    Ok(())
}

#[test]
fn emptied_tracked_file_is_tampered() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "a", b"content");
    let mut fs = overlay(dir.path());
    let f = fs.open("a", OpenFlags::read_only())?;
    fs.close(f)?;

    tamper(dir.path(), "a", b"");

    assert_eq!(fs.status("a")?, FileStatus::Tampered);
    assert!(fs.open("a", OpenFlags::read_only()).unwrap_err().is_tamper());
    Ok(())
}

// --------------------- Missing files ---------------------

#[test]
fn missing_file_drops_stale_records() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "gone", b"soon deleted");
    let mut fs = overlay(dir.path());
    let f = fs.open("gone", OpenFlags::read_only())?;
    fs.close(f)?;

    fs::remove_file(dir.path().join("gone"))?;
    assert_eq!(fs.status("gone")?, FileStatus::Missing);

    let err = fs.open("gone", OpenFlags::read_only()).unwrap_err();
    assert!(matches!(err, OverlayError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    assert_eq!(sealed_root(&fs, "gone"), None);
    assert_eq!(sealed_size(&fs, "gone"), None);
    assert_eq!(fs.registry().len(), 0);
    Ok(())
}

#[test]
fn recreating_a_missing_file_starts_untracked() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "gone", b"old");
    let mut fs = overlay(dir.path());
    let f = fs.open("gone", OpenFlags::read_only())?;
    fs.close(f)?;
    fs::remove_file(dir.path().join("gone"))?;

    let mut f = fs.open("gone", OpenFlags::read_write().create(true))?;
    assert_eq!(sealed_root(&fs, "gone"), None);
    fs.write_all(&mut f, b"new")?;
    fs.close(f)?;

    assert_eq!(sealed_root(&fs, "gone"), root_of(b"new"));
    Ok(())
}

// --------------------- Truncate ---------------------

#[test]
fn truncate_on_open_drops_records() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "t", b"to be truncated");
    let mut fs = overlay(dir.path());
    let f = fs.open("t", OpenFlags::read_only())?;
    fs.close(f)?;
    assert!(sealed_root(&fs, "t").is_some());

    let f = fs.open("t", OpenFlags::read_write().truncate(true))?;
    fs.close(f)?;

    assert_eq!(fs::metadata(dir.path().join("t"))?.len(), 0);
    assert_eq!(sealed_root(&fs, "t"), None);
    assert_eq!(sealed_size(&fs, "t"), None);
    assert_eq!(fs.status("t")?, FileStatus::Untracked);
    Ok(())
}

#[test]
fn truncate_still_verifies_before_opening() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "t", b"sealed");
    let mut fs = overlay(dir.path());
    let f = fs.open("t", OpenFlags::read_only())?;
    fs.close(f)?;
    tamper(dir.path(), "t", b"forged");

    let err = fs
        .open("t", OpenFlags::read_write().truncate(true))
        .unwrap_err();
    assert!(err.is_tamper());
    assert_eq!(fs::read(dir.path().join("t"))?, b"forged");
    Ok(())
}

// --------------------- Names ---------------------

#[test]
fn invalid_names_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut fs = overlay(dir.path());
    let long = "x".repeat(256);

    for name in ["", ".", "..", "a/b", "a\\b", "nul\0", long.as_str()] {
        let err = fs
            .open(name, OpenFlags::read_write().create(true))
            .unwrap_err();
        assert!(
            matches!(err, OverlayError::InvalidName { .. }),
            "{name:?} should be rejected, got {err:?}"
        );
    }
    Ok(())
}

#[test]
fn metadata_tables_cannot_be_opened() -> Result<()> {
    let dir = tempdir()?;
    let mut fs = overlay(dir.path());

    for name in [INTEGRITY_FILENAME, SIZES_FILENAME, "INTEGRITY.tmp", "SIZES.tmp"] {
        let err = fs.open(name, OpenFlags::read_only()).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidName { .. }));
    }
    Ok(())
}

#[test]
fn max_length_name_is_accepted() -> Result<()> {
    let dir = tempdir()?;
    let mut fs = overlay(dir.path());
    let name = "n".repeat(255);

    let mut f = fs.open(&name, OpenFlags::read_write().create(true))?;
    fs.write_all(&mut f, b"data")?;
    fs.close(f)?;

    assert_eq!(sealed_size(&fs, &name), Some(4));
    Ok(())
}

#[test]
fn new_removes_leftover_table_images() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("INTEGRITY.tmp"), b"partial")?;
    fs::write(dir.path().join("SIZES.tmp"), b"partial")?;

    let _fs = overlay(dir.path());

    assert!(!dir.path().join("INTEGRITY.tmp").exists());
    assert!(!dir.path().join("SIZES.tmp").exists());
    Ok(())
}

// --------------------- Hard links ---------------------

#[cfg(unix)]
#[test]
fn hard_link_alias_is_refused() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "a", b"shared inode");
    fs::hard_link(dir.path().join("a"), dir.path().join("b"))?;
    let mut fs = overlay(dir.path());

    let mut f = fs.open("a", OpenFlags::read_write())?;
    let err = fs.open("b", OpenFlags::read_write()).unwrap_err();
    assert!(
        matches!(err, OverlayError::AliasedName { ref name, ref registered } if name == "b" && registered == "a"),
        "got {err:?}"
    );
    assert_eq!(sealed_root(&fs, "b"), None, "refused alias must not be sealed");

    fs.write_all(&mut f, b"!")?;
    fs.close(f)?;
    assert_eq!(fs.status("a")?, FileStatus::Verified);
    assert_eq!(fs.status("b")?, FileStatus::Untracked);
    assert_eq!(fs.tracked()?.len(), 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn reopening_the_registered_name_is_not_an_alias() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "a", b"one name");
    fs::hard_link(dir.path().join("a"), dir.path().join("b"))?;
    let mut fs = overlay(dir.path());

    let first = fs.open("a", OpenFlags::read_only())?;
    let second = fs.open("a", OpenFlags::read_only())?;
    fs.close(first)?;
    fs.close(second)?;
    Ok(())
}

#[cfg(unix)]
#[test]
fn stale_registration_after_unlink_is_replaced() -> Result<()> {
    let dir = tempdir()?;
    tamper(dir.path(), "a", b"moved");
    fs::hard_link(dir.path().join("a"), dir.path().join("b"))?;
    let mut fs = overlay(dir.path());
    let f = fs.open("a", OpenFlags::read_only())?;
    fs.close(f)?;

    // "a" no longer links to the inode, so "b" is the only name left for it.
    fs::remove_file(dir.path().join("a"))?;
    let f = fs.open("b", OpenFlags::read_only())?;
    assert_eq!(fs.registry().resolve(&f.identity())?, "b");
    fs.close(f)?;
    Ok(())
}
