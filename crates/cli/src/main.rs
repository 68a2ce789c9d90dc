//! # CLI - SealFS Interactive Shell
//!
//! A REPL-style front end for the SealFS overlay. Reads commands from stdin,
//! runs them against a [`SecureFs`] rooted at `SEALFS_ROOT`, and prints results
//! to stdout. Logs go to stderr so the protocol on stdout stays scriptable.
//!
//! ## Commands
//!
//! ```text
//! OPEN name [modes...]           Open through the overlay, prints "fd N"
//!                                modes: r w a c t (combinable, e.g. "rw c")
//! WRITE fd text                  Write text at the handle's offset
//! READ fd n                      Read up to n bytes (at most 64 KiB)
//! SEEK fd (start|cur|end) off    Move the offset (end = logical size)
//! CLOSE fd                       Release a handle
//! STATUS name                    untracked | verified | tampered | missing
//! LIST                           Tracked files with size and root
//! SWEEP                          Re-run the integrity sweep
//! EXIT / QUIT                    Close all handles and exit
//! ```
//!
//! ## Configuration
//!
//! ```text
//! SEALFS_ROOT        overlay root directory        (default: ".")
//! SEALFS_READ_VERIFY verify before every read      (default: "true")
//! SEALFS_SYNC        fsync table rewrites          (default: "true")
//! SEALFS_LOG         tracing filter                (default: "warn")
//! SEALFS_LOG_FORMAT  "text" or "json"              (default: "text")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ SEALFS_ROOT=/tmp/sealed cargo run -p cli
//! SealFS started (root=/tmp/sealed, read_policy=Verify, sync=true)
//! sweep: clean (verified=0, pruned=0)
//! > OPEN notes.txt rw c
//! fd 1
//! > WRITE 1 hello
//! OK (5 bytes)
//! > SEEK 1 start 0
//! OK pos=0
//! > READ 1 5
//! hello
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use config::OverlayConfig;
use overlay::{FaultStatus, FileStatus, OpenFlags, SecureFile, SecureFs, SweepReport};
use std::collections::BTreeMap;
use std::io::{self, BufRead, SeekFrom, Write};
use tracing::warn;

const ENV_LOG: &str = "SEALFS_LOG";
const ENV_LOG_FORMAT: &str = "SEALFS_LOG_FORMAT";

/// Largest buffer a single READ allocates; larger requests are clamped.
const MAX_READ: usize = 64 * 1024;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));

    if env_or(ENV_LOG_FORMAT, "text").eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
    }
}

/// Parses OPEN mode tokens. No tokens means read-only; `c` and `t` imply
/// write access.
fn parse_flags<'a>(modes: impl Iterator<Item = &'a str>) -> Option<OpenFlags> {
    let mut flags = OpenFlags::default();
    for token in modes {
        for c in token.chars() {
            match c.to_ascii_lowercase() {
                'r' => flags.read = true,
                'w' => flags.write = true,
                'a' => flags.append = true,
                'c' => flags.create = true,
                't' => flags.truncate = true,
                _ => return None,
            }
        }
    }
    if !(flags.read || flags.write || flags.append) {
        flags.read = true;
    }
    if (flags.create || flags.truncate) && !(flags.write || flags.append) {
        flags.write = true;
    }
    Some(flags)
}

fn parse_seek(whence: &str, offset: &str) -> Option<SeekFrom> {
    match whence.to_ascii_lowercase().as_str() {
        "start" => offset.parse().ok().map(SeekFrom::Start),
        "cur" => offset.parse().ok().map(SeekFrom::Current),
        "end" => offset.parse().ok().map(SeekFrom::End),
        _ => None,
    }
}

fn summarize(report: &SweepReport) -> String {
    match report.status {
        FaultStatus::Clean => format!(
            "sweep: clean (verified={}, pruned={})",
            report.verified.len(),
            report.pruned.len()
        ),
        FaultStatus::Faulted => format!(
            "sweep: FAULTED (tampered: {}; verified={}, pruned={})",
            report.tampered.join(", "),
            report.verified.len(),
            report.pruned.len()
        ),
    }
}

fn status_label(status: FileStatus) -> &'static str {
    match status {
        FileStatus::Untracked => "untracked",
        FileStatus::Verified => "verified",
        FileStatus::Tampered => "tampered",
        FileStatus::Missing => "missing",
    }
}

fn main() -> Result<()> {
    init_logging();

    let config = OverlayConfig::from_env();
    let (mut fs, report) = SecureFs::init(&config)?;

    println!(
        "SealFS started (root={}, read_policy={:?}, sync={})",
        config.root.display(),
        config.read_policy,
        config.sync
    );
    println!("{}", summarize(&report));
    println!("Commands: OPEN name [modes] | WRITE fd text | READ fd n | SEEK fd whence off");
    println!("          CLOSE fd | STATUS name | LIST | SWEEP | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let mut handles: BTreeMap<u64, SecureFile> = BTreeMap::new();
    let mut next_fd: u64 = 1;
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "OPEN" => match (parts.next(), parse_flags(&mut parts)) {
                    (Some(name), Some(flags)) => match fs.open(name, flags) {
                        Ok(handle) => {
                            handles.insert(next_fd, handle);
                            println!("fd {}", next_fd);
                            next_fd += 1;
                        }
                        Err(e) => println!("ERR open failed: {}", e),
                    },
                    (Some(_), None) => println!("ERR modes are r, w, a, c, t"),
                    (None, _) => println!("ERR usage: OPEN name [modes]"),
                },
                "WRITE" => {
                    let fd = parts.next().and_then(|s| s.parse::<u64>().ok());
                    let text = parts.collect::<Vec<&str>>().join(" ");
                    match fd {
                        Some(fd) if !text.is_empty() => match handles.get_mut(&fd) {
                            Some(handle) => match fs.write_all(handle, text.as_bytes()) {
                                Ok(()) => println!("OK ({} bytes)", text.len()),
                                Err(e) => println!("ERR write failed: {}", e),
                            },
                            None => println!("ERR unknown fd {}", fd),
                        },
                        _ => println!("ERR usage: WRITE fd text"),
                    }
                }
                "READ" => {
                    let fd = parts.next().and_then(|s| s.parse::<u64>().ok());
                    let n = parts.next().and_then(|s| s.parse::<usize>().ok());
                    match (fd, n) {
                        (Some(fd), Some(n)) => match handles.get_mut(&fd) {
                            Some(handle) => {
                                let mut buf = vec![0u8; n.min(MAX_READ)];
                                match fs.read(handle, &mut buf) {
                                    Ok(0) if n > 0 => println!("(eof)"),
                                    Ok(read) => {
                                        println!("{}", String::from_utf8_lossy(&buf[..read]))
                                    }
                                    Err(e) => println!("ERR read failed: {}", e),
                                }
                            }
                            None => println!("ERR unknown fd {}", fd),
                        },
                        _ => println!("ERR usage: READ fd n"),
                    }
                }
                "SEEK" => {
                    let fd = parts.next().and_then(|s| s.parse::<u64>().ok());
                    let pos = match (parts.next(), parts.next()) {
                        (Some(whence), Some(offset)) => parse_seek(whence, offset),
                        _ => None,
                    };
                    match (fd, pos) {
                        (Some(fd), Some(pos)) => match handles.get_mut(&fd) {
                            Some(handle) => match fs.seek(handle, pos) {
                                Ok(at) => println!("OK pos={}", at),
                                Err(e) => println!("ERR seek failed: {}", e),
                            },
                            None => println!("ERR unknown fd {}", fd),
                        },
                        _ => println!("ERR usage: SEEK fd (start|cur|end) offset"),
                    }
                }
                "CLOSE" => match parts.next().and_then(|s| s.parse::<u64>().ok()) {
                    Some(fd) => match handles.remove(&fd) {
                        Some(handle) => match fs.close(handle) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR close failed: {}", e),
                        },
                        None => println!("ERR unknown fd {}", fd),
                    },
                    None => println!("ERR usage: CLOSE fd"),
                },
                "STATUS" => match parts.next() {
                    Some(name) => match fs.status(name) {
                        Ok(status) => println!("{}", status_label(status)),
                        Err(e) => println!("ERR status failed: {}", e),
                    },
                    None => println!("ERR usage: STATUS name"),
                },
                "LIST" => match fs.tracked() {
                    Ok(files) => {
                        if files.is_empty() {
                            println!("(empty)");
                        } else {
                            for file in &files {
                                let size = file
                                    .size
                                    .map_or_else(|| "-".to_string(), |s| s.to_string());
                                println!("{} size={} root={}", file.name, size, file.root);
                            }
                            println!("({} files)", files.len());
                        }
                    }
                    Err(e) => println!("ERR list failed: {}", e),
                },
                "SWEEP" => match fs.sweep() {
                    Ok(report) => println!("{}", summarize(&report)),
                    Err(e) => println!("ERR sweep failed: {}", e),
                },
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    for (fd, handle) in std::mem::take(&mut handles) {
        if let Err(e) = fs.close(handle) {
            warn!(fd, error = %e, "close on exit failed");
        }
    }

    Ok(())
}
