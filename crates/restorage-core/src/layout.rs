//! Deterministic key-to-path sharding.
//!
//! A key is hashed with SHA-256 and its hex digest split as
//! `root/hash[0:2]/hash[2:4]/hash[4:]`, giving 65,536 leaf directories. The
//! whole tree is created once when a store opens, so no later operation has to
//! create a directory on the hot path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use digest::Digest;
use tracing::{debug, info};

/// Name of the marker file written once every leaf directory exists.
pub const LAYOUT_MARKER: &str = ".layout-complete";

/// Number of distinct values for one two-hex-digit level.
const FANOUT: usize = 256;

/// Hex-encoded SHA-256 of `key`.
#[must_use]
pub fn sha256_hex(key: &str) -> String {
    hex::encode(sha2::Sha256::digest(key.as_bytes()))
}

/// Two-level sharded path for `key` under `root`, without any suffix.
///
/// # Examples
///
/// ```
/// use std::path::Path;
///
/// use restorage_core::layout::hash_path;
///
/// let p = hash_path(Path::new("/data"), "hello");
/// assert_eq!(
///     p,
///     Path::new("/data/2c/f2/4dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
/// );
/// ```
#[must_use]
pub fn hash_path(root: &Path, key: &str) -> PathBuf {
    let hash = sha256_hex(key);
    root.join(&hash[0..2]).join(&hash[2..4]).join(&hash[4..])
}

/// Append `suffix` to the file name of `path`.
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Create every leaf directory under `root` unless the marker says it is done.
///
/// Safe to call on a partially created tree: existing directories are left
/// alone and the marker is only written after the last one succeeds.
pub fn ensure_layout(root: &Path) -> io::Result<()> {
    fs::create_dir_all(root)?;

    let marker = root.join(LAYOUT_MARKER);
    if marker.exists() {
        debug!(root = %root.display(), "directory layout already present");
        return Ok(());
    }

    info!(root = %root.display(), "creating sharded directory layout");
    for first in 0..FANOUT {
        let level1 = root.join(format!("{first:02x}"));
        for second in 0..FANOUT {
            fs::create_dir_all(level1.join(format!("{second:02x}")))?;
        }
    }

    fs::write(&marker, b"")?;
    info!(
        root = %root.display(),
        directories = FANOUT * FANOUT,
        "directory layout complete"
    );
    Ok(())
}
