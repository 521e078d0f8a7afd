//! Content digests for stored objects.
//!
//! `compute_hash` never buffers an object: the payload stream is pumped
//! through a [`StreamingHasher`] in fixed-size chunks and only the final
//! digest is kept.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use digest::Digest;
use serde::{Deserialize, Serialize};

/// Chunk size used when draining a reader into a hasher.
const HASH_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// HashAlgorithm
// ---------------------------------------------------------------------------

/// Digest algorithms available to `compute_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5, 128-bit.
    #[default]
    Md5,
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`HashAlgorithm`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown hash algorithm: {0}")]
pub struct ParseHashAlgorithmError(String);

impl FromStr for HashAlgorithm {
    type Err = ParseHashAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(ParseHashAlgorithmError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingHasher
// ---------------------------------------------------------------------------

/// Incremental hasher over a stream of chunks.
///
/// # Examples
///
/// ```
/// use restorage_core::checksums::{HashAlgorithm, StreamingHasher};
///
/// let mut hasher = StreamingHasher::new(HashAlgorithm::Md5);
/// hasher.update(b"hel");
/// hasher.update(b"lo");
/// assert_eq!(hasher.finish(), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[derive(Debug)]
pub enum StreamingHasher {
    /// MD5 state.
    Md5(md5::Md5),
    /// SHA-256 state.
    Sha256(sha2::Sha256),
}

impl StreamingHasher {
    /// Create a hasher for `algorithm`.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(<md5::Md5 as Digest>::new()),
            HashAlgorithm::Sha256 => Self::Sha256(<sha2::Sha256 as Digest>::new()),
        }
    }

    /// Feed more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => Digest::update(h, data),
            Self::Sha256(h) => Digest::update(h, data),
        }
    }

    /// Consume the hasher and return the lowercase hex digest.
    #[must_use]
    pub fn finish(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Drain `reader` through a hasher and return the hex digest.
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, mut reader: R) -> io::Result<String> {
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Hex digest of an in-memory buffer.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = StreamingHasher::new(algorithm);
    hasher.update(data);
    hasher.finish()
}
