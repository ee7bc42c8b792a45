//! Content fingerprinting.
//!
//! A [`Fingerprint`] is the lowercase hex SHA-256 of a file's full contents.
//! Two files with equal fingerprints are treated as byte-identical.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{WardenError, WardenResult};

/// Size of each read while hashing.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Fixed-length hex content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes everything `reader` yields.
///
/// The digest is only finalized once the reader reports end of stream, so a
/// read error never produces a fingerprint.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Fingerprints the file at `path`.
pub fn digest(path: &Path) -> WardenResult<Fingerprint> {
    let file = File::open(path).map_err(|e| WardenError::read(path, e))?;
    digest_reader(file).map_err(|e| WardenError::read(path, e))
}
