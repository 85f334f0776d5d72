// src/hash.rs

//! MD5 digests for artifact integrity checks
//!
//! Release manifests and IMS image manifests both carry MD5 sums, so that is
//! the only algorithm here. Files are streamed through the hasher rather than
//! read into memory; rootfs images run to several gigabytes.

use md5::{Digest, Md5};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer for streaming digests (1 MiB)
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Compute the MD5 of everything a reader yields, as lowercase hex
pub fn md5_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the MD5 of a file's contents
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    md5_reader(&mut file)
}

/// Compute the MD5 of a byte slice
#[inline]
pub fn md5_bytes(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Digest mismatch reported by [`verify_file_md5`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "md5 mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for VerifyError {}

/// Verify a file against an expected MD5 (hex, any case)
///
/// The outer `io::Result` carries read failures; the inner result carries
/// the comparison outcome.
pub fn verify_file_md5(path: &Path, expected: &str) -> io::Result<Result<(), VerifyError>> {
    let actual = md5_file(path)?;
    if actual == expected.to_lowercase() {
        Ok(Ok(()))
    } else {
        Ok(Err(VerifyError {
            expected: expected.to_string(),
            actual,
        }))
    }
}
