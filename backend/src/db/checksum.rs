//! Checksums for uploaded files.

use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// Calculate the SHA-256 checksum of raw upload bytes.
///
/// # Returns
/// Hexadecimal string representation of the hash.
pub fn calculate_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Reader adapter that hashes every byte passing through it.
///
/// Lets an upload be checksummed in the same pass that parses it.
pub struct ChecksumReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Hex SHA-256 of everything read so far.
    pub fn checksum(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
