//! Content hashing with SHA-256 (default, matches `sha256sum`) or BLAKE3.
//!
//! Files are streamed through a fixed buffer; the whole file is never held in
//! memory just to digest it.

use crate::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for streaming reads (64KB)
const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

/// Digest provider used by enrollment and by every check.
pub trait ContentHasher {
    /// Digest the file at `path`. Fails with [`SentinelError::Unreadable`]
    /// when the file cannot be opened or read.
    fn hash_file(&self, path: &Path) -> Result<String>;

    /// Digest an in-memory buffer with the same algorithm.
    fn hash_bytes(&self, data: &[u8]) -> String;

    fn algorithm(&self) -> HashAlgorithm;
}

#[derive(Debug, Clone, Default)]
pub struct Hasher {
    algorithm: HashAlgorithm,
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    fn hash_sha256_stream<R: Read>(reader: &mut R) -> std::io::Result<String> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            match reader.read(&mut buffer)? {
                0 => break,
                n => hasher.update(&buffer[..n]),
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn hash_blake3_stream<R: Read>(reader: &mut R) -> std::io::Result<String> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            match reader.read(&mut buffer)? {
                0 => break,
                n => {
                    hasher.update(&buffer[..n]);
                }
            }
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl ContentHasher for Hasher {
    fn hash_file(&self, path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| SentinelError::unreadable(path, e))?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let digest = match self.algorithm {
            HashAlgorithm::Sha256 => Self::hash_sha256_stream(&mut reader),
            HashAlgorithm::Blake3 => Self::hash_blake3_stream(&mut reader),
        };
        digest.map_err(|e| SentinelError::unreadable(path, e))
    }

    fn hash_bytes(&self, data: &[u8]) -> String {
        match self.algorithm {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn sha256_matches_known_vector() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        let hasher = Hasher::new(HashAlgorithm::Sha256);
        let digest = hasher.hash_file(file.path()).unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn file_and_buffer_digests_agree() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
            let hasher = Hasher::new(algorithm);
            assert_eq!(
                hasher.hash_file(file.path()).unwrap(),
                hasher.hash_bytes(b"test content")
            );
        }
    }

    #[test]
    fn blake3_vs_sha256() {
        let sha = Hasher::new(HashAlgorithm::Sha256).hash_bytes(b"x");
        let blake = Hasher::new(HashAlgorithm::Blake3).hash_bytes(b"x");
        assert_ne!(sha, blake);
        assert_eq!(sha.len(), 64);
        assert_eq!(blake.len(), 64);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = Hasher::default()
            .hash_file(&dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, SentinelError::Unreadable { .. }));
    }
}
