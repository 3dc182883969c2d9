//! Content fingerprints
//!
//! Cryptographic digests used for cache change detection and for backup
//! integrity checks. Large inputs (archives) are hashed through a fixed-size
//! buffer so they never have to fit in memory.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::warn;

const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Blake3,
}

/// Preference order used when the requested algorithm cannot be resolved.
const FALLBACK_CHAIN: &[HashAlgorithm] = &[HashAlgorithm::Sha256, HashAlgorithm::Blake3];

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Parse an identifier, returning `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }

    /// Whether this build can compute the algorithm.
    pub fn is_available(&self) -> bool {
        true
    }

    /// Resolve a requested identifier to a usable algorithm. Never fails.
    pub fn select(requested: &str) -> Self {
        if let Some(algorithm) = Self::parse(requested).filter(|a| a.is_available()) {
            return algorithm;
        }
        let fallback = FALLBACK_CHAIN
            .iter()
            .copied()
            .find(|a| a.is_available())
            .unwrap_or(HashAlgorithm::Sha256);
        warn!(
            requested,
            fallback = fallback.as_str(),
            "Hash algorithm unavailable, falling back"
        );
        fallback
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental hasher over any supported algorithm.
pub enum ContentHasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => ContentHasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => ContentHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Sha256(h) => h.update(data),
            ContentHasher::Sha512(h) => h.update(data),
            ContentHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Sha256(h) => hex::encode(h.finalize()),
            ContentHasher::Sha512(h) => hex::encode(h.finalize()),
            ContentHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Hash an in-memory buffer.
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Hash everything a reader yields, one buffer at a time.
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut hasher = ContentHasher::new(algorithm);
    let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Hash a file from disk without loading it fully.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let file = File::open(path)?;
    hash_reader(file, algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_known_sha256_digest() {
        assert_eq!(
            hash_bytes(b"abc", HashAlgorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_streaming_matches_in_memory() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Sha512, HashAlgorithm::Blake3] {
            let streamed = hash_reader(Cursor::new(&data), algorithm).unwrap();
            assert_eq!(streamed, hash_bytes(&data, algorithm), "{}", algorithm);
        }
    }

    #[test]
    fn test_hash_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            hash_file(&path, HashAlgorithm::Blake3).unwrap(),
            hash_bytes(b"hello", HashAlgorithm::Blake3)
        );
    }

    #[test]
    fn test_select_falls_back_for_unknown() {
        assert_eq!(HashAlgorithm::select("blake3"), HashAlgorithm::Blake3);
        assert_eq!(HashAlgorithm::select("SHA-256"), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::select("md4"), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::select(""), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_algorithms_differ() {
        assert_ne!(
            hash_bytes(b"x", HashAlgorithm::Sha256),
            hash_bytes(b"x", HashAlgorithm::Blake3)
        );
    }
}
