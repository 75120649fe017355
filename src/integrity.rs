use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
    Sha512,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Algorithm::Sha256),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            64 => Some(Algorithm::Sha256),
            128 => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    pub fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            Algorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

/// A declared or computed checksum: algorithm plus raw digest bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integrity {
    pub algorithm: Algorithm,
    pub digest: Vec<u8>,
}

impl Integrity {
    pub fn compute(algorithm: Algorithm, bytes: &[u8]) -> Self {
        Self { algorithm, digest: algorithm.digest(bytes) }
    }

    /// Accepts SRI (`sha512-BASE64`), cache-key prefixed hex (`10c0/HEX`) and
    /// bare hex where the length picks the algorithm.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty checksum".into());
        }
        if let Some((algo, b64)) = raw.split_once('-') {
            if let Some(algorithm) = Algorithm::from_name(algo) {
                let digest =
                    STANDARD.decode(b64).map_err(|e| format!("decode {algo} base64: {e}"))?;
                if digest.len() != algorithm.digest(&[]).len() {
                    return Err(format!("{algo} digest has wrong length {}", digest.len()));
                }
                return Ok(Self { algorithm, digest });
            }
            if algo.chars().all(|c| c.is_ascii_alphanumeric()) && !is_hex(raw) {
                return Err(format!("unsupported checksum algorithm '{algo}'"));
            }
        }
        let hex_part = match raw.rsplit_once('/') {
            Some((_cache_key, hex_part)) => hex_part,
            None => raw,
        };
        let algorithm = Algorithm::from_hex_len(hex_part.len())
            .ok_or_else(|| format!("checksum '{raw}' has unrecognised length"))?;
        let digest = hex::decode(hex_part).map_err(|e| format!("decode checksum hex: {e}"))?;
        Ok(Self { algorithm, digest })
    }

    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.algorithm.digest(bytes) == self.digest
    }

    pub fn hex(&self) -> String {
        hex::encode(&self.digest)
    }

    pub fn to_sri(&self) -> String {
        format!("{}-{}", self.algorithm.as_str(), STANDARD.encode(&self.digest))
    }
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sri())
    }
}

impl Serialize for Integrity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_sri())
    }
}
