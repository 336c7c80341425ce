//! Typed content checksums in the `<ALGO>:<hex>` wire form used by the
//! remote storage service (e.g. `SHA256:9f86d0…`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Checksum algorithm supported for transfer validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgo {
    /// MD5 (legacy servers)
    Md5,
    /// SHA-1 (legacy servers)
    Sha1,
    /// SHA-256
    Sha256,
}

impl ChecksumAlgo {
    /// Wire-form algorithm tag (`MD5`, `SHA1`, `SHA256`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgo::Md5 => "MD5",
            ChecksumAlgo::Sha1 => "SHA1",
            ChecksumAlgo::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for ChecksumAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expected content checksum, parsed from the `<ALGO>:<hex>` wire form.
///
/// The hex digest is stored lowercased so comparisons are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    algo: ChecksumAlgo,
    hex: String,
}

impl Checksum {
    /// Parse a checksum from its wire form, e.g. `"MD5:d41d8cd98f00b204e9800998ecf8427e"`.
    pub fn parse(value: &str) -> Result<Self, Error> {
        let (algo, hex) = value
            .split_once(':')
            .ok_or_else(|| Error::InvalidChecksum(value.to_string()))?;
        let algo = match algo {
            "MD5" => ChecksumAlgo::Md5,
            "SHA1" => ChecksumAlgo::Sha1,
            "SHA256" => ChecksumAlgo::Sha256,
            _ => return Err(Error::InvalidChecksum(value.to_string())),
        };
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidChecksum(value.to_string()));
        }
        Ok(Self {
            algo,
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// Compute the checksum of `data` with the given algorithm.
    pub fn of(algo: ChecksumAlgo, data: &[u8]) -> Self {
        let mut hasher = ChecksumHasher::new(algo);
        hasher.update(data);
        Self {
            algo,
            hex: hasher.finish(),
        }
    }

    /// The algorithm this checksum uses.
    pub fn algo(&self) -> ChecksumAlgo {
        self.algo
    }

    /// The lowercase hex digest.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether `data` hashes to this checksum.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::of(self.algo, data) == *self
    }

    /// Start a streaming hasher for this checksum's algorithm.
    pub fn hasher(&self) -> ChecksumHasher {
        ChecksumHasher::new(self.algo)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algo, self.hex)
    }
}

impl TryFrom<String> for Checksum {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_string()
    }
}

/// Incremental hasher used to validate content while it streams to disk.
pub struct ChecksumHasher {
    inner: HasherInner,
}

enum HasherInner {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl ChecksumHasher {
    /// Create a hasher for the given algorithm.
    pub fn new(algo: ChecksumAlgo) -> Self {
        use sha1::Digest as _;
        let inner = match algo {
            ChecksumAlgo::Md5 => HasherInner::Md5(md5::Context::new()),
            ChecksumAlgo::Sha1 => HasherInner::Sha1(sha1::Sha1::new()),
            ChecksumAlgo::Sha256 => HasherInner::Sha256(sha2::Sha256::new()),
        };
        Self { inner }
    }

    /// Feed a chunk of content.
    pub fn update(&mut self, data: &[u8]) {
        use sha1::Digest as _;
        match &mut self.inner {
            HasherInner::Md5(ctx) => ctx.consume(data),
            HasherInner::Sha1(h) => h.update(data),
            HasherInner::Sha256(h) => h.update(data),
        }
    }

    /// Finish hashing and return the lowercase hex digest.
    pub fn finish(self) -> String {
        use sha1::Digest as _;
        match self.inner {
            HasherInner::Md5(ctx) => format!("{:x}", ctx.compute()),
            HasherInner::Sha1(h) => to_hex(&h.finalize()),
            HasherInner::Sha256(h) => to_hex(&h.finalize()),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use fmt::Write as _;
        let _ = write!(out, "{b:02x}");
    }
    out
}
