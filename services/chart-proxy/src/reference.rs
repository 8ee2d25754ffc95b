//! Manifest references: tags and content digests

use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256};

use crate::error::RegistryError;

/// A content digest such as `sha256:<hex>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    /// The SHA-256 digest of `data`
    pub fn sha256(data: &[u8]) -> Self {
        Self {
            algorithm: "sha256".into(),
            encoded: hex::encode(Sha256::digest(data)),
        }
    }

    /// The hash algorithm, e.g. `sha256`
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The encoded hash value
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((algorithm, encoded)) if !algorithm.is_empty() && !encoded.is_empty() => {
                Ok(Self {
                    algorithm: algorithm.to_owned(),
                    encoded: encoded.to_owned(),
                })
            }
            _ => Err(RegistryError::InvalidParams(format!("invalid digest: {s}"))),
        }
    }
}

/// Selects one manifest within a repository.
///
/// Tags and digests share a keyspace per repository. Tags may not contain `:`,
/// so anything with a colon is parsed as a digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reference {
    /// A human readable, mutable label like `1.0.0`
    Tag(String),
    /// An immutable content digest
    Digest(Digest),
}

impl Reference {
    /// The tag name, if this is a tag
    pub fn as_tag(&self) -> Option<&str> {
        match self {
            Reference::Tag(tag) => Some(tag),
            Reference::Digest(_) => None,
        }
    }

    /// True if this reference is a content digest
    pub fn is_digest(&self) -> bool {
        matches!(self, Reference::Digest(_))
    }
}

impl From<Digest> for Reference {
    fn from(digest: Digest) -> Self {
        Reference::Digest(digest)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Tag(tag) => f.write_str(tag),
            Reference::Digest(digest) => digest.fmt(f),
        }
    }
}

impl FromStr for Reference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RegistryError::InvalidParams("No reference specified".into()));
        }

        if s.contains(':') {
            s.parse().map(Reference::Digest)
        } else {
            Ok(Reference::Tag(s.to_owned()))
        }
    }
}
