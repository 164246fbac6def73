//! Value types shared by the chain, sync engine, and wire protocol.
//!
//! These are thin records — signature-equivalent fields are omitted because
//! committee verification is an external oracle (spec §4.A).

use serde::{Deserialize, Serialize};
use tmelcrypt::HashVal;

/// A 256-bit hash, reusing the teacher's hash newtype rather than rolling
/// our own — it already has hex `Display`/`FromStr` and a `random()` helper
/// for tests.
pub type Hash = HashVal;

/// A block header. Genesis has `height == 0` and is its own parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    pub height: u64,
    pub parent_hash: Hash,
    pub hash: Hash,
}

impl Header {
    /// Builds the genesis header, which is conventionally its own parent.
    pub fn genesis(hash: Hash) -> Self {
        Header {
            height: 0,
            parent_hash: hash,
            hash,
        }
    }

    /// Builds the header that follows `parent`, given its own hash.
    pub fn child_of(parent: &Header, hash: Hash) -> Self {
        Header {
            height: parent.height + 1,
            parent_hash: parent.hash,
            hash,
        }
    }
}

/// Asserts single-step finality for the block at `height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinalCertificate {
    pub height: u64,
    pub parent_hash: Hash,
}

/// A committee attestation that retroactively stamps the header `B` heights
/// below `height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampingCertificate {
    pub height: u64,
    pub proof_height: u64,
    pub proof_hash: Hash,
}

impl StampingCertificate {
    /// Builds a stamping certificate for `height`, given the stamping
    /// horizon `b` and the hash of the header at `height - b`.
    pub fn new(height: u64, b: u64, proof_hash: Hash) -> Self {
        StampingCertificate {
            height,
            proof_height: height.saturating_sub(b),
            proof_hash,
        }
    }
}

/// The chain's four monotonically non-decreasing watermarks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SCStatus {
    pub fz: u64,
    pub proof: u64,
    pub candidate: u64,
    pub height: u64,
}

/// A contiguous stretch of the chain delimited by consecutive SC anchors —
/// the unit of sync transfer (spec §3, "Breadcrumb").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub tail_header: Header,
    pub tail_sc: StampingCertificate,
    pub body_headers: Vec<Header>,
}

/// A single committee member's attestation to a height, identified by its
/// index into the (externally maintained) committee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vote {
    pub height: u64,
    pub voter: u16,
}
