//! Typed error kinds for the chain, sync engine, and peer layer.
//!
//! Mirrors `melnet::MelnetError`: one `thiserror` enum per seam, so callers
//! can match on kind instead of string-sniffing an `anyhow::Error`.

use thiserror::Error;

/// Errors from `Chain::add_block` / `Chain::add_stamping_certificate`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("header at height {height} has parent hash that does not match header {parent}'s hash")]
    BadParent { height: u64, parent: u64 },

    #[error("header at height {height} is out of order; expected {expected}")]
    OutOfOrder { height: u64, expected: u64 },

    #[error("height {height} already has a header")]
    Duplicate { height: u64 },

    #[error("height {height} is at or below the frozen tip {fz}")]
    Frozen { height: u64, fz: u64 },

    #[error("no header at proof height {proof_height}")]
    NoProofHeader { proof_height: u64 },

    #[error("stamping certificate proof hash does not match header at height {proof_height}")]
    BadProof { proof_height: u64 },

    #[error("stamping certificate at height {height} is not newer than candidate {candidate}")]
    TooOld { height: u64, candidate: u64 },

    #[error("final certificate at height {height} does not match the header it was attached to")]
    BadFinalCertificate { height: u64 },
}

/// Errors from peer-level operations (`SendStampingVote`, handshake, status).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("vote at height {height} is at or below the peer's candidate {candidate}")]
    TooLow { height: u64, candidate: u64 },

    #[error("peer already has the vote at height {height} for voter {voter}")]
    Redundant { height: u64, voter: u16 },

    #[error("no local vote qualifies to send to this peer")]
    NothingToSend,

    #[error("peer is closed")]
    Closed,

    #[error("protocol version mismatch: local {local}, remote {remote}")]
    ProtocolVersionMismatch { local: u32, remote: u32 },

    #[error("genesis mismatch")]
    GenesisMismatch,

    #[error("network id mismatch: local {local}, remote {remote}")]
    NetworkIdMismatch { local: u64, remote: u64 },

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MsgTooLarge { size: u32, limit: u32 },

    #[error("failed to decode message: {0}")]
    Decode(String),

    #[error("timed out waiting for a response")]
    ReadTimeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from `PeerSet` registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerSetError {
    #[error("peer {0} is already registered")]
    AlreadyRegistered(String),

    #[error("peer {0} is not registered")]
    NotRegistered(String),

    #[error("the peer set is closed")]
    Closed,
}

/// Errors from the sync engine's breadcrumb walk.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("breadcrumb verification failed: {0}")]
    Verify(String),

    #[error("chain error while applying a breadcrumb: {0}")]
    Chain(#[from] ChainError),

    #[error("peer error while syncing: {0}")]
    Peer(#[from] PeerError),

    #[error("transport error while syncing: {0}")]
    Transport(String),
}
