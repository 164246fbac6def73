//! A sparse stamping-certificate chain: an append-only header chain whose
//! finality is retroactively confirmed by infrequent committee certificates,
//! plus the peer protocol used to gossip votes and sync new nodes.

pub mod chain;
pub mod config;
pub mod entities;
pub mod error;
pub mod height_vote_set;
pub mod oracle;
pub mod peer;
pub mod peer_set;
pub mod sync;
pub mod wire;

pub use chain::Chain;
pub use config::Config;
pub use entities::{
    Breadcrumb, FinalCertificate, Hash, Header, SCStatus, StampingCertificate, Vote,
};
pub use error::{ChainError, PeerError, PeerSetError, SyncError};
pub use height_vote_set::HeightVoteSet;
pub use peer::{Peer, PeerState};
pub use peer_set::PeerSet;
pub use sync::{sync, BreadcrumbSource, SyncStats};
