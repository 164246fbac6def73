//! Chain and peer configuration.
//!
//! `Config` is passed by value/reference into `Chain`/`Peer`/`PeerSet` —
//! nothing here reads global or file state directly. The CLI front-end in
//! `src/bin/stampchain_demo.rs` is the only place that touches `structopt` or
//! the filesystem, the way `themelio-node`'s `args.rs` keeps `MainArgs`
//! separate from the node logic it configures.

use std::time::Duration;

/// Default stamping horizon used throughout spec.md's seed scenarios.
pub const DEFAULT_STAMPING_HORIZON: u64 = 20;

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// `B`: distance between a stamping certificate and the header it
    /// retroactively stamps.
    pub stamping_horizon: u64,
    /// Capacity of each peer's `msgQueue`/`voteQueue` (spec §5).
    pub queue_capacity: usize,
    /// Overall timeout for a peer's handshake (spec §4.E).
    pub handshake_timeout: Duration,
    /// Timeout for a single correlated request (`GetBreadcrumb`/`GetHeaders`)
    /// to a peer, waiting for the matching response frame.
    pub request_timeout: Duration,
    /// `ProtocolMaxMsgSize` (spec §6).
    pub max_msg_size: u32,
    /// Local network id, checked against a peer's handshake.
    pub network_id: u64,
    /// Local protocol version, checked against a peer's handshake.
    pub version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stamping_horizon: DEFAULT_STAMPING_HORIZON,
            queue_capacity: 1024,
            handshake_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_msg_size: 10 * 1024 * 1024,
            network_id: 1,
            version: 1,
        }
    }
}
