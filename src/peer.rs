//! Per-peer state machine: handshake, vote gossip, and message dispatch
//! (spec §4.E).
//!
//! Grounded on `themelio_node`'s pattern of a `smolscale::spawn`'d
//! background task per responsibility plus `parking_lot::RwLock`-guarded
//! shared state (`NodeStorage`'s `mempool`/`highest`), and on `melnet`'s
//! length-prefixed framing for the transport itself. The two bounded queues
//! and drop-on-overflow behaviour come straight from spec §5.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use smol::channel::{bounded, Sender};
use smol::prelude::*;
use smol_timeout::TimeoutExt;

use crate::chain::Chain;
use crate::config::Config;
use crate::entities::{Breadcrumb, Header, SCStatus, Vote};
use crate::error::PeerError;
use crate::height_vote_set::HeightVoteSet;
use crate::wire::{self, HandshakeData, HasVoteData, Message, StampingVoteData};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerState {
    New = 0,
    Ready = 1,
    Closed = 2,
}

impl From<u8> for PeerState {
    fn from(v: u8) -> Self {
        match v {
            0 => PeerState::New,
            1 => PeerState::Ready,
            _ => PeerState::Closed,
        }
    }
}

/// A connected peer: its gossip-relevant state and the two queues feeding
/// its broadcaster task.
pub struct Peer {
    id: String,
    state: AtomicU8,
    status: RwLock<SCStatus>,
    counter: RwLock<HeightVoteSet>,
    msg_tx: Sender<Message>,
    vote_tx: Sender<Message>,
    close_tx: Sender<()>,
    /// The local chain, queried to answer this peer's incoming
    /// `GetBreadcrumb`/`GetHeaders` requests.
    chain: Chain,
    /// Timeout for a single outgoing correlated request.
    request_timeout: Duration,
    /// Reply slot for an in-flight `GetBreadcrumb` this peer issued. Only
    /// one breadcrumb request is ever outstanding at a time (the sync engine
    /// awaits each one before issuing the next).
    pending_breadcrumb: Mutex<Option<Sender<Option<Breadcrumb>>>>,
    /// Reply slot for an in-flight `GetHeaders` this peer issued.
    pending_headers: Mutex<Option<Sender<Vec<Header>>>>,
}

impl Peer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PeerState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub fn status(&self) -> SCStatus {
        *self.status.read()
    }

    fn set_state(&self, s: PeerState) {
        self.state.store(s as u8, Ordering::SeqCst);
    }

    /// Performs the handshake over `conn` and, on success, spawns the
    /// broadcaster and receive-loop tasks, returning a ready `Peer`.
    ///
    /// The handshake exchange must complete within `config.handshake_timeout`
    /// overall (spec §4.E). `T` must be cloneable the way `smol::net::TcpStream`
    /// is, so the send and receive halves can run as independent tasks.
    pub async fn handshake<T>(
        id: String,
        mut conn: T,
        config: Config,
        chain: Chain,
        local: HandshakeData,
    ) -> Result<(Arc<Peer>, smol::Task<()>, smol::Task<()>), PeerError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + Clone + 'static,
    {
        let remote = do_handshake(&mut conn, &local, config.max_msg_size)
            .timeout(config.handshake_timeout)
            .await
            .ok_or(PeerError::ReadTimeout)??;

        if remote.version != local.version {
            return Err(PeerError::ProtocolVersionMismatch {
                local: local.version,
                remote: remote.version,
            });
        }
        if remote.network_id != local.network_id {
            return Err(PeerError::NetworkIdMismatch {
                local: local.network_id,
                remote: remote.network_id,
            });
        }
        if remote.genesis != local.genesis {
            return Err(PeerError::GenesisMismatch);
        }

        let (msg_tx, msg_rx) = bounded(config.queue_capacity);
        let (vote_tx, vote_rx) = bounded(config.queue_capacity);
        let (close_tx, close_rx) = bounded(1);

        let peer = Arc::new(Peer {
            id,
            state: AtomicU8::new(PeerState::Ready as u8),
            status: RwLock::new(remote.sc_status),
            counter: RwLock::new(HeightVoteSet::new()),
            msg_tx,
            vote_tx,
            close_tx,
            chain,
            request_timeout: config.request_timeout,
            pending_breadcrumb: Mutex::new(None),
            pending_headers: Mutex::new(None),
        });

        let broadcaster = {
            let peer_id = peer.id.clone();
            let max_msg_size = config.max_msg_size;
            let mut send_half = conn.clone();
            let close_rx = close_rx.clone();
            smolscale::spawn(async move {
                while let Some(msg) = recv_outgoing(&msg_rx, &vote_rx, &close_rx).await {
                    if let Err(e) = wire::send_frame(&mut send_half, &msg, max_msg_size).await {
                        log::warn!("peer {}: send failed, closing: {}", peer_id, e);
                        break;
                    }
                }
            })
        };

        let receiver = {
            let peer = peer.clone();
            let mut recv_half = conn;
            let max_msg_size = config.max_msg_size;
            smolscale::spawn(async move {
                loop {
                    match wire::recv_frame(&mut recv_half, max_msg_size).await {
                        Ok(msg) => peer.dispatch(msg),
                        Err(e) => {
                            log::warn!("peer {}: recv failed, closing: {}", peer.id, e);
                            peer.close();
                            break;
                        }
                    }
                }
            })
        };

        Ok((peer, broadcaster, receiver))
    }

    /// Dispatches a single received message: status/vote/has-vote handling,
    /// serving the peer's own `GetBreadcrumb`/`GetHeaders` requests against
    /// the local chain, and completing this side's pending requests when a
    /// `Breadcrumb`/`Headers` response comes back.
    pub fn dispatch(&self, msg: Message) {
        match msg {
            Message::StampingStatus(status) => self.update_status(status),
            Message::HasSCVote(data) => self.set_has_vote(data),
            Message::StampingVote(data) => {
                log::debug!(
                    "peer {}: received vote for height {} voter {}",
                    self.id,
                    data.height,
                    data.voter
                );
            }
            Message::GetBreadcrumb { from_height } => {
                let bc = self.chain.next_breadcrumb(from_height);
                self.enqueue(&self.msg_tx, Message::Breadcrumb(bc));
            }
            Message::Breadcrumb(bc) => {
                if let Some(tx) = self.pending_breadcrumb.lock().take() {
                    let _ = tx.try_send(bc);
                } else {
                    log::debug!("peer {}: received unsolicited breadcrumb", self.id);
                }
            }
            Message::GetHeaders { begin, end } => {
                let headers = (begin..end).filter_map(|h| self.chain.header(h)).collect();
                self.enqueue(&self.msg_tx, Message::Headers(headers));
            }
            Message::Headers(headers) => {
                if let Some(tx) = self.pending_headers.lock().take() {
                    let _ = tx.try_send(headers);
                } else {
                    log::debug!("peer {}: received unsolicited headers", self.id);
                }
            }
            Message::Handshake(_) => {
                log::debug!("peer {}: ignoring unexpected post-handshake handshake", self.id);
            }
        }
    }

    /// Sends a stamping vote, marking it as now-held by the peer. Holds the
    /// counter's write lock across the enqueue, so "sent" and "marked
    /// known-held" are atomic (spec §5).
    pub fn send_stamping_vote(&self, vote: StampingVoteData) -> Result<(), PeerError> {
        if self.state() == PeerState::Closed {
            return Err(PeerError::Closed);
        }
        let candidate = self.status().candidate;
        if vote.height <= candidate {
            return Err(PeerError::TooLow {
                height: vote.height,
                candidate,
            });
        }
        let mut counter = self.counter.write();
        if counter.has_vote(vote.vote()) {
            return Err(PeerError::Redundant {
                height: vote.height,
                voter: vote.voter,
            });
        }
        self.enqueue(&self.vote_tx, Message::StampingVote(vote.clone()));
        counter.set_has_vote(vote.height, vote.voter);
        Ok(())
    }

    /// Informational: records that the peer has a vote, without sending
    /// anything. Ignored once the height is at or below the peer's
    /// candidate.
    pub fn set_has_vote(&self, data: HasVoteData) {
        if data.height <= self.status().candidate {
            return;
        }
        self.counter.write().set_has_vote(data.height, data.voter_idx);
    }

    /// Unconditional status push.
    pub fn send_status(&self, status: SCStatus) -> Result<(), PeerError> {
        if self.state() == PeerState::Closed {
            return Err(PeerError::Closed);
        }
        self.enqueue(&self.msg_tx, Message::StampingStatus(status));
        Ok(())
    }

    /// Accepts a peer's status push only if it does not regress either
    /// watermark, then prunes vote bookkeeping below the old candidate.
    pub fn update_status(&self, msg: SCStatus) {
        let mut status = self.status.write();
        if msg.candidate >= status.candidate && msg.height >= status.height {
            let old_candidate = status.candidate;
            *status = msg;
            drop(status);
            if msg.candidate > old_candidate {
                self.counter.write().remove(old_candidate + 1, msg.candidate);
            }
        }
    }

    /// Chooses one local vote the peer's counter does not have, and sends
    /// it.
    pub fn pick_and_send(&self, local_votes: &[StampingVoteData]) -> Result<(), PeerError> {
        let votes: Vec<Vote> = local_votes.iter().map(|v| v.vote()).collect();
        let pick = {
            self.counter
                .read()
                .random_not_in(&votes)
                .ok_or(PeerError::NothingToSend)?
        };
        let data = local_votes
            .iter()
            .find(|v| v.vote() == pick)
            .expect("random_not_in only returns votes present in local_votes")
            .clone();
        self.send_stamping_vote(data)
    }

    /// As `pick_and_send`, but logs at debug and swallows the error instead
    /// of propagating it — the background gossip loop's behaviour (spec §9
    /// open question, resolved in DESIGN.md).
    pub fn pick_and_send_logged(&self, local_votes: &[StampingVoteData]) {
        if let Err(e) = self.pick_and_send(local_votes) {
            log::debug!("peer {}: nothing sent this round: {}", self.id, e);
        }
    }

    /// Issues a `GetBreadcrumb` to the peer and awaits the correlated
    /// `Breadcrumb` response, bounded by `config.request_timeout`.
    pub async fn request_breadcrumb(
        &self,
        from_height: u64,
    ) -> Result<Option<Breadcrumb>, PeerError> {
        if self.state() == PeerState::Closed {
            return Err(PeerError::Closed);
        }
        let (tx, rx) = bounded(1);
        *self.pending_breadcrumb.lock() = Some(tx);
        self.enqueue(&self.msg_tx, Message::GetBreadcrumb { from_height });
        match rx.recv().timeout(self.request_timeout).await {
            Some(Ok(bc)) => Ok(bc),
            Some(Err(_)) => Err(PeerError::Closed),
            None => Err(PeerError::ReadTimeout),
        }
    }

    /// Issues a `GetHeaders` to the peer and awaits the correlated `Headers`
    /// response, bounded by `config.request_timeout`.
    pub async fn request_headers(&self, begin: u64, end: u64) -> Result<Vec<Header>, PeerError> {
        if self.state() == PeerState::Closed {
            return Err(PeerError::Closed);
        }
        let (tx, rx) = bounded(1);
        *self.pending_headers.lock() = Some(tx);
        self.enqueue(&self.msg_tx, Message::GetHeaders { begin, end });
        match rx.recv().timeout(self.request_timeout).await {
            Some(Ok(headers)) => Ok(headers),
            Some(Err(_)) => Err(PeerError::Closed),
            None => Err(PeerError::ReadTimeout),
        }
    }

    fn enqueue(&self, tx: &Sender<Message>, msg: Message) {
        if tx.try_send(msg).is_err() {
            log::warn!("peer {}: queue full, dropping message", self.id);
        }
    }

    /// Closes the peer: its close-channel fires, and both loops exit
    /// promptly.
    pub fn close(&self) {
        self.set_state(PeerState::Closed);
        let _ = self.close_tx.try_send(());
    }

    /// Builds a `Ready` peer directly from its queue halves, bypassing the
    /// handshake. Used by tests that exercise `PeerSet`/gossip logic without
    /// a live transport.
    #[cfg(test)]
    pub fn new_for_test(
        id: String,
        status: SCStatus,
        msg_tx: Sender<Message>,
        vote_tx: Sender<Message>,
        close_tx: Sender<()>,
    ) -> Self {
        let chain = Chain::new(
            crate::entities::Header::genesis(crate::entities::Hash::random()),
            Config::default(),
        );
        Peer {
            id,
            state: AtomicU8::new(PeerState::Ready as u8),
            status: RwLock::new(status),
            counter: RwLock::new(HeightVoteSet::new()),
            msg_tx,
            vote_tx,
            close_tx,
            chain,
            request_timeout: Config::default().request_timeout,
            pending_breadcrumb: Mutex::new(None),
            pending_headers: Mutex::new(None),
        }
    }
}

/// Waits on whichever of the two outgoing queues or the close signal fires
/// first. Returns `None` once the peer is closed.
async fn recv_outgoing(
    msg_rx: &smol::channel::Receiver<Message>,
    vote_rx: &smol::channel::Receiver<Message>,
    close_rx: &smol::channel::Receiver<()>,
) -> Option<Message> {
    smol::future::or(
        async {
            let _ = close_rx.recv().await;
            None
        },
        async {
            smol::future::or(
                async { msg_rx.recv().await.ok() },
                async { vote_rx.recv().await.ok() },
            )
            .await
        },
    )
    .await
}

async fn do_handshake<T>(
    conn: &mut T,
    local: &HandshakeData,
    max_msg_size: u32,
) -> Result<HandshakeData, PeerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    wire::send_frame(conn, &Message::Handshake(local.clone()), max_msg_size).await?;
    match wire::recv_frame(conn, max_msg_size).await? {
        Message::Handshake(remote) => Ok(remote),
        _ => Err(PeerError::Decode("expected handshake frame".into())),
    }
}
