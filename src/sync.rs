//! The breadcrumb-walk sync engine (spec §4.D).
//!
//! Grounded on `themelio_node::node::blksync`'s "fetch into a local buffer,
//! validate, then apply" shape: every breadcrumb is verified against the
//! local chain's tip *before* ever touching `Chain`'s write lock, matching
//! the rule that no lock is ever held across I/O (spec §5).

use async_trait::async_trait;

use crate::chain::Chain;
use crate::entities::{Breadcrumb, Header, SCStatus};
use crate::error::{ChainError, SyncError};
use crate::peer::Peer;

/// Whatever a sync round pulls breadcrumbs and headers from — a remote
/// `Peer` in production, or another in-process `Chain` in tests.
#[async_trait]
pub trait BreadcrumbSource: Send + Sync {
    fn status(&self) -> SCStatus;
    async fn next_breadcrumb(&self, from_height: u64) -> Result<Option<Breadcrumb>, SyncError>;
    async fn headers(&self, begin: u64, end: u64) -> Result<Vec<Header>, SyncError>;
}

#[async_trait]
impl BreadcrumbSource for Chain {
    fn status(&self) -> SCStatus {
        Chain::status(self)
    }

    async fn next_breadcrumb(&self, from_height: u64) -> Result<Option<Breadcrumb>, SyncError> {
        Ok(Chain::next_breadcrumb(self, from_height))
    }

    async fn headers(&self, begin: u64, end: u64) -> Result<Vec<Header>, SyncError> {
        Ok((begin..end).filter_map(|h| Chain::header(self, h)).collect())
    }
}

/// A live peer is a breadcrumb source too: `GetBreadcrumb`/`GetHeaders` go
/// out over the wire and the matching `Breadcrumb`/`Headers` response is
/// correlated back via `Peer`'s pending-request slots.
#[async_trait]
impl BreadcrumbSource for Peer {
    fn status(&self) -> SCStatus {
        Peer::status(self)
    }

    async fn next_breadcrumb(&self, from_height: u64) -> Result<Option<Breadcrumb>, SyncError> {
        self.request_breadcrumb(from_height)
            .await
            .map_err(SyncError::Peer)
    }

    async fn headers(&self, begin: u64, end: u64) -> Result<Vec<Header>, SyncError> {
        self.request_headers(begin, end).await.map_err(SyncError::Peer)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub breadcrumbs_applied: usize,
    pub headers_fetched: usize,
}

/// Verifies a breadcrumb against the local tip it would extend: the body
/// headers must chain by parent hash from that tip, the SC's `proof_height`
/// must actually be `height - b` (spec §4.D step 3), and the SC's
/// `proof_hash` must match the tail header it claims to stamp.
fn verify_breadcrumb(local_tip: &Header, bc: &Breadcrumb, b: u64) -> Result<(), SyncError> {
    let mut prev = *local_tip;
    for h in bc.body_headers.iter().chain(std::iter::once(&bc.tail_header)) {
        if h.parent_hash != prev.hash {
            return Err(SyncError::Verify(format!(
                "header at height {} does not chain from height {}",
                h.height, prev.height
            )));
        }
        prev = *h;
    }
    if bc.tail_sc.height.checked_sub(b) != Some(bc.tail_sc.proof_height) {
        return Err(SyncError::Verify(format!(
            "breadcrumb tail sc proof height {} is not height {} minus b {}",
            bc.tail_sc.proof_height, bc.tail_sc.height, b
        )));
    }
    if bc.tail_header.height != bc.tail_sc.proof_height {
        return Err(SyncError::Verify(format!(
            "breadcrumb tail header at {} does not match sc proof height {}",
            bc.tail_header.height, bc.tail_sc.proof_height
        )));
    }
    if bc.tail_header.hash != bc.tail_sc.proof_hash {
        return Err(SyncError::Verify(format!(
            "breadcrumb tail header hash does not match sc proof hash at height {}",
            bc.tail_header.height
        )));
    }
    Ok(())
}

/// Walks breadcrumbs from `local`'s current tip up to `remote`'s candidate,
/// then bulk-fetches any headers remote has above its candidate.
///
/// Each breadcrumb is fetched and verified outside any lock, then applied to
/// `local` in one atomic step (spec §4.D, §5).
pub async fn sync(local: &Chain, remote: &dyn BreadcrumbSource) -> Result<SyncStats, SyncError> {
    let mut stats = SyncStats::default();
    let remote_status = remote.status();

    loop {
        let cur = local.status().candidate;
        if cur >= remote_status.candidate {
            break;
        }
        let bc = match remote.next_breadcrumb(cur).await? {
            Some(bc) => bc,
            None => break,
        };

        let first_new_height = bc
            .body_headers
            .first()
            .map(|h| h.height)
            .unwrap_or(bc.tail_header.height);
        let local_tip = match first_new_height.checked_sub(1) {
            Some(parent_height) => local
                .header(parent_height)
                .ok_or_else(|| SyncError::Verify("local chain is missing the breadcrumb's parent".into()))?,
            None => local
                .header(0)
                .expect("a chain always has a genesis header at height 0"),
        };
        verify_breadcrumb(&local_tip, &bc, local.config().stamping_horizon)?;

        local.apply_breadcrumb(&bc).map_err(SyncError::Chain)?;
        stats.breadcrumbs_applied += 1;
    }

    let local_height = local.status().height;
    if local_height < remote_status.height {
        let extra = remote
            .headers(local_height + 1, remote_status.height + 1)
            .await?;
        for h in extra {
            match local.add_block(h, None) {
                Ok(()) => stats.headers_fetched += 1,
                Err(ChainError::Duplicate { .. }) => {}
                Err(e) => return Err(SyncError::Chain(e)),
            }
        }
    }

    Ok(stats)
}
