//! The authoritative chain store: headers, final certificates, stamping
//! certificates, and the four derived watermarks (spec §4.C).
//!
//! Grounded on `themelio_node::storage::NodeStorage`: a cheaply-cloned
//! handle around `Arc`-wrapped state, guarded by `parking_lot::RwLock`
//! rather than an async lock, so that no mutating method ever awaits I/O
//! while holding the write lock (spec §5) — there simply isn't any I/O in
//! scope to await.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::entities::{Breadcrumb, FinalCertificate, Header, SCStatus, StampingCertificate};
use crate::error::ChainError;

struct Inner {
    config: Config,
    headers: RwLock<BTreeMap<u64, Header>>,
    fcs: RwLock<BTreeMap<u64, FinalCertificate>>,
    scs: RwLock<BTreeMap<u64, StampingCertificate>>,
    status: RwLock<SCStatus>,
}

/// A cheaply-cloneable handle to the chain store. All clones share the same
/// underlying state.
#[derive(Clone)]
pub struct Chain {
    inner: Arc<Inner>,
}

impl Chain {
    /// Creates a fresh chain seeded with only a genesis header.
    pub fn new(genesis: Header, config: Config) -> Self {
        assert_eq!(genesis.height, 0, "genesis header must be at height 0");
        let mut headers = BTreeMap::new();
        headers.insert(0, genesis);
        Chain {
            inner: Arc::new(Inner {
                config,
                headers: RwLock::new(headers),
                fcs: RwLock::new(BTreeMap::new()),
                scs: RwLock::new(BTreeMap::new()),
                status: RwLock::new(SCStatus::default()),
            }),
        }
    }

    pub fn config(&self) -> Config {
        self.inner.config
    }

    /// Current watermark snapshot.
    pub fn status(&self) -> SCStatus {
        *self.inner.status.read()
    }

    pub fn header(&self, height: u64) -> Option<Header> {
        self.inner.headers.read().get(&height).copied()
    }

    pub fn final_certificate(&self, height: u64) -> Option<FinalCertificate> {
        self.inner.fcs.read().get(&height).copied()
    }

    pub fn stamping_certificate(&self, height: u64) -> Option<StampingCertificate> {
        self.inner.scs.read().get(&height).copied()
    }

    /// Appends a header (and optionally its final certificate) to the chain.
    pub fn add_block(
        &self,
        header: Header,
        fc: Option<FinalCertificate>,
    ) -> Result<(), ChainError> {
        if let Some(fc) = &fc {
            if fc.height != header.height || fc.parent_hash != header.parent_hash {
                return Err(ChainError::BadFinalCertificate {
                    height: header.height,
                });
            }
        }

        let mut headers = self.inner.headers.write();
        let status = *self.inner.status.read();

        if header.height <= status.fz {
            return Err(ChainError::Frozen {
                height: header.height,
                fz: status.fz,
            });
        }
        if headers.contains_key(&header.height) {
            return Err(ChainError::Duplicate {
                height: header.height,
            });
        }
        let expected_height = status.height + 1;
        if header.height != expected_height {
            return Err(ChainError::OutOfOrder {
                height: header.height,
                expected: expected_height,
            });
        }
        let parent = headers
            .get(&(header.height - 1))
            .expect("contiguous headers imply the parent is present");
        if header.parent_hash != parent.hash {
            return Err(ChainError::BadParent {
                height: header.height,
                parent: parent.height,
            });
        }

        headers.insert(header.height, header);
        if let Some(fc) = fc {
            self.inner.fcs.write().insert(header.height, fc);
        }
        drop(headers);
        self.inner.status.write().height = header.height;
        log::debug!("chain: accepted header at height {}", header.height);
        Ok(())
    }

    /// Accepts a stamping certificate, advancing `candidate`/`proof` and
    /// possibly `fz`.
    pub fn add_stamping_certificate(
        &self,
        sc: StampingCertificate,
    ) -> Result<(), ChainError> {
        let b = self.inner.config.stamping_horizon;
        let expected_proof_height = sc.height.checked_sub(b);
        if expected_proof_height != Some(sc.proof_height) {
            return Err(ChainError::BadProof {
                proof_height: sc.proof_height,
            });
        }

        let mut scs = self.inner.scs.write();
        let status = *self.inner.status.read();
        if sc.height <= status.candidate {
            return Err(ChainError::TooOld {
                height: sc.height,
                candidate: status.candidate,
            });
        }

        let proof_header = self
            .inner
            .headers
            .read()
            .get(&sc.proof_height)
            .copied()
            .ok_or(ChainError::NoProofHeader {
                proof_height: sc.proof_height,
            })?;
        if proof_header.hash != sc.proof_hash {
            return Err(ChainError::BadProof {
                proof_height: sc.proof_height,
            });
        }

        scs.insert(sc.height, sc);
        let new_fz = Self::compute_fz(&scs, b);
        drop(scs);

        let mut status = self.inner.status.write();
        status.candidate = sc.height;
        status.proof = sc.height - b;
        status.fz = status.fz.max(new_fz);
        let fz = status.fz;
        drop(status);

        self.inner.fcs.write().retain(|h, _| *h > fz);
        log::info!(
            "chain: stamping certificate accepted at height {}, candidate={} proof={} fz={}",
            sc.height,
            sc.height,
            sc.height - b,
            fz
        );
        Ok(())
    }

    /// Implements the freezing rule (spec §4.C): chain proof-heights,
    /// starting from the implicit genesis anchor at 0, as long as
    /// consecutive anchors are less than `B` apart.
    fn compute_fz(scs: &BTreeMap<u64, StampingCertificate>, b: u64) -> u64 {
        let mut frozen = 0u64;
        for sc in scs.values() {
            if sc.proof_height <= frozen {
                continue;
            }
            if sc.proof_height - frozen < b {
                frozen = sc.proof_height;
            } else {
                break;
            }
        }
        frozen
    }

    /// Returns the next SC-anchored stretch strictly after `from_height`, up
    /// to the current candidate, or `None` if there is none yet.
    pub fn next_breadcrumb(&self, from_height: u64) -> Option<Breadcrumb> {
        let scs = self.inner.scs.read();
        let (_, tail_sc) = scs.range((from_height + 1)..).next()?;
        let tail_sc = *tail_sc;

        let prev_proof_height = scs
            .range(..=from_height)
            .next_back()
            .map(|(_, sc)| sc.proof_height)
            .unwrap_or(0);
        drop(scs);

        let headers = self.inner.headers.read();
        let tail_header = *headers.get(&tail_sc.proof_height)?;
        let body_headers = headers
            .range((prev_proof_height + 1)..tail_sc.proof_height)
            .map(|(_, h)| *h)
            .collect();

        Some(Breadcrumb {
            tail_header,
            tail_sc,
            body_headers,
        })
    }

    /// Applies a breadcrumb previously staged (verified) by the sync engine.
    /// Re-validates the SC's height/proof_height offset against `B` the same
    /// way `add_stamping_certificate` does — a breadcrumb is never trusted
    /// just because it already passed the sync engine's own checks. Takes
    /// the write lock exactly once, per spec §5.
    pub(crate) fn apply_breadcrumb(&self, bc: &Breadcrumb) -> Result<(), ChainError> {
        let b = self.inner.config.stamping_horizon;
        if bc.tail_sc.height.checked_sub(b) != Some(bc.tail_sc.proof_height) {
            return Err(ChainError::BadProof {
                proof_height: bc.tail_sc.proof_height,
            });
        }

        let mut headers = self.inner.headers.write();
        for h in bc.body_headers.iter().chain(std::iter::once(&bc.tail_header)) {
            headers.entry(h.height).or_insert(*h);
        }
        let new_height = headers.keys().next_back().copied().unwrap_or(0);
        drop(headers);

        let mut scs = self.inner.scs.write();
        scs.insert(bc.tail_sc.height, bc.tail_sc);
        let new_fz = Self::compute_fz(&scs, b);
        drop(scs);

        let mut status = self.inner.status.write();
        status.height = status.height.max(new_height);
        status.candidate = status.candidate.max(bc.tail_sc.height);
        status.proof = status.candidate.saturating_sub(b);
        status.fz = status.fz.max(new_fz);
        Ok(())
    }

    /// Human-readable dump, for tests (spec's `Print()`).
    pub fn dump(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        writeln!(
            f,
            "Chain {{ height={}, candidate={}, proof={}, fz={} }}",
            status.height, status.candidate, status.proof, status.fz
        )?;
        for (h, sc) in self.inner.scs.read().iter() {
            writeln!(f, "  SC@{} -> proof {}", h, sc.proof_height)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Hash;

    fn make_header(prev: &Header) -> Header {
        Header::child_of(prev, Hash::random())
    }

    fn build_linear_chain(chain: &Chain, up_to: u64) -> Vec<Header> {
        let mut headers = vec![chain.header(0).unwrap()];
        for _ in 1..=up_to {
            let next = make_header(headers.last().unwrap());
            chain
                .add_block(next, Some(FinalCertificate {
                    height: next.height,
                    parent_hash: next.parent_hash,
                }))
                .unwrap();
            headers.push(next);
        }
        headers
    }

    #[test]
    fn linear_growth_with_sc_every_height() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config { stamping_horizon: 20, ..Default::default() });
        let headers = build_linear_chain(&chain, 100);

        for height in 21..=100 {
            let proof_height = height - 20;
            let sc = StampingCertificate::new(height, 20, headers[proof_height as usize].hash);
            chain.add_stamping_certificate(sc).unwrap();
        }

        let status = chain.status();
        assert_eq!(status.height, 100);
        assert_eq!(status.candidate, 100);
        assert_eq!(status.proof, 80);
        assert_eq!(status.fz, 80);
    }

    #[test]
    fn sparse_stamping_certificates() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config { stamping_horizon: 20, ..Default::default() });
        let headers = build_linear_chain(&chain, 100);

        for height in [25u64, 50, 75, 100] {
            let proof_height = height - 20;
            let sc = StampingCertificate::new(height, 20, headers[proof_height as usize].hash);
            chain.add_stamping_certificate(sc).unwrap();
        }

        let status = chain.status();
        assert_eq!(status.candidate, 100);
        assert_eq!(status.proof, 80);
        assert_eq!(status.fz, 5);
    }

    #[test]
    fn bad_parent_is_rejected_and_state_unchanged() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config::default());
        let bad = Header {
            height: 1,
            parent_hash: Hash::random(),
            hash: Hash::random(),
        };
        let err = chain.add_block(bad, None).unwrap_err();
        assert_eq!(
            err,
            ChainError::BadParent {
                height: 1,
                parent: 0
            }
        );
        assert_eq!(chain.status().height, 0);
    }

    #[test]
    fn duplicate_header_rejected() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config::default());
        let h1 = make_header(&genesis);
        chain.add_block(h1, None).unwrap();
        let err = chain.add_block(h1, None).unwrap_err();
        assert_eq!(err, ChainError::Duplicate { height: 1 });
    }

    #[test]
    fn out_of_order_header_rejected() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config::default());
        let h1 = make_header(&genesis);
        let h2 = make_header(&h1);
        let err = chain.add_block(h2, None).unwrap_err();
        assert_eq!(
            err,
            ChainError::OutOfOrder {
                height: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn sc_below_candidate_is_too_old() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config { stamping_horizon: 2, ..Default::default() });
        let headers = build_linear_chain(&chain, 10);
        let sc1 = StampingCertificate::new(5, 2, headers[3].hash);
        chain.add_stamping_certificate(sc1).unwrap();
        let sc2 = StampingCertificate::new(4, 2, headers[2].hash);
        let err = chain.add_stamping_certificate(sc2).unwrap_err();
        assert_eq!(
            err,
            ChainError::TooOld {
                height: 4,
                candidate: 5
            }
        );
    }

    #[test]
    fn mismatched_final_certificate_is_rejected() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config::default());
        let h1 = make_header(&genesis);
        let wrong_fc = FinalCertificate {
            height: h1.height + 1,
            parent_hash: h1.parent_hash,
        };
        let err = chain.add_block(h1, Some(wrong_fc)).unwrap_err();
        assert_eq!(err, ChainError::BadFinalCertificate { height: 1 });
        assert_eq!(chain.status().height, 0);
    }

    #[test]
    fn apply_breadcrumb_rejects_a_forged_proof_height_offset() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config { stamping_horizon: 20, ..Default::default() });
        let headers = build_linear_chain(&chain, 30);

        let forged_sc = StampingCertificate {
            height: 25,
            proof_height: 10,
            proof_hash: headers[10].hash,
        };
        let bc = Breadcrumb {
            tail_header: headers[10],
            tail_sc: forged_sc,
            body_headers: vec![],
        };
        let err = chain.apply_breadcrumb(&bc).unwrap_err();
        assert_eq!(err, ChainError::BadProof { proof_height: 10 });
        assert_eq!(chain.status().candidate, 0);
    }

    #[test]
    fn header_at_or_below_fz_is_rejected() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config { stamping_horizon: 2, ..Default::default() });
        let headers = build_linear_chain(&chain, 10);
        let sc = StampingCertificate::new(5, 2, headers[3].hash);
        chain.add_stamping_certificate(sc).unwrap();
        assert!(chain.status().fz >= 3);

        // Height 1 is now at or below fz, a fresh add_block for it must fail.
        let replay = Header::child_of(&chain.header(0).unwrap(), Hash::random());
        let err = chain.add_block(replay, None).unwrap_err();
        assert!(matches!(err, ChainError::Frozen { .. }));
    }

    #[test]
    fn next_breadcrumb_walks_anchors_in_order() {
        let genesis = Header::genesis(Hash::random());
        let chain = Chain::new(genesis, Config { stamping_horizon: 20, ..Default::default() });
        let headers = build_linear_chain(&chain, 100);
        for height in [25u64, 50, 75, 100] {
            let proof_height = height - 20;
            let sc = StampingCertificate::new(height, 20, headers[proof_height as usize].hash);
            chain.add_stamping_certificate(sc).unwrap();
        }

        let bc1 = chain.next_breadcrumb(0).unwrap();
        assert_eq!(bc1.tail_sc.height, 25);
        assert_eq!(bc1.tail_header.height, 5);
        assert!(bc1.body_headers.is_empty());

        let bc2 = chain.next_breadcrumb(25).unwrap();
        assert_eq!(bc2.tail_sc.height, 50);
        assert_eq!(bc2.tail_header.height, 30);
        // body headers span (5, 30) exclusive: heights 6..=29
        assert_eq!(bc2.body_headers.len(), 24);

        assert!(chain.next_breadcrumb(100).is_none());
    }
}
