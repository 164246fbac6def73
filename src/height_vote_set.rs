//! Per-peer bookkeeping of which stamping votes a peer is known to hold
//! (spec §4.B).
//!
//! Backed by a `BTreeMap<height, bitmap>` rather than a crate like
//! `bit-vec` — the per-height bitmap rarely exceeds a few hundred bits
//! (committee size), so a hand-rolled word bitmap keeps this dependency-free
//! the way the teacher's own small collections (`RoutingTable`) are.

use std::collections::BTreeMap;

use crate::entities::Vote;

const WORD_BITS: usize = 64;

#[derive(Clone, Debug, Default)]
struct Bitmap(Vec<u64>);

impl Bitmap {
    fn set(&mut self, idx: u16) {
        let word = idx as usize / WORD_BITS;
        let bit = idx as usize % WORD_BITS;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1 << bit;
    }

    fn has(&self, idx: u16) -> bool {
        let word = idx as usize / WORD_BITS;
        let bit = idx as usize % WORD_BITS;
        self.0.get(word).map(|w| w & (1 << bit) != 0).unwrap_or(false)
    }
}

/// Tracks, for a single peer, which `(height, voterIdx)` votes it is known
/// to already hold.
#[derive(Clone, Debug, Default)]
pub struct HeightVoteSet {
    by_height: BTreeMap<u64, Bitmap>,
}

impl HeightVoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotently marks `voter_idx` as known-held at `height`.
    pub fn set_has_vote(&mut self, height: u64, voter_idx: u16) {
        self.by_height.entry(height).or_default().set(voter_idx);
    }

    /// Returns whether the peer is known to hold `vote`.
    pub fn has_vote(&self, vote: Vote) -> bool {
        self.by_height
            .get(&vote.height)
            .map(|b| b.has(vote.voter))
            .unwrap_or(false)
    }

    /// Drops all bookkeeping for heights in `[begin, end]`. Called when a
    /// peer's candidate advances, since votes below it are no longer
    /// interesting (spec §4.B).
    pub fn remove(&mut self, begin: u64, end: u64) {
        self.by_height.retain(|h, _| *h < begin || *h > end);
    }

    /// Given the votes we locally hold, returns one we believe the peer
    /// does not have, per spec's tie-break: lowest height, then lowest
    /// voter index, with ties broken randomly.
    pub fn random_not_in(&self, local_votes: &[Vote]) -> Option<Vote> {
        let mut best_height = None;
        for v in local_votes {
            if self.has_vote(*v) {
                continue;
            }
            best_height = Some(best_height.map_or(v.height, |h: u64| h.min(v.height)));
        }
        let best_height = best_height?;
        let mut candidates: Vec<Vote> = local_votes
            .iter()
            .copied()
            .filter(|v| v.height == best_height && !self.has_vote(*v))
            .collect();
        candidates.sort_by_key(|v| v.voter);
        let lowest_voter = candidates.first()?.voter;
        let tied: Vec<Vote> = candidates
            .into_iter()
            .take_while(|v| v.voter == lowest_voter)
            .collect();
        debug_assert!(!tied.is_empty());
        let pick = fastrand::usize(..tied.len());
        Some(tied[pick])
    }
}
