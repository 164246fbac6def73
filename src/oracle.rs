//! External collaborator interfaces consumed by the core (spec §6).
//!
//! Signature verification and committee threshold checks are genuinely out
//! of scope — these traits are the seam, the same role `TrustStore` plays
//! in the teacher's `themelio_nodeprot`: a small trait the real consensus
//! layer implements, with a trivial test double standing in here.

use crate::entities::{StampingCertificate, Vote};

/// Verifies an individual committee member's signature on a vote.
pub trait VoteOracle: Send + Sync {
    fn verify(&self, vote: &Vote) -> bool;
}

/// Decides whether a set of votes has reached the committee's threshold for
/// a stamping certificate.
pub trait CommitteeOracle: Send + Sync {
    fn is_stamping_certificate(&self, sc: &StampingCertificate) -> bool;
}

/// Always-true test double for both oracles.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrivialOracle;

impl VoteOracle for TrivialOracle {
    fn verify(&self, _vote: &Vote) -> bool {
        true
    }
}

impl CommitteeOracle for TrivialOracle {
    fn is_stamping_certificate(&self, _sc: &StampingCertificate) -> bool {
        true
    }
}
