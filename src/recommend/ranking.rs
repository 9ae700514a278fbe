//! Candidate ranking
//!
//! Pure ordering over pre-fetched keys. Order: more covered task concepts
//! first, then simpler tier, then shorter duration with unknown durations last.

use std::cmp::Ordering;

use crate::store::CandidateResource;
use crate::types::DifficultyTier;

/// Pre-computed ranking keys of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankKey {
    /// Number of the task's concepts the resource is linked to
    pub coverage: usize,
    pub tier_score: u8,
    pub duration_minutes: Option<u32>,
}

impl RankKey {
    pub fn of(candidate: &CandidateResource) -> Self {
        Self {
            coverage: candidate.matched_concepts.len(),
            tier_score: DifficultyTier::score(candidate.resource.tier),
            duration_minutes: candidate.resource.duration_minutes,
        }
    }
}

impl Ord for RankKey {
    /// `Less` means "ranks earlier"
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .coverage
            .cmp(&self.coverage)
            .then_with(|| other.tier_score.cmp(&self.tier_score))
            .then_with(|| match (self.duration_minutes, other.duration_minutes) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort candidates best-first. Equal keys keep their input order.
pub fn rank(candidates: Vec<CandidateResource>) -> Vec<CandidateResource> {
    let mut keyed: Vec<(RankKey, CandidateResource)> =
        candidates.into_iter().map(|c| (RankKey::of(&c), c)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, c)| c).collect()
}
