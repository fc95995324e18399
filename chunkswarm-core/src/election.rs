//! Election: pick which peers hear broadcasts and which candidate serves a request.

use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::peer::{Peer, PeerId};

/// How one candidate is chosen out of a round's candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionPolicy {
    /// Highest score wins; ties go to the earliest candidate.
    #[default]
    HighestScore,
    /// Uniform random choice.
    Random,
}

/// Contributors: peers ordered by score (best first, stable on registration order),
/// truncated to `max` when set.
pub fn contributors(peers: &[Peer], max: Option<usize>) -> Vec<PeerId> {
    let mut ranked: Vec<&Peer> = peers.iter().collect();
    ranked.sort_by(|a, b| b.score().cmp(&a.score()));
    let take = max.unwrap_or(ranked.len());
    ranked.into_iter().take(take).map(|p| p.id().clone()).collect()
}

/// Elect one of `candidates`. Candidates no longer in `peers` are skipped.
pub fn elect(policy: ElectionPolicy, candidates: &[PeerId], peers: &[Peer]) -> Option<PeerId> {
    let live: Vec<&Peer> = candidates
        .iter()
        .filter_map(|id| peers.iter().find(|p| p.id() == id))
        .collect();
    match policy {
        ElectionPolicy::HighestScore => live
            .into_iter()
            .reduce(|best, p| if p.score() > best.score() { p } else { best })
            .map(|p| p.id().clone()),
        ElectionPolicy::Random => live
            .choose(&mut rand::thread_rng())
            .map(|p| p.id().clone()),
    }
}
