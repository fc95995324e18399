//! Reputation scoring: reward, punish, and demote peers.

use crate::peer::{Peer, PeerId};

/// Add `points` to every peer yielded.
pub fn increment<'a>(peers: impl IntoIterator<Item = &'a mut Peer>, points: i64) {
    for peer in peers {
        peer.score = peer.score.saturating_add(points);
    }
}

/// Subtract `points` from every peer yielded.
pub fn decrement<'a>(peers: impl IntoIterator<Item = &'a mut Peer>, points: i64) {
    for peer in peers {
        peer.score = peer.score.saturating_sub(points);
    }
}

/// Peer with the minimum score. Ties go to the first one in slice (registration) order.
pub fn lowest_score(peers: &[Peer]) -> Option<&Peer> {
    peers.iter().reduce(|low, p| if p.score < low.score { p } else { low })
}

/// Demote `id` to `margin` below the current worst performer. Returns the new score,
/// or `None` if the peer is not registered.
pub fn penalize(peers: &mut [Peer], id: &PeerId, margin: i64) -> Option<i64> {
    let floor = lowest_score(peers)?.score;
    let peer = peers.iter_mut().find(|p| p.id() == id)?;
    peer.score = floor.saturating_sub(margin);
    Some(peer.score)
}
