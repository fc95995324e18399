//! Host-driven API: SwarmCore receives events from host, returns actions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::election;
use crate::peer::{Peer, PeerChannel, PeerError, PeerId};
use crate::protocol::{Message, ResourceId};
use crate::scoring;
use crate::wire;

/// Called once with the chunk when a round is satisfied.
pub type OnSuccess = Box<dyn FnOnce(Vec<u8>, Source) + Send>;
/// Called once when a round fails; the caller should serve from the origin.
pub type OnFail = Box<dyn FnOnce() + Send>;

/// Where a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    P2p,
    Origin,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::P2p => "p2p",
            Source::Origin => "origin",
        }
    }
}

/// Timed phase of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Interested,
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    /// `interested` broadcast sent, waiting for candidates.
    AwaitingInterest,
    /// `request` sent to the elected peer, waiting for the chunk.
    AwaitingResponse,
}

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Call `on_timeout(phase, round)` after `after` unless cancelled.
    StartTimer {
        phase: Phase,
        round: u64,
        after: Duration,
    },
    CancelTimer { phase: Phase, round: u64 },
    /// Swarm size, published on every membership change and round reset.
    SizeChanged(usize),
}

/// Swarm coordinator. Host passes events; core returns actions.
pub struct SwarmCore {
    config: Config,
    peers: Vec<Peer>,
    state: RoundState,
    resource: Option<ResourceId>,
    /// Sticky across rounds until a round fails.
    elected: Option<PeerId>,
    candidates: Vec<PeerId>,
    choked: HashSet<PeerId>,
    /// Generation token, bumped on every `request_resource`.
    round: u64,
    on_success: Option<OnSuccess>,
    on_fail: Option<OnFail>,
}

impl SwarmCore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            peers: Vec::new(),
            state: RoundState::Idle,
            resource: None,
            elected: None,
            candidates: Vec::new(),
            choked: HashSet::new(),
            round: 0,
            on_success: None,
            on_fail: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn size(&self) -> usize {
        self.peers.len()
    }

    /// Register a connection. Re-registering an id swaps its channel and keeps its score.
    pub fn add_peer(&mut self, id: PeerId, channel: Arc<dyn PeerChannel>) -> Vec<Action> {
        match self.peers.iter_mut().find(|p| *p.id() == id) {
            Some(existing) => existing.replace_channel(channel),
            None => {
                info!(peer = %id, "join");
                self.peers
                    .push(Peer::new(id, channel, self.config.baseline_score));
            }
        }
        vec![Action::SizeChanged(self.size())]
    }

    pub fn remove_peer(&mut self, id: &PeerId) -> Result<Vec<Action>, PeerError> {
        let idx = self.position(id)?;
        self.peers.remove(idx);
        info!("quit: {} (remains: {})", id, self.size());
        Ok(vec![Action::SizeChanged(self.size())])
    }

    /// Drop `id` only if it is still registered on `channel`. A connection that closes after
    /// its id was re-registered elsewhere gets `ChannelReplaced` and leaves the peer alone.
    pub fn remove_connection(
        &mut self,
        id: &PeerId,
        channel: &Arc<dyn PeerChannel>,
    ) -> Result<Vec<Action>, PeerError> {
        let idx = self.position(id)?;
        if !self.peers[idx].uses_channel(channel) {
            return Err(PeerError::ChannelReplaced(id.clone()));
        }
        self.remove_peer(id)
    }

    fn position(&self, id: &PeerId) -> Result<usize, PeerError> {
        self.peers
            .iter()
            .position(|p| p.id() == id)
            .ok_or_else(|| PeerError::UnknownPeer(id.clone()))
    }

    /// Start a round for `resource`. A round already in flight is superseded: its timer is
    /// cancelled and its callbacks are dropped without being called.
    pub fn request_resource(
        &mut self,
        resource: ResourceId,
        on_success: impl FnOnce(Vec<u8>, Source) + Send + 'static,
        on_fail: impl FnOnce() + Send + 'static,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(cancel) = self.cancel_timer() {
            warn!(
                superseded = ?self.resource,
                "new round for {} while previous one is active", resource
            );
            actions.push(cancel);
        }
        self.round = self.round.wrapping_add(1);
        self.on_success = Some(Box::new(on_success));
        self.on_fail = Some(Box::new(on_fail));
        self.resource = Some(resource.clone());
        self.candidates.clear();
        self.choked.clear();

        if let Some(elected) = self.elected.clone() {
            if self.peer(&elected).is_some() {
                info!("directly requesting to {}", elected);
                actions.extend(self.send_request());
                return actions;
            }
            debug!(peer = %elected, "elected peer left the swarm, broadcasting");
            self.elected = None;
        }

        let msg = Message::Interested { resource };
        let contributors = self.contributors();
        for peer in self.peers.iter().filter(|p| contributors.contains(p.id())) {
            peer.send(&msg);
        }
        self.state = RoundState::AwaitingInterest;
        actions.push(Action::StartTimer {
            phase: Phase::Interested,
            round: self.round,
            after: self.config.interested_timeout(),
        });
        actions
    }

    /// A timer started by an earlier action fired. Stale firings are ignored.
    pub fn on_timeout(&mut self, phase: Phase, round: u64) -> Vec<Action> {
        if round != self.round {
            debug!(?phase, round, current = self.round, "stale timer");
            return vec![];
        }
        match (phase, self.state) {
            (Phase::Interested, RoundState::AwaitingInterest) => self.interested_finished(),
            (Phase::Request, RoundState::AwaitingResponse) => {
                info!(peer = ?self.elected, "request timed out");
                self.fail()
            }
            _ => {
                debug!(?phase, state = ?self.state, "timer for a resolved phase");
                vec![]
            }
        }
    }

    /// Peer claims it holds `resource`.
    pub fn on_contain(&mut self, peer: &PeerId, resource: &ResourceId) {
        if self.resource.as_ref() != Some(resource) || self.peer(peer).is_none() {
            return;
        }
        if !self.candidates.contains(peer) {
            self.candidates.push(peer.clone());
        }
    }

    /// Peer refuses `resource`. Once every contributor has refused, the round fails at once.
    /// Chokes from peers outside the contributor set are ignored.
    pub fn on_choke(&mut self, peer: &PeerId, resource: &ResourceId) -> Vec<Action> {
        if self.resource.as_ref() != Some(resource) {
            return vec![];
        }
        let contributors = self.contributors();
        if !contributors.contains(peer) {
            debug!(peer = %peer, "choke from non-contributor ignored");
            return vec![];
        }
        self.choked.insert(peer.clone());
        if self.choked.len() < contributors.len() {
            return vec![];
        }
        warn!("all contributors choked, getting from origin");
        let mut actions: Vec<Action> = self.cancel_timer().into_iter().collect();
        actions.extend(self.fail());
        actions
    }

    /// Peer delivered `chunk` for `resource`.
    pub fn on_satisfy(
        &mut self,
        peer: &PeerId,
        resource: &ResourceId,
        chunk: Vec<u8>,
    ) -> Vec<Action> {
        let awaited =
            self.elected.as_ref() == Some(peer) && self.resource.as_ref() == Some(resource);
        if awaited {
            if let Some(cb) = self.on_success.take() {
                cb(chunk, Source::P2p);
            }
            self.on_fail = None;
            if let Some(p) = self.peer_mut(peer) {
                p.late = 0;
            }
            let mut actions = vec![Action::CancelTimer {
                phase: Phase::Request,
                round: self.round,
            }];
            self.update_scores();
            actions.extend(self.reset_round());
            return actions;
        }

        if self.elected.is_none() || self.resource.is_none() {
            // Someone shipped a whole chunk after the window closed.
            warn!(peer = %peer, "satisfy error (timeout)");
            let threshold = self.config.late_threshold;
            let late = match self.peer_mut(peer) {
                Some(p) => {
                    p.late += 1;
                    p.late
                }
                None => return vec![],
            };
            if late > threshold {
                self.penalize(peer);
                if let Some(p) = self.peer_mut(peer) {
                    p.late = 0;
                }
            }
        } else {
            warn!(peer = %peer, resource = %resource, "satisfy error: wrong resource");
        }
        vec![]
    }

    /// Peer reports it is overloaded.
    pub fn on_busy(&mut self, peer: &PeerId) {
        self.penalize(peer);
    }

    /// Decode a wire frame from `peer` and dispatch it.
    pub fn on_message_received(
        &mut self,
        peer: &PeerId,
        bytes: &[u8],
    ) -> Result<Vec<Action>, MessageError> {
        if self.peer(peer).is_none() {
            return Err(MessageError::UnknownPeer);
        }
        let (msg, _consumed) =
            wire::decode_frame(bytes).map_err(|_| MessageError::DecodeFailed)?;
        let actions = match msg {
            Message::Contain { resource } => {
                self.on_contain(peer, &resource);
                vec![]
            }
            Message::Choke { resource } => self.on_choke(peer, &resource),
            Message::Satisfy { resource, chunk } => self.on_satisfy(peer, &resource, chunk),
            Message::Busy { .. } => {
                self.on_busy(peer);
                vec![]
            }
            Message::Interested { .. } | Message::Request { .. } => {
                debug!(
                    peer = %peer,
                    command = msg.command(),
                    resource = %msg.resource(),
                    "not serving, ignored"
                );
                vec![]
            }
        };
        Ok(actions)
    }

    fn interested_finished(&mut self) -> Vec<Action> {
        match election::elect(self.config.election, &self.candidates, &self.peers) {
            Some(id) => {
                info!(
                    "round finished, candidates: {}, selected: {}",
                    self.candidates.len(),
                    id
                );
                self.elected = Some(id);
                self.send_request()
            }
            None => {
                info!("round finished, no candidates.");
                self.fail()
            }
        }
    }

    fn send_request(&mut self) -> Vec<Action> {
        self.state = RoundState::AwaitingResponse;
        let timer = Action::StartTimer {
            phase: Phase::Request,
            round: self.round,
            after: self.config.request_timeout(),
        };
        if let (Some(elected), Some(resource)) = (&self.elected, &self.resource) {
            if let Some(peer) = self.peer(elected) {
                peer.send(&Message::Request {
                    resource: resource.clone(),
                });
            }
        }
        vec![timer]
    }

    fn cancel_timer(&self) -> Option<Action> {
        let phase = match self.state {
            RoundState::Idle => return None,
            RoundState::AwaitingInterest => Phase::Interested,
            RoundState::AwaitingResponse => Phase::Request,
        };
        Some(Action::CancelTimer {
            phase,
            round: self.round,
        })
    }

    /// Elected peer and every candidate gain; the elected peer gains twice for actually
    /// delivering. Contributors that stayed silent lose.
    fn update_scores(&mut self) {
        let Some(elected) = self.elected.clone() else {
            return;
        };
        let contributors = self.contributors();
        let mut good = vec![elected.clone()];
        for c in &self.candidates {
            if !good.contains(c) {
                good.push(c.clone());
            }
        }
        let points = self.config.points;
        scoring::increment(
            self.peers.iter_mut().filter(|p| good.contains(p.id())),
            points,
        );
        scoring::increment(self.peers.iter_mut().filter(|p| *p.id() == elected), points);
        scoring::decrement(
            self.peers
                .iter_mut()
                .filter(|p| contributors.contains(p.id()) && !good.contains(p.id())),
            points,
        );
    }

    fn fail(&mut self) -> Vec<Action> {
        let contributors = self.contributors();
        scoring::decrement(
            self.peers
                .iter_mut()
                .filter(|p| contributors.contains(p.id())),
            self.config.points,
        );
        let actions = self.reset_round();
        self.elected = None;
        self.on_success = None;
        if let Some(cb) = self.on_fail.take() {
            cb();
        }
        actions
    }

    fn reset_round(&mut self) -> Vec<Action> {
        self.state = RoundState::Idle;
        self.resource = None;
        self.choked.clear();
        self.candidates.clear();
        vec![Action::SizeChanged(self.size())]
    }

    fn penalize(&mut self, peer: &PeerId) {
        let margin = self.config.penalty_points;
        if let Some(score) = scoring::penalize(&mut self.peers, peer, margin) {
            warn!("{} score is now: {}", peer, score);
        }
    }

    fn peer_mut(&mut self, id: &PeerId) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.id() == id)
    }

    pub fn peer(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id() == id)
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn score_of(&self, id: &PeerId) -> Option<i64> {
        self.peer(id).map(Peer::score)
    }

    /// Peers that receive `interested` broadcasts.
    pub fn contributors(&self) -> Vec<PeerId> {
        election::contributors(&self.peers, self.config.max_contributors)
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn active_resource(&self) -> Option<&ResourceId> {
        self.resource.as_ref()
    }

    pub fn elected(&self) -> Option<&PeerId> {
        self.elected.as_ref()
    }

    pub fn candidates(&self) -> &[PeerId] {
        &self.candidates
    }

    pub fn choked_count(&self) -> usize {
        self.choked.len()
    }

    pub fn round(&self) -> u64 {
        self.round
    }
}

impl Default for SwarmCore {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("failed to decode message")]
    DecodeFailed,
    #[error("message from unregistered peer")]
    UnknownPeer,
}
