//! tokio host for `SwarmCore`: applies actions, runs timers, resolves fetches.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use chunkswarm_core::{
    Action, MessageError, PeerChannel, PeerError, PeerId, Phase, ResourceId, Source, SwarmCore,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::config::HostConfig;
use crate::error::FetchError;
use crate::origin::OriginClient;

const SIZE_CHANNEL_CAPACITY: usize = 64;

/// Frame sink handed to the core for one peer connection.
struct FrameSender(mpsc::UnboundedSender<Vec<u8>>);

impl PeerChannel for FrameSender {
    fn send_frame(&self, frame: Vec<u8>) {
        // Closed connection: the transport will report the peer as gone.
        let _ = self.0.send(frame);
    }
}

/// A chunk and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub source: Source,
}

enum RoundOutcome {
    Delivered(Vec<u8>),
    Failed,
}

/// Shared handle to one swarm. Cheap to clone.
#[derive(Clone)]
pub struct SwarmService {
    core: Arc<Mutex<SwarmCore>>,
    timers: Arc<std::sync::Mutex<HashMap<(Phase, u64), AbortHandle>>>,
    size_tx: broadcast::Sender<usize>,
    origin: Option<OriginClient>,
}

impl SwarmService {
    pub fn new(config: HostConfig) -> Self {
        let (size_tx, _) = broadcast::channel(SIZE_CHANNEL_CAPACITY);
        Self {
            core: Arc::new(Mutex::new(SwarmCore::new(config.swarm))),
            timers: Arc::new(std::sync::Mutex::new(HashMap::new())),
            size_tx,
            origin: config.origin_url.map(OriginClient::new),
        }
    }

    /// Swarm size updates. Slow subscribers lag and skip values.
    pub fn subscribe(&self) -> broadcast::Receiver<usize> {
        self.size_tx.subscribe()
    }

    pub async fn size(&self) -> usize {
        self.core.lock().await.size()
    }

    pub async fn add_peer(&self, id: PeerId, frames: mpsc::UnboundedSender<Vec<u8>>) {
        self.register(id, Arc::new(FrameSender(frames))).await;
    }

    async fn register(&self, id: PeerId, channel: Arc<dyn PeerChannel>) {
        let mut core = self.core.lock().await;
        let actions = core.add_peer(id, channel);
        self.apply(actions);
    }

    pub async fn remove_peer(&self, id: &PeerId) -> Result<(), PeerError> {
        let mut core = self.core.lock().await;
        let actions = core.remove_peer(id)?;
        self.apply(actions);
        Ok(())
    }

    /// Feed one inbound frame from `peer`.
    pub async fn on_frame(&self, peer: &PeerId, frame: &[u8]) -> Result<(), MessageError> {
        let mut core = self.core.lock().await;
        let actions = core.on_message_received(peer, frame)?;
        self.apply(actions);
        Ok(())
    }

    /// Register `id`, pump its inbound frames until the transport closes `inbound`,
    /// then drop it from the swarm unless a newer connection has taken over the id.
    pub async fn serve_peer(
        &self,
        id: PeerId,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let channel: Arc<dyn PeerChannel> = Arc::new(FrameSender(outbound));
        self.register(id.clone(), channel.clone()).await;
        while let Some(frame) = inbound.recv().await {
            if let Err(e) = self.on_frame(&id, &frame).await {
                debug!(peer = %id, "bad frame: {e}");
            }
        }
        let mut core = self.core.lock().await;
        match core.remove_connection(&id, &channel) {
            Ok(actions) => self.apply(actions),
            Err(e) => debug!(peer = %id, "connection closed, peer kept: {e}"),
        }
    }

    /// Get `resource` from the swarm, falling back to the origin when the round fails.
    pub async fn fetch(&self, resource: ResourceId) -> Result<Fetched, FetchError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fail_tx = tx.clone();
        {
            let mut core = self.core.lock().await;
            let actions = core.request_resource(
                resource.clone(),
                move |chunk, _| {
                    let _ = tx.send(RoundOutcome::Delivered(chunk));
                },
                move || {
                    let _ = fail_tx.send(RoundOutcome::Failed);
                },
            );
            self.apply(actions);
        }

        match rx.recv().await {
            Some(RoundOutcome::Delivered(bytes)) => Ok(Fetched {
                bytes,
                source: Source::P2p,
            }),
            Some(RoundOutcome::Failed) => self.fetch_from_origin(&resource).await,
            None => Err(FetchError::Superseded),
        }
    }

    async fn fetch_from_origin(&self, resource: &ResourceId) -> Result<Fetched, FetchError> {
        let origin = self.origin.as_ref().ok_or(FetchError::Unavailable)?;
        info!("swarm failed for {}, getting from origin", resource);
        let bytes = origin.get(resource).await?;
        Ok(Fetched {
            bytes,
            source: Source::Origin,
        })
    }

    /// Carry out `actions`. Callers hold the core lock, so actions from different events
    /// are applied in the order the core produced them.
    fn apply(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::StartTimer {
                    phase,
                    round,
                    after,
                } => {
                    let svc = self.clone();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let mut core = svc.core.lock().await;
                        svc.timers().remove(&(phase, round));
                        let actions = core.on_timeout(phase, round);
                        svc.apply(actions);
                    });
                    self.timers().insert((phase, round), task.abort_handle());
                }
                Action::CancelTimer { phase, round } => {
                    if let Some(handle) = self.timers().remove(&(phase, round)) {
                        handle.abort();
                    }
                }
                Action::SizeChanged(n) => {
                    // No subscribers is fine.
                    let _ = self.size_tx.send(n);
                }
            }
        }
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, HashMap<(Phase, u64), AbortHandle>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
