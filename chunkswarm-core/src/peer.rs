//! Peer records: identity, frame channel, reputation score, lateness counter.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol::Message;
use crate::wire;

/// Peer identity (e.g. a connection id). Assigned by the transport; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Result<Self, PeerError> {
        let id = id.into();
        if id.is_empty() {
            return Err(PeerError::EmptyId);
        }
        Ok(PeerId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    #[error("peer id cannot be empty")]
    EmptyId,
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),
    #[error("peer {0} is registered on another connection")]
    ChannelReplaced(PeerId),
}

/// Outbound frame sink for one peer connection. Owned by the transport.
/// Sends are fire-and-forget: delivery failures are the transport's concern.
pub trait PeerChannel: Send + Sync {
    fn send_frame(&self, frame: Vec<u8>);
}

/// Swarm-side state for one registered connection.
#[derive(Clone)]
pub struct Peer {
    id: PeerId,
    channel: Arc<dyn PeerChannel>,
    pub(crate) score: i64,
    pub(crate) late: u32,
}

impl Peer {
    pub fn new(id: PeerId, channel: Arc<dyn PeerChannel>, baseline_score: i64) -> Self {
        Self {
            id,
            channel,
            score: baseline_score,
            late: 0,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    /// Consecutive successes that arrived after their round had closed.
    pub fn late(&self) -> u32 {
        self.late
    }

    /// Frame `msg` and hand it to the channel.
    pub fn send(&self, msg: &Message) {
        match wire::encode_frame(msg) {
            Ok(frame) => self.channel.send_frame(frame),
            Err(e) => {
                tracing::warn!(peer = %self.id, command = msg.command(), "dropping frame: {e}")
            }
        }
    }

    pub(crate) fn replace_channel(&mut self, channel: Arc<dyn PeerChannel>) {
        self.channel = channel;
    }

    /// Whether this record still sends through `channel` (same allocation).
    pub(crate) fn uses_channel(&self, channel: &Arc<dyn PeerChannel>) -> bool {
        Arc::as_ptr(&self.channel).cast::<()>() == Arc::as_ptr(channel).cast::<()>()
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("score", &self.score)
            .field("late", &self.late)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::wire::decode_frame;

    /// Channel that records every frame for inspection.
    #[derive(Default)]
    pub(crate) struct RecordingChannel {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingChannel {
        pub(crate) fn messages(&self) -> Vec<Message> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| decode_frame(f).unwrap().0)
                .collect()
        }

        pub(crate) fn clear(&self) {
            self.frames.lock().unwrap().clear();
        }
    }

    impl PeerChannel for RecordingChannel {
        fn send_frame(&self, frame: Vec<u8>) {
            self.frames.lock().unwrap().push(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingChannel;
    use super::*;

    #[test]
    fn empty_id_rejected() {
        assert_eq!(PeerId::new(""), Err(PeerError::EmptyId));
        assert_eq!(PeerId::new("conn-7").unwrap().as_str(), "conn-7");
    }

    #[test]
    fn new_peer_starts_at_baseline() {
        let ch = Arc::new(RecordingChannel::default());
        let peer = Peer::new(PeerId::new("a").unwrap(), ch, 50);
        assert_eq!(peer.score(), 50);
        assert_eq!(peer.late(), 0);
    }

    #[test]
    fn send_forwards_framed_message() {
        let ch = Arc::new(RecordingChannel::default());
        let peer = Peer::new(PeerId::new("a").unwrap(), ch.clone(), 0);
        let msg = Message::Request {
            resource: "seg-3".into(),
        };
        peer.send(&msg);
        assert_eq!(ch.messages(), vec![msg]);
    }
}
