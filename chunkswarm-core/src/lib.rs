//! Swarm chunk retrieval coordinator.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod config;
pub mod core;
pub mod election;
pub mod peer;
pub mod protocol;
pub mod scoring;
pub mod wire;

pub use config::Config;
pub use crate::core::{
    Action, MessageError, OnFail, OnSuccess, Phase, RoundState, Source, SwarmCore,
};
pub use election::ElectionPolicy;
pub use peer::{Peer, PeerChannel, PeerError, PeerId};
pub use protocol::{Message, ResourceId};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
