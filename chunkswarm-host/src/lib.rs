//! tokio host for the swarm coordinator: timers, size-change broadcast, origin fallback.
//! The transport hands each connection to `SwarmService` as a pair of frame channels.

pub mod config;
pub mod error;
pub mod origin;
pub mod service;

pub use config::HostConfig;
pub use error::FetchError;
pub use origin::OriginClient;
pub use service::{Fetched, SwarmService};
