//! Swarm wire protocol: message types and resource identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque resource identifier (e.g. a segment URL). The coordinator only compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_owned())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// All wire message types. Encoding is bincode; framing is length-prefix (see wire module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Broadcast to contributors: who has this resource?
    Interested { resource: ResourceId },
    /// Unicast to the elected peer: send the chunk.
    Request { resource: ResourceId },
    /// Reply to `Interested`: the sender holds the resource.
    Contain { resource: ResourceId },
    /// Reply to `Interested`: the sender cannot or will not serve it.
    Choke { resource: ResourceId },
    /// Reply to `Request`: the chunk itself.
    Satisfy { resource: ResourceId, chunk: Vec<u8> },
    /// The sender is overloaded.
    Busy { resource: ResourceId },
}

impl Message {
    pub fn resource(&self) -> &ResourceId {
        match self {
            Message::Interested { resource }
            | Message::Request { resource }
            | Message::Contain { resource }
            | Message::Choke { resource }
            | Message::Satisfy { resource, .. }
            | Message::Busy { resource } => resource,
        }
    }

    /// Short command name, as used in logs.
    pub fn command(&self) -> &'static str {
        match self {
            Message::Interested { .. } => "interested",
            Message::Request { .. } => "request",
            Message::Contain { .. } => "contain",
            Message::Choke { .. } => "choke",
            Message::Satisfy { .. } => "satisfy",
            Message::Busy { .. } => "busy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_accessor_covers_payload_variant() {
        let msg = Message::Satisfy {
            resource: "seg-1.ts".into(),
            chunk: vec![1, 2, 3],
        };
        assert_eq!(msg.resource().as_str(), "seg-1.ts");
        assert_eq!(msg.command(), "satisfy");
    }
}
