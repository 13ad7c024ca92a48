use serde::{Deserialize, Serialize};

/// A message handed to the outbox by a writer.
///
/// `key` and `payload` are opaque bytes; encoding is the publisher's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub namespace: Option<String>,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace: None,
            key: key.into(),
            payload: payload.into(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Lease state of a stored entry at a given instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimState {
    Unclaimed,
    ClaimedLive,
    ClaimedExpired,
}

impl ClaimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Unclaimed => "unclaimed",
            ClaimState::ClaimedLive => "claimed_live",
            ClaimState::ClaimedExpired => "claimed_expired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_namespace() {
        let m = Message::new("k", "p").with_namespace("ns");
        assert_eq!(m.namespace.as_deref(), Some("ns"));
        assert_eq!(m.key, b"k");
        assert_eq!(m.payload, b"p");
    }

    #[test]
    fn claim_state_labels() {
        assert_eq!(ClaimState::Unclaimed.as_str(), "unclaimed");
        assert_eq!(ClaimState::ClaimedLive.as_str(), "claimed_live");
        assert_eq!(ClaimState::ClaimedExpired.as_str(), "claimed_expired");
    }
}
