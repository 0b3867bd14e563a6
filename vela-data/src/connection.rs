use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Connection lifecycle of a persistent venue feed.
///
/// `Disconnected -> Connecting -> Connected -> (Disconnecting | Reconnecting)
/// -> Disconnected`. Any I/O error, unexpected close, or crossed-book
/// detection moves a `Connected` feed to `Reconnecting`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

impl ConnectionState {
    /// True if the transition `self -> next` is part of the lifecycle.
    pub fn can_transition(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Reconnecting)
                | (Connected, Disconnecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, Disconnected)
                | (Disconnecting, Disconnected)
        )
    }

    /// True while the feed is delivering market data.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnecting => "disconnecting",
        };
        write!(f, "{state}")
    }
}
