use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::language::Language;

/// Lifecycle of the session channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// What the manifest probe found behind a live URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamKind {
    /// An `#EXTM3U` playlist. `variants` is zero for a media playlist.
    Adaptive { variants: usize },
    /// Anything else; handed to the viewer as a plain media source.
    Direct,
}

/// User-visible outcomes published by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerStatus {
    SessionStarted {
        session_id: String,
        manifest_url: String,
        language: Language,
    },
    SessionEnded {
        session_id: String,
        reason: String,
    },
    Channel {
        state: ChannelState,
    },
    ChannelError {
        message: String,
    },
    BackendError {
        message: String,
    },
    Subtitle {
        line: String,
    },
    FragmentStarted {
        fragment_id: u64,
    },
    FragmentFinished {
        fragment_id: u64,
    },
    FragmentFailed {
        fragment_id: u64,
        message: String,
    },
    FragmentDropped {
        fragment_id: u64,
    },
    StreamAttached {
        stream: StreamKind,
        viewer: Option<String>,
    },
    StreamFailed {
        message: String,
    },
    Rejected {
        message: String,
    },
}

/// Broadcast bus every component reports user-visible status through.
#[derive(Clone)]
pub struct StatusBus {
    sender: broadcast::Sender<PlayerStatus>,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, status: PlayerStatus) {
        // Ignore error if no receivers
        let _ = self.sender.send(status);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerStatus> {
        self.sender.subscribe()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_delivers_to_every_subscriber() {
        let bus = StatusBus::default();
        bus.publish(PlayerStatus::Subtitle { line: "lost".into() });

        let mut a = bus.subscribe();
        let mut b = bus.clone().subscribe();
        bus.publish(PlayerStatus::Subtitle { line: "kept".into() });
        for rx in [&mut a, &mut b] {
            assert_eq!(
                rx.try_recv().unwrap(),
                PlayerStatus::Subtitle { line: "kept".into() }
            );
        }
    }

    #[test]
    fn status_is_tagged_by_type() {
        let status = PlayerStatus::Channel {
            state: ChannelState::Open,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["type"], "channel");
        assert_eq!(value["state"], "open");

        let attached = PlayerStatus::StreamAttached {
            stream: StreamKind::Adaptive { variants: 3 },
            viewer: Some("mpv".into()),
        };
        let value = serde_json::to_value(&attached).unwrap();
        assert_eq!(value["stream"]["kind"], "adaptive");
        assert_eq!(value["stream"]["variants"], 3);
    }
}
