use chrono::{DateTime, Utc};
use lingocast_models::{ChannelState, InitiationMessage, Language};
use lingocast_ws::{ChannelConfig, ChannelError, ChannelEvent, SessionChannel};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One live translation session: a manifest, a language and the channel
/// carrying the backend's events for them.
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    manifest_url: String,
    language: Language,
    channel: SessionChannel,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    live: bool,
}

impl Session {
    /// Open the channel and announce the session parameters to the backend.
    pub fn open(
        manifest_url: String,
        language: Language,
        config: ChannelConfig,
    ) -> Result<Self, ChannelError> {
        let mut channel = SessionChannel::new(config);
        let events = channel.open(InitiationMessage::new(manifest_url.clone(), language))?;
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            manifest_url,
            language,
            channel,
            events,
            live: true,
        };
        tracing::info!(
            session_id = %session.id,
            url = %session.manifest_url,
            lang = %language,
            "session started"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Next event from the backend. `None` once the channel task is gone.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Close the channel and clear the liveness flag. Idempotent.
    pub fn end(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.channel.close();
        let elapsed = Utc::now() - self.started_at;
        tracing::info!(
            session_id = %self.id,
            duration_secs = elapsed.num_seconds(),
            "session ended"
        );
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("manifest_url", &self.manifest_url)
            .field("language", &self.language)
            .field("live", &self.live)
            .finish()
    }
}
