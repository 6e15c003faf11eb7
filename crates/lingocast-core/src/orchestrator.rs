//! The player actor.
//!
//! All state lives in [`Orchestrator`] and is only touched from `step`, `start`
//! and `stop`, so playback, transcript and session changes never interleave.

use lingocast_codec::{Fragment, FragmentId, FragmentPlayer, PlaybackReport};
use lingocast_media::StreamAttachment;
use lingocast_models::{ChannelState, InboundEvent, Language, PlayerStatus, StatusBus};
use lingocast_util::validation::validate_manifest_url;
use lingocast_ws::{ChannelConfig, ChannelEvent, CloseReason};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::queue::{FragmentQueue, QueueConfig, QueueSnapshot};
use crate::session::Session;
use crate::subtitles::{SubtitleLog, DEFAULT_TRANSCRIPT_LINES};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub channel: ChannelConfig,
    pub queue: QueueConfig,
    pub transcript_lines: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            queue: QueueConfig::default(),
            transcript_lines: DEFAULT_TRANSCRIPT_LINES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Start {
        manifest_url: String,
        language: Language,
    },
    Stop,
    Shutdown,
}

/// Cloneable front door to a running [`Orchestrator::run`] loop.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<PlayerCommand>,
}

impl OrchestratorHandle {
    pub fn new() -> (Self, mpsc::Receiver<PlayerCommand>) {
        let (commands, rx) = mpsc::channel(32);
        (Self { commands }, rx)
    }

    pub async fn start(
        &self,
        manifest_url: impl Into<String>,
        language: Language,
    ) -> Result<(), CoreError> {
        self.send(PlayerCommand::Start {
            manifest_url: manifest_url.into(),
            language,
        })
        .await
    }

    pub async fn stop(&self) -> Result<(), CoreError> {
        self.send(PlayerCommand::Stop).await
    }

    pub async fn shutdown(&self) -> Result<(), CoreError> {
        self.send(PlayerCommand::Shutdown).await
    }

    async fn send(&self, command: PlayerCommand) -> Result<(), CoreError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoreError::Shutdown)
    }
}

/// What woke the actor up.
#[derive(Debug)]
enum Input {
    Channel(ChannelEvent),
    /// The channel task ended without reporting a close.
    ChannelGone,
    Completion(PlaybackReport),
    Watchdog,
}

pub struct Orchestrator<P, A> {
    config: OrchestratorConfig,
    queue: FragmentQueue<P>,
    completions: mpsc::UnboundedReceiver<PlaybackReport>,
    subtitles: SubtitleLog,
    attachment: A,
    session: Option<Session>,
    status: StatusBus,
    next_fragment_id: FragmentId,
}

impl<P: FragmentPlayer, A: StreamAttachment> Orchestrator<P, A> {
    pub fn new(config: OrchestratorConfig, player: P, attachment: A, status: StatusBus) -> Self {
        let (queue, completions) = FragmentQueue::new(player, config.queue.clone(), status.clone());
        let subtitles = SubtitleLog::new(config.transcript_lines);
        Self {
            config,
            queue,
            completions,
            subtitles,
            attachment,
            session: None,
            status,
            next_fragment_id: 0,
        }
    }

    /// Begin a new session, replacing any current one.
    ///
    /// Invalid input is rejected before anything is torn down.
    pub fn start(&mut self, manifest_url: &str, language: Language) -> Result<(), CoreError> {
        let manifest_url = match validate_manifest_url(manifest_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "start rejected");
                self.status.publish(PlayerStatus::Rejected {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        self.end_session("replaced by a new session");
        self.queue.reset();
        self.subtitles.reset();

        self.attachment.attach(&manifest_url, &self.status);

        let session = Session::open(manifest_url, language, self.config.channel.clone())?;
        self.status.publish(PlayerStatus::SessionStarted {
            session_id: session.id().to_string(),
            manifest_url: session.manifest_url().to_string(),
            language,
        });
        self.status.publish(PlayerStatus::Channel {
            state: ChannelState::Connecting,
        });
        self.session = Some(session);
        Ok(())
    }

    /// Close the channel and silence narration. The transcript and the live
    /// video stay as they are.
    pub fn stop(&mut self) {
        if self.end_session("stopped") {
            self.status.publish(PlayerStatus::Channel {
                state: ChannelState::Closed,
            });
        }
        self.queue.reset();
    }

    /// Stop everything, including the video viewer.
    pub fn shutdown(&mut self) {
        self.stop();
        self.attachment.detach();
        tracing::info!("player shut down");
    }

    /// Wait for one input and apply it.
    pub async fn step(&mut self) {
        let input = self.next_input().await;
        self.dispatch(input);
    }

    /// Drive the actor until `Shutdown` arrives or every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<PlayerCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PlayerCommand::Start { manifest_url, language }) => {
                        // Failures are already published on the status bus.
                        let _ = self.start(&manifest_url, language);
                    }
                    Some(PlayerCommand::Stop) => self.stop(),
                    Some(PlayerCommand::Shutdown) | None => break,
                },
                input = self.next_input() => self.dispatch(input),
            }
        }
        self.shutdown();
    }

    pub fn transcript(&self) -> Vec<String> {
        self.subtitles.lines()
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_live)
    }

    pub fn status(&self) -> &StatusBus {
        &self.status
    }

    pub fn player(&self) -> &P {
        self.queue.player()
    }

    async fn next_input(&mut self) -> Input {
        let deadline = self.queue.deadline();
        tokio::select! {
            input = next_channel_input(self.session.as_mut()) => input,
            Some(report) = self.completions.recv() => Input::Completion(report),
            _ = watchdog(deadline) => Input::Watchdog,
        }
    }

    fn dispatch(&mut self, input: Input) {
        match input {
            Input::Channel(event) => self.handle_channel_event(event),
            Input::ChannelGone => {
                self.finish_remote("backend connection lost".into());
            }
            Input::Completion(report) => {
                self.queue.report(report);
            }
            Input::Watchdog => {
                self.queue.expire_if_overdue(Instant::now());
            }
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                self.status.publish(PlayerStatus::Channel {
                    state: ChannelState::Open,
                });
            }
            ChannelEvent::Event(event) => self.handle_inbound(event),
            ChannelEvent::Error(e) => {
                self.status.publish(PlayerStatus::ChannelError {
                    message: e.to_string(),
                });
            }
            ChannelEvent::Closed(reason) => {
                let reason = match reason {
                    CloseReason::Local => "closed".to_string(),
                    CloseReason::Failed => "connection failed".to_string(),
                    CloseReason::Remote { reason, .. } if !reason.is_empty() => {
                        format!("backend closed the session: {reason}")
                    }
                    CloseReason::Remote { .. } => "backend closed the session".to_string(),
                };
                self.finish_remote(reason);
            }
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Subtitle { text } => {
                self.subtitles.append(text.clone());
                self.status.publish(PlayerStatus::Subtitle { line: text });
            }
            InboundEvent::Audio { data } => {
                self.next_fragment_id += 1;
                let fragment_id = self.next_fragment_id;
                match Fragment::from_base64(fragment_id, &data) {
                    Ok(fragment) => {
                        self.queue.enqueue(fragment);
                    }
                    Err(e) => {
                        tracing::warn!(fragment_id, error = %e, "discarding undecodable audio event");
                    }
                }
            }
            InboundEvent::Error { text } => {
                tracing::warn!(message = %text, "backend reported an error");
                self.status
                    .publish(PlayerStatus::BackendError { message: text });
            }
        }
    }

    /// The channel ended on its own; queued narration is left to finish.
    fn finish_remote(&mut self, reason: String) {
        if self.end_session(&reason) {
            self.status.publish(PlayerStatus::Channel {
                state: ChannelState::Closed,
            });
        }
    }

    /// Returns whether a live session was ended.
    fn end_session(&mut self, reason: &str) -> bool {
        let Some(session) = self.session.as_mut().filter(|s| s.is_live()) else {
            return false;
        };
        session.end();
        self.status.publish(PlayerStatus::SessionEnded {
            session_id: session.id().to_string(),
            reason: reason.to_string(),
        });
        true
    }
}

async fn next_channel_input(session: Option<&mut Session>) -> Input {
    match session {
        Some(session) if session.is_live() => match session.next_event().await {
            Some(event) => Input::Channel(event),
            None => Input::ChannelGone,
        },
        _ => std::future::pending().await,
    }
}

async fn watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::ScriptedPlayer;
    use lingocast_util::validation::ValidationError;

    #[derive(Default)]
    struct NoViewer {
        attached: Vec<String>,
        detached: usize,
    }

    impl StreamAttachment for NoViewer {
        fn attach(&mut self, manifest_url: &str, _status: &StatusBus) {
            self.attached.push(manifest_url.to_string());
        }

        fn detach(&mut self) {
            self.detached += 1;
        }
    }

    fn orchestrator() -> Orchestrator<ScriptedPlayer, NoViewer> {
        let config = OrchestratorConfig {
            channel: ChannelConfig {
                endpoint: "ws://127.0.0.1:1/ws-ott".into(),
                ..ChannelConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        Orchestrator::new(
            config,
            ScriptedPlayer::default(),
            NoViewer::default(),
            StatusBus::default(),
        )
    }

    fn audio(payload: &str) -> ChannelEvent {
        ChannelEvent::Event(InboundEvent::Audio {
            data: payload.into(),
        })
    }

    fn subtitle(text: &str) -> ChannelEvent {
        ChannelEvent::Event(InboundEvent::Subtitle { text: text.into() })
    }

    #[test]
    fn empty_url_is_rejected_without_side_effects() {
        let mut orch = orchestrator();
        let mut status = orch.status().subscribe();
        orch.handle_channel_event(subtitle("kept"));

        let err = orch.start("   ", Language::Hi).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EmptyUrl)
        ));
        assert_eq!(orch.transcript(), vec!["kept"]);
        assert!(orch.session().is_none());
        assert!(orch.attachment.attached.is_empty());

        let published = status.try_recv().unwrap();
        assert!(matches!(published, PlayerStatus::Subtitle { .. }));
        assert!(matches!(
            status.try_recv().unwrap(),
            PlayerStatus::Rejected { .. }
        ));
    }

    #[test]
    fn routes_subtitles_and_audio() {
        let mut orch = orchestrator();
        orch.handle_channel_event(subtitle("Hello"));
        orch.handle_channel_event(audio("AAAA"));
        orch.handle_channel_event(subtitle("World"));
        orch.handle_channel_event(audio("AQID"));

        assert_eq!(orch.transcript(), vec!["Hello", "World"]);
        assert_eq!(orch.player().started, vec![1]);
        assert_eq!(orch.queue_snapshot().pending, 1);
    }

    #[test]
    fn bad_audio_leaves_queue_alone() {
        let mut orch = orchestrator();
        orch.handle_channel_event(audio("not base64!!"));
        orch.handle_channel_event(audio(""));
        let snap = orch.queue_snapshot();
        assert_eq!((snap.pending, snap.current), (0, None));
        assert!(orch.player().started.is_empty());
    }

    #[test]
    fn backend_error_is_published() {
        let mut orch = orchestrator();
        let mut status = orch.status().subscribe();
        orch.handle_channel_event(ChannelEvent::Event(InboundEvent::Error {
            text: "Missing url or lang".into(),
        }));
        assert_eq!(
            status.try_recv().unwrap(),
            PlayerStatus::BackendError {
                message: "Missing url or lang".into()
            }
        );
        assert!(orch.transcript().is_empty());
    }

    #[tokio::test]
    async fn start_resets_and_stop_keeps_transcript() {
        let mut orch = orchestrator();
        orch.handle_channel_event(subtitle("old"));
        orch.handle_channel_event(audio("AAAA"));

        orch.start("https://example/live.m3u8", Language::Mr).unwrap();
        assert!(orch.transcript().is_empty());
        assert_eq!(orch.queue_snapshot().current, None);
        assert_eq!(orch.player().stops, 1);
        assert_eq!(orch.attachment.attached, vec!["https://example/live.m3u8"]);
        assert!(orch.is_live());

        orch.handle_channel_event(subtitle("new"));
        orch.handle_channel_event(audio("AAAA"));
        orch.stop();
        assert!(!orch.is_live());
        assert_eq!(orch.transcript(), vec!["new"]);
        assert_eq!(orch.queue_snapshot().current, None);
        assert_eq!(orch.attachment.detached, 0);
    }

    #[tokio::test]
    async fn undecodable_clips_fail_in_the_background() {
        let mut orch = Orchestrator::new(
            OrchestratorConfig::default(),
            lingocast_codec::MutedPlayer::new(),
            NoViewer::default(),
            StatusBus::default(),
        );
        orch.handle_channel_event(audio("AAAA"));
        orch.handle_channel_event(audio("AQID"));
        assert_eq!(orch.queue_snapshot().current, Some(1));
        assert_eq!(orch.queue_snapshot().pending, 1);

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while orch.queue_snapshot().failed < 2 {
                orch.step().await;
            }
        })
        .await
        .unwrap();
        let snap = orch.queue_snapshot();
        assert_eq!((snap.current, snap.pending, snap.played), (None, 0, 0));
    }

    #[tokio::test]
    async fn starts_on_non_http_sources() {
        let mut orch = orchestrator();
        orch.start(" rtmp://live.example/app/stream ", Language::Hi)
            .unwrap();
        assert!(orch.is_live());
        assert_eq!(
            orch.attachment.attached,
            vec!["rtmp://live.example/app/stream"]
        );
        assert_eq!(
            orch.session().map(|s| s.manifest_url().to_string()),
            Some("rtmp://live.example/app/stream".into())
        );

        orch.start("srt://live.example:9000", Language::Ta).unwrap();
        assert_eq!(orch.attachment.attached.len(), 2);
        orch.stop();
    }

    #[tokio::test]
    async fn remote_close_ends_session() {
        let mut orch = orchestrator();
        orch.start("https://example/live.m3u8", Language::Hi).unwrap();
        let mut status = orch.status().subscribe();

        orch.handle_channel_event(ChannelEvent::Closed(CloseReason::Remote {
            code: Some(1000),
            reason: String::new(),
        }));
        assert!(!orch.is_live());
        assert!(matches!(
            status.try_recv().unwrap(),
            PlayerStatus::SessionEnded { .. }
        ));
        assert_eq!(
            status.try_recv().unwrap(),
            PlayerStatus::Channel {
                state: ChannelState::Closed
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_step_skips_hung_fragment() {
        let mut orch = Orchestrator::new(
            OrchestratorConfig {
                queue: QueueConfig {
                    fragment_timeout: std::time::Duration::from_secs(5),
                    ..QueueConfig::default()
                },
                ..OrchestratorConfig::default()
            },
            ScriptedPlayer::default(),
            NoViewer::default(),
            StatusBus::default(),
        );
        orch.handle_channel_event(audio("AAAA"));
        orch.handle_channel_event(audio("AQID"));

        orch.step().await;
        assert_eq!(orch.player().started, vec![1, 2]);
        assert_eq!(orch.queue_snapshot().failed, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let orch = orchestrator();
        let (handle, commands) = OrchestratorHandle::new();
        let task = tokio::spawn(orch.run(commands));
        handle.stop().await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.stop().await, Err(CoreError::Shutdown)));
    }
}
