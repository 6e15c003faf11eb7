//! Narration scheduling.
//!
//! Fragments play strictly in arrival order, one at a time. The only thing
//! that advances the queue is a completion carrying the ticket of the
//! fragment currently playing; the watchdog deadline is a backstop for
//! players that never report back.

use std::collections::VecDeque;
use std::time::Duration;

use lingocast_codec::{
    Completion, Fragment, FragmentId, FragmentPlayer, PlaybackReport, PlaybackTicket,
};
use lingocast_models::{PlayerStatus, StatusBus};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Pending fragments kept before the oldest is dropped. `None` is unbounded.
    pub max_pending: Option<usize>,
    /// How long a single fragment may play before it is abandoned.
    pub fragment_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: None,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing {
        ticket: PlaybackTicket,
        deadline: Instant,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnqueueOutcome {
    /// Fragment evicted to make room, if the queue was full.
    pub dropped: Option<FragmentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub current: Option<FragmentId>,
    pub epoch: u64,
    pub played: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct FragmentQueue<P> {
    player: P,
    config: QueueConfig,
    pending: VecDeque<Fragment>,
    state: PlaybackState,
    epoch: u64,
    completions: mpsc::UnboundedSender<PlaybackReport>,
    status: StatusBus,
    played: u64,
    failed: u64,
    dropped: u64,
}

impl<P: FragmentPlayer> FragmentQueue<P> {
    /// Build a queue around `player`. Completions fired by the player arrive on
    /// the returned receiver and must be fed back through [`Self::report`].
    pub fn new(
        player: P,
        config: QueueConfig,
        status: StatusBus,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackReport>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let queue = Self {
            player,
            config,
            pending: VecDeque::new(),
            state: PlaybackState::Idle,
            epoch: 0,
            completions,
            status,
            played: 0,
            failed: 0,
            dropped: 0,
        };
        (queue, rx)
    }

    pub fn enqueue(&mut self, fragment: Fragment) -> EnqueueOutcome {
        let mut outcome = EnqueueOutcome::default();
        if let Some(max) = self.config.max_pending {
            if max > 0 && self.pending.len() >= max {
                if let Some(oldest) = self.pending.pop_front() {
                    tracing::warn!(
                        fragment_id = oldest.id(),
                        max_pending = max,
                        "narration queue full, dropping oldest fragment"
                    );
                    self.dropped += 1;
                    self.status.publish(PlayerStatus::FragmentDropped {
                        fragment_id: oldest.id(),
                    });
                    outcome.dropped = Some(oldest.id());
                }
            }
        }

        tracing::debug!(
            fragment_id = fragment.id(),
            bytes = fragment.len(),
            pending = self.pending.len(),
            "fragment queued"
        );
        self.pending.push_back(fragment);
        self.drain_next();
        outcome
    }

    /// Start the next pending fragment unless one is already playing.
    ///
    /// A fragment that fails to start counts as finished and the next one is
    /// tried straight away.
    pub fn drain_next(&mut self) {
        if self.is_playing() {
            return;
        }
        while let Some(fragment) = self.pending.pop_front() {
            let fragment_id = fragment.id();
            let ticket = PlaybackTicket {
                epoch: self.epoch,
                fragment_id,
            };
            self.state = PlaybackState::Playing {
                ticket,
                deadline: Instant::now() + self.config.fragment_timeout,
            };
            let done = Completion::new(ticket, self.completions.clone());
            match self.player.play(fragment, done) {
                Ok(()) => {
                    tracing::debug!(fragment_id, epoch = self.epoch, "fragment started");
                    self.status
                        .publish(PlayerStatus::FragmentStarted { fragment_id });
                    return;
                }
                Err(e) => {
                    tracing::warn!(fragment_id, error = %e, "fragment failed to start");
                    self.state = PlaybackState::Idle;
                    self.failed += 1;
                    self.status.publish(PlayerStatus::FragmentFailed {
                        fragment_id,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Route a player report to [`Self::complete`] or [`Self::abandon`].
    pub fn report(&mut self, report: PlaybackReport) -> bool {
        match report.error {
            None => self.complete(report.ticket),
            Some(message) => self.abandon(report.ticket, message),
        }
    }

    /// Handle a completion. Returns `false` for stale or unknown tickets.
    pub fn complete(&mut self, ticket: PlaybackTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        tracing::debug!(fragment_id = ticket.fragment_id, "fragment finished");
        self.state = PlaybackState::Idle;
        self.played += 1;
        self.status.publish(PlayerStatus::FragmentFinished {
            fragment_id: ticket.fragment_id,
        });
        self.drain_next();
        true
    }

    /// The player gave up on a fragment after it had started. It counts as
    /// failed and the next fragment starts.
    pub fn abandon(&mut self, ticket: PlaybackTicket, message: String) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        tracing::warn!(fragment_id = ticket.fragment_id, error = %message, "fragment could not be played");
        self.state = PlaybackState::Idle;
        self.failed += 1;
        self.status.publish(PlayerStatus::FragmentFailed {
            fragment_id: ticket.fragment_id,
            message,
        });
        self.drain_next();
        true
    }

    fn is_current(&self, ticket: PlaybackTicket) -> bool {
        match self.state {
            PlaybackState::Playing { ticket: current, .. } if current == ticket => true,
            _ => {
                tracing::debug!(
                    fragment_id = ticket.fragment_id,
                    epoch = ticket.epoch,
                    current_epoch = self.epoch,
                    "ignoring stale completion"
                );
                false
            }
        }
    }

    /// Deadline of the fragment currently playing.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PlaybackState::Playing { deadline, .. } => Some(deadline),
            PlaybackState::Idle => None,
        }
    }

    /// Abandon the current fragment if its deadline has passed.
    pub fn expire_if_overdue(&mut self, now: Instant) -> bool {
        let PlaybackState::Playing { ticket, deadline } = self.state else {
            return false;
        };
        if now < deadline {
            return false;
        }
        tracing::warn!(
            fragment_id = ticket.fragment_id,
            timeout_secs = self.config.fragment_timeout.as_secs(),
            "fragment never finished, skipping"
        );
        self.player.stop();
        self.state = PlaybackState::Idle;
        self.failed += 1;
        self.status.publish(PlayerStatus::FragmentFailed {
            fragment_id: ticket.fragment_id,
            message: "playback timed out".into(),
        });
        self.drain_next();
        true
    }

    /// Drop everything and silence the player. Completions issued before the
    /// reset are ignored from now on.
    pub fn reset(&mut self) {
        let discarded = self.pending.len();
        self.pending.clear();
        if self.is_playing() {
            self.player.stop();
        }
        self.state = PlaybackState::Idle;
        self.epoch += 1;
        tracing::debug!(discarded, epoch = self.epoch, "narration queue reset");
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing { .. })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.len(),
            current: match self.state {
                PlaybackState::Playing { ticket, .. } => Some(ticket.fragment_id),
                PlaybackState::Idle => None,
            },
            epoch: self.epoch,
            played: self.played,
            failed: self.failed,
            dropped: self.dropped,
        }
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lingocast_codec::PlaybackError;
    use std::collections::HashSet;

    /// Records every call and keeps completions for the test to fire.
    #[derive(Default)]
    pub(crate) struct ScriptedPlayer {
        pub started: Vec<FragmentId>,
        pub stops: usize,
        pub fail: HashSet<FragmentId>,
        pub in_flight: Option<Completion>,
    }

    impl FragmentPlayer for ScriptedPlayer {
        fn play(&mut self, fragment: Fragment, done: Completion) -> Result<(), PlaybackError> {
            assert!(self.in_flight.is_none(), "overlapping playback");
            if self.fail.contains(&fragment.id()) {
                return Err(PlaybackError::EmptyClip);
            }
            self.started.push(fragment.id());
            self.in_flight = Some(done);
            Ok(())
        }

        fn stop(&mut self) {
            self.stops += 1;
            self.in_flight = None;
        }
    }

    fn clip(id: FragmentId) -> Fragment {
        Fragment::new(id, vec![id as u8; 4])
    }

    fn queue(config: QueueConfig) -> (FragmentQueue<ScriptedPlayer>, mpsc::UnboundedReceiver<PlaybackReport>) {
        FragmentQueue::new(ScriptedPlayer::default(), config, StatusBus::default())
    }

    /// Let the player finish its clip and route the completion back.
    fn finish_current(
        q: &mut FragmentQueue<ScriptedPlayer>,
        rx: &mut mpsc::UnboundedReceiver<PlaybackReport>,
    ) -> bool {
        let done = q.player_mut().in_flight.take().expect("nothing playing");
        done.finish();
        let report = rx.try_recv().unwrap();
        q.report(report)
    }

    #[test]
    fn idle_queue_starts_immediately() {
        let (mut q, _rx) = queue(QueueConfig::default());
        q.enqueue(clip(1));
        assert_eq!(q.player().started, vec![1]);
        assert_eq!(q.snapshot().current, Some(1));
        assert_eq!(q.snapshot().pending, 0);
    }

    #[test]
    fn plays_in_order_without_overlap() {
        let (mut q, mut rx) = queue(QueueConfig::default());
        for id in 1..=3 {
            q.enqueue(clip(id));
        }
        assert_eq!(q.player().started, vec![1]);
        assert_eq!(q.snapshot().pending, 2);

        assert!(finish_current(&mut q, &mut rx));
        assert_eq!(q.player().started, vec![1, 2]);
        assert!(finish_current(&mut q, &mut rx));
        assert!(finish_current(&mut q, &mut rx));
        assert_eq!(q.player().started, vec![1, 2, 3]);
        assert!(!q.is_playing());
        assert_eq!(q.snapshot().played, 3);
    }

    #[test]
    fn failed_start_advances_to_next() {
        let (mut q, _rx) = queue(QueueConfig::default());
        q.player_mut().fail.extend([1, 2]);
        q.enqueue(clip(1));
        assert!(!q.is_playing());
        q.enqueue(clip(2));
        q.enqueue(clip(3));
        assert_eq!(q.player().started, vec![3]);
        assert_eq!(q.snapshot().failed, 2);
    }

    #[test]
    fn background_failure_counts_as_failed_and_advances() {
        let bus = StatusBus::default();
        let mut status = bus.subscribe();
        let (mut q, mut rx) = FragmentQueue::new(ScriptedPlayer::default(), QueueConfig::default(), bus);
        q.enqueue(clip(1));
        q.enqueue(clip(2));

        let done = q.player_mut().in_flight.take().unwrap();
        done.fail(&PlaybackError::EmptyClip);
        assert!(q.report(rx.try_recv().unwrap()));

        assert_eq!(q.player().started, vec![1, 2]);
        let snap = q.snapshot();
        assert_eq!((snap.current, snap.played, snap.failed), (Some(2), 0, 1));
        let published: Vec<_> = std::iter::from_fn(|| status.try_recv().ok()).collect();
        assert!(published.contains(&PlayerStatus::FragmentFailed {
            fragment_id: 1,
            message: "clip contains no audio".into(),
        }));
    }

    #[test]
    fn late_failure_after_reset_is_ignored() {
        let (mut q, mut rx) = queue(QueueConfig::default());
        q.enqueue(clip(1));
        let stale = q.player_mut().in_flight.take().unwrap();
        q.reset();
        q.enqueue(clip(1));

        stale.fail(&PlaybackError::EmptyClip);
        assert!(!q.report(rx.try_recv().unwrap()));
        assert_eq!(q.snapshot().failed, 0);
        assert_eq!(q.snapshot().current, Some(1));
    }

    #[test]
    fn reset_discards_and_ignores_stale_completion() {
        let (mut q, mut rx) = queue(QueueConfig::default());
        q.enqueue(clip(1));
        q.enqueue(clip(2));
        let stale = q.player_mut().in_flight.take().unwrap();

        q.reset();
        assert_eq!(q.player().stops, 1);
        let snap = q.snapshot();
        assert_eq!((snap.pending, snap.current, snap.epoch), (0, None, 1));

        q.enqueue(clip(1));
        stale.finish();
        let report = rx.try_recv().unwrap();
        assert!(!q.report(report));
        assert_eq!(q.snapshot().current, Some(1));
        assert!(finish_current(&mut q, &mut rx));
    }

    #[test]
    fn unknown_ticket_is_ignored_while_idle() {
        let (mut q, _rx) = queue(QueueConfig::default());
        assert!(!q.complete(PlaybackTicket {
            epoch: 0,
            fragment_id: 9
        }));
        assert_eq!(q.snapshot().played, 0);
    }

    #[test]
    fn drop_oldest_when_full() {
        let (mut q, _rx) = queue(QueueConfig {
            max_pending: Some(2),
            ..QueueConfig::default()
        });
        q.enqueue(clip(1)); // playing
        q.enqueue(clip(2));
        q.enqueue(clip(3));
        let outcome = q.enqueue(clip(4));
        assert_eq!(outcome.dropped, Some(2));
        assert_eq!(q.snapshot().pending, 2);
        assert_eq!(q.snapshot().dropped, 1);
    }

    #[test]
    fn watchdog_skips_hung_fragment() {
        let (mut q, _rx) = queue(QueueConfig {
            fragment_timeout: Duration::ZERO,
            ..QueueConfig::default()
        });
        q.enqueue(clip(1));
        q.enqueue(clip(2));
        assert!(q.deadline().is_some());

        assert!(q.expire_if_overdue(Instant::now()));
        assert_eq!(q.player().stops, 1);
        assert_eq!(q.player().started, vec![1, 2]);
        assert_eq!(q.snapshot().failed, 1);
    }

    #[test]
    fn watchdog_waits_for_deadline() {
        let (mut q, _rx) = queue(QueueConfig::default());
        assert!(!q.expire_if_overdue(Instant::now()));
        q.enqueue(clip(1));
        assert!(!q.expire_if_overdue(Instant::now()));
        assert_eq!(q.snapshot().current, Some(1));
    }

    #[test]
    fn publishes_fragment_lifecycle() {
        let bus = StatusBus::default();
        let mut status = bus.subscribe();
        let (mut q, mut rx) = FragmentQueue::new(ScriptedPlayer::default(), QueueConfig::default(), bus);
        q.enqueue(clip(5));
        finish_current(&mut q, &mut rx);
        assert_eq!(
            status.try_recv().unwrap(),
            PlayerStatus::FragmentStarted { fragment_id: 5 }
        );
        assert_eq!(
            status.try_recv().unwrap(),
            PlayerStatus::FragmentFinished { fragment_id: 5 }
        );
    }
}
