// Narration fragments and the seam between the scheduler and an audio output.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use super::playback::PlaybackError;

pub type FragmentId = u64;

/// One short, independently playable narration clip (compressed bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    id: FragmentId,
    data: Bytes,
}

impl Fragment {
    pub fn new(id: FragmentId, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// Build a fragment from the base64 text carried by an audio event.
    pub fn from_base64(id: FragmentId, payload: &str) -> Result<Self, PlaybackError> {
        let data = STANDARD.decode(payload.trim())?;
        if data.is_empty() {
            return Err(PlaybackError::EmptyClip);
        }
        Ok(Self::new(id, data))
    }

    pub fn id(&self) -> FragmentId {
        self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Identifies one playback attempt. `epoch` changes whenever the queue is
/// reset, so a late completion from a previous session never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackTicket {
    pub epoch: u64,
    pub fragment_id: FragmentId,
}

/// How one playback attempt ended, as reported by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub ticket: PlaybackTicket,
    /// Set when the clip could not be rendered after `play` had returned.
    pub error: Option<String>,
}

/// One-shot handle a player fires when a fragment has finished rendering.
#[derive(Debug)]
pub struct Completion {
    ticket: PlaybackTicket,
    tx: mpsc::UnboundedSender<PlaybackReport>,
}

impl Completion {
    pub fn new(ticket: PlaybackTicket, tx: mpsc::UnboundedSender<PlaybackReport>) -> Self {
        Self { ticket, tx }
    }

    pub fn ticket(&self) -> PlaybackTicket {
        self.ticket
    }

    /// Report natural end of playback. Safe to call from any thread.
    pub fn finish(self) {
        self.send(None);
    }

    /// Report that the clip was abandoned, e.g. it failed to decode in the
    /// background.
    pub fn fail(self, error: &PlaybackError) {
        self.send(Some(error.to_string()));
    }

    fn send(self, error: Option<String>) {
        let report = PlaybackReport {
            ticket: self.ticket,
            error,
        };
        if self.tx.send(report).is_err() {
            debug!(
                fragment_id = self.ticket.fragment_id,
                "completion receiver gone"
            );
        }
    }
}

/// An audio output that renders one fragment at a time.
///
/// The scheduler guarantees `play` is never called while a previous
/// fragment is still rendering.
pub trait FragmentPlayer: Send {
    /// Begin rendering `fragment` and return without waiting for it to end.
    /// Call `done.finish()` once the clip has been fully rendered, or
    /// `done.fail()` if it turns out to be unplayable later on.
    ///
    /// Runs on the scheduling task, so heavy work such as decoding belongs
    /// on a blocking thread. An `Err` means playback never started; `done`
    /// is dropped unfired.
    fn play(&mut self, fragment: Fragment, done: Completion) -> Result<(), PlaybackError>;

    /// Halt the current fragment, if any, without firing its completion.
    fn stop(&mut self);
}

impl<P: FragmentPlayer + ?Sized> FragmentPlayer for Box<P> {
    fn play(&mut self, fragment: Fragment, done: Completion) -> Result<(), PlaybackError> {
        (**self).play(fragment, done)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}
