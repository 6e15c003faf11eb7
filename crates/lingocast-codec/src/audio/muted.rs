// Silent output: keeps narration pacing without an audio device.

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::decode::decode_clip;
use super::fragment::{Completion, Fragment, FragmentPlayer};
use super::playback::PlaybackError;

/// Waits out each clip's natural duration instead of rendering it.
///
/// Must be driven from inside a tokio runtime. Clips are decoded on the
/// blocking pool; one that fails to decode is reported through
/// [`Completion::fail`].
#[derive(Default)]
pub struct MutedPlayer {
    current: Option<JoinHandle<()>>,
}

impl MutedPlayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FragmentPlayer for MutedPlayer {
    fn play(&mut self, fragment: Fragment, done: Completion) -> Result<(), PlaybackError> {
        let fragment_id = fragment.id();
        self.current = Some(tokio::spawn(async move {
            let data = fragment.data().clone();
            let decoded = tokio::task::spawn_blocking(move || decode_clip(&data)).await;
            let duration = match decoded {
                Ok(Ok(clip)) => clip.duration(),
                Ok(Err(e)) => {
                    warn!(fragment_id, error = %e, "fragment could not be decoded");
                    done.fail(&e);
                    return;
                }
                Err(e) => {
                    done.fail(&PlaybackError::Thread(e.to_string()));
                    return;
                }
            };
            debug!(
                fragment_id,
                duration_ms = duration.as_millis() as u64,
                "muted fragment"
            );
            tokio::time::sleep(duration).await;
            done.finish();
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::wav_bytes;
    use crate::audio::fragment::PlaybackTicket;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn ticket(id: u64) -> PlaybackTicket {
        PlaybackTicket {
            epoch: 0,
            fragment_id: id,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_clip_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = MutedPlayer::new();
        let clip = Fragment::new(1, wav_bytes(8000, 1, &vec![0i16; 4000]));
        player.play(clip, Completion::new(ticket(1), tx)).unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());

        let done = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.ticket, ticket(1));
        assert_eq!(done.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_suppresses_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = MutedPlayer::new();
        let clip = Fragment::new(2, wav_bytes(8000, 1, &vec![0i16; 800]));
        player
            .play(clip, Completion::new(ticket(2), tx.clone()))
            .unwrap();
        player.stop();
        drop(tx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn undecodable_clip_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = MutedPlayer::new();
        player
            .play(
                Fragment::new(3, &b"garbage"[..]),
                Completion::new(ticket(3), tx),
            )
            .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.ticket, ticket(3));
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn play_returns_before_decoding() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = MutedPlayer::new();
        let clip = Fragment::new(4, wav_bytes(8000, 1, &vec![0i16; 80]));
        player.play(clip, Completion::new(ticket(4), tx)).unwrap();
        // Nothing has run yet on this single-threaded runtime.
        assert!(rx.try_recv().is_err());

        let done = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.ticket, ticket(4));
    }
}
