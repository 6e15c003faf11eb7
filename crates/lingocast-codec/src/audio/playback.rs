// cpal speaker output that renders one narration fragment at a time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate as CpalSampleRate, StreamConfig};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::decode::{decode_clip, resample_mono};
use super::fragment::{Completion, Fragment, FragmentId, FragmentPlayer};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("audio decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("unsupported clip: {0}")]
    UnsupportedClip(&'static str),
    #[error("clip contains no audio")]
    EmptyClip,
    #[error("no output device available")]
    NoOutputDevice,
    #[error("output device lost")]
    DeviceLost,
    #[error("cpal default stream config error: {0}")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("cpal build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("cpal play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("resampler error: {0}")]
    Resampler(String),
    #[error("output thread error: {0}")]
    Thread(String),
}

/// State shared between the control API and the output callback.
#[derive(Default)]
struct OutputState {
    /// Mono samples at device rate for the fragment being rendered.
    samples: VecDeque<f32>,
    current: Option<(FragmentId, Completion)>,
    /// Bumped by every `play` and `stop`; a clip decoded for an older value
    /// is discarded.
    generation: u64,
}

impl OutputState {
    /// Fire the completion once the current clip has been fully rendered.
    fn finish_if_drained(&mut self) {
        if self.samples.is_empty() {
            if let Some((fragment_id, done)) = self.current.take() {
                debug!(fragment_id, "fragment rendered");
                done.finish();
            }
        }
    }
}

/// Speaker output for narration.
///
/// The cpal stream lives on a dedicated thread (streams are not `Send`);
/// this handle only shares the sample queue with it.
pub struct CpalPlayer {
    state: Arc<Mutex<OutputState>>,
    stop_flag: Arc<AtomicBool>,
    device_sample_rate: u32,
    shutdown_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalPlayer {
    /// Open the default output device.
    pub fn start() -> Result<Self, PlaybackError> {
        let state = Arc::new(Mutex::new(OutputState::default()));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, PlaybackError>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let thread_state = state.clone();
        let thread_stop = stop_flag.clone();
        let thread = std::thread::Builder::new()
            .name("lingocast-audio-out".into())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    let _ = ready_tx.send(Err(PlaybackError::NoOutputDevice));
                    return;
                };
                let device_name = device.name().unwrap_or_else(|_| "unknown".into());
                info!(device = %device_name, "opening audio output device");

                match open_stream(device, thread_state, thread_stop) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        // Keep the stream alive until the handle is dropped.
                        let _ = shutdown_rx.recv();
                        drop(stream);
                        debug!("audio output thread exiting");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| PlaybackError::Thread(e.to_string()))?;

        let device_sample_rate = ready_rx
            .recv()
            .map_err(|e| PlaybackError::Thread(e.to_string()))??;

        Ok(Self {
            state,
            stop_flag,
            device_sample_rate,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn device_sample_rate(&self) -> u32 {
        self.device_sample_rate
    }

    /// Whether the output device is still usable.
    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
    }
}

impl FragmentPlayer for CpalPlayer {
    fn play(&mut self, fragment: Fragment, done: Completion) -> Result<(), PlaybackError> {
        if !self.is_running() {
            return Err(PlaybackError::DeviceLost);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlaybackError::Thread(e.to_string()))?;
        let generation = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| PlaybackError::Thread("output state poisoned".into()))?;
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };

        // Decoding and resampling stay off the scheduling task.
        let shared = self.state.clone();
        let device_rate = self.device_sample_rate;
        runtime.spawn_blocking(move || {
            let rendered = render_clip(fragment.data(), device_rate);
            deliver(&shared, generation, fragment.id(), rendered, done);
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.generation = state.generation.wrapping_add(1);
            state.samples.clear();
            if let Some((fragment_id, _done)) = state.current.take() {
                debug!(fragment_id, "fragment halted");
            }
        }
    }
}

impl Drop for CpalPlayer {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.stop();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("audio output thread panicked");
            }
        }
        debug!("audio playback dropped");
    }
}

/// Decode a clip and resample it to mono at the device rate.
fn render_clip(data: &bytes::Bytes, device_rate: u32) -> Result<Vec<f32>, PlaybackError> {
    let clip = decode_clip(data)?;
    let pcm = resample_mono(&clip.to_mono(), clip.sample_rate, device_rate)?;
    if pcm.is_empty() {
        return Err(PlaybackError::EmptyClip);
    }
    debug!(
        duration_ms = clip.duration().as_millis() as u64,
        "fragment decoded"
    );
    Ok(pcm)
}

/// Hand decoded samples to the output callback, unless the player was
/// stopped or moved on while the clip was decoding.
fn deliver(
    shared: &Mutex<OutputState>,
    generation: u64,
    fragment_id: FragmentId,
    rendered: Result<Vec<f32>, PlaybackError>,
    done: Completion,
) {
    let Ok(mut state) = shared.lock() else {
        done.fail(&PlaybackError::Thread("output state poisoned".into()));
        return;
    };
    if state.generation != generation {
        debug!(fragment_id, "fragment stopped before it was loaded");
        return;
    }
    match rendered {
        Ok(pcm) => {
            debug!(fragment_id, "rendering fragment");
            state.samples.clear();
            state.samples.extend(pcm);
            state.current = Some((fragment_id, done));
        }
        Err(e) => {
            warn!(fragment_id, error = %e, "fragment could not be decoded");
            drop(state);
            done.fail(&e);
        }
    }
}

fn open_stream(
    device: Device,
    state: Arc<Mutex<OutputState>>,
    stop_flag: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32), PlaybackError> {
    let config = device.default_output_config()?;
    let device_sample_rate = config.sample_rate().0;
    let device_channels = config.channels() as usize;
    let sample_format = config.sample_format();

    info!(
        sample_rate = device_sample_rate,
        channels = device_channels,
        format = ?sample_format,
        "output device config"
    );

    let stream_config = StreamConfig {
        channels: config.channels(),
        sample_rate: CpalSampleRate(device_sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let error_callback = {
        let stop = stop_flag.clone();
        move |err: cpal::StreamError| {
            error!(%err, "audio playback stream error");
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                stop.store(true, Ordering::SeqCst);
            }
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            build_output_callback::<i16>(state, stop_flag, device_channels),
            error_callback,
            None,
        )?,
        _ => device.build_output_stream(
            &stream_config,
            build_output_callback::<f32>(state, stop_flag, device_channels),
            error_callback,
            None,
        )?,
    };

    stream.play()?;
    info!("audio playback started");
    Ok((stream, device_sample_rate))
}

trait FromF32Sample: cpal::SizedSample {
    fn from_f32_sample(s: f32) -> Self;
}

impl FromF32Sample for f32 {
    #[inline]
    fn from_f32_sample(s: f32) -> Self {
        s
    }
}

impl FromF32Sample for i16 {
    #[inline]
    fn from_f32_sample(s: f32) -> Self {
        (s * 32767.0).clamp(-32768.0, 32767.0) as i16
    }
}

/// Build the cpal output callback.
fn build_output_callback<S: FromF32Sample>(
    state: Arc<Mutex<OutputState>>,
    stop_flag: Arc<AtomicBool>,
    device_channels: usize,
) -> impl FnMut(&mut [S], &cpal::OutputCallbackInfo) + Send + 'static {
    move |output: &mut [S], _info: &cpal::OutputCallbackInfo| {
        let silence = S::from_f32_sample(0.0);
        if stop_flag.load(Ordering::Relaxed) {
            output.fill(silence);
            return;
        }

        let Ok(mut state) = state.lock() else {
            output.fill(silence);
            return;
        };

        render_frames(&mut state, output, device_channels);
    }
}

/// Copy mono samples to every output channel, padding with silence.
fn render_frames<S: FromF32Sample>(state: &mut OutputState, output: &mut [S], channels: usize) {
    let channels = channels.max(1);
    for frame in output.chunks_mut(channels) {
        let sample = S::from_f32_sample(state.samples.pop_front().unwrap_or(0.0).clamp(-1.0, 1.0));
        frame.fill(sample);
    }
    state.finish_if_drained();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::wav_bytes;
    use crate::audio::fragment::{PlaybackReport, PlaybackTicket};
    use tokio::sync::mpsc;

    fn loaded_state(samples: &[f32], tx: mpsc::UnboundedSender<PlaybackReport>) -> OutputState {
        let ticket = PlaybackTicket {
            epoch: 1,
            fragment_id: 4,
        };
        OutputState {
            samples: samples.iter().copied().collect(),
            current: Some((4, Completion::new(ticket, tx))),
            generation: 0,
        }
    }

    fn completion(id: FragmentId, tx: &mpsc::UnboundedSender<PlaybackReport>) -> Completion {
        Completion::new(
            PlaybackTicket {
                epoch: 0,
                fragment_id: id,
            },
            tx.clone(),
        )
    }

    #[test]
    fn decoded_clip_is_loaded_for_its_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shared = Mutex::new(OutputState {
            generation: 3,
            ..OutputState::default()
        });
        let pcm = render_clip(&wav_bytes(8000, 1, &[1000i16; 80]), 8000).unwrap();
        assert_eq!(pcm.len(), 80);
        deliver(&shared, 3, 7, Ok(pcm), completion(7, &tx));

        let state = shared.lock().unwrap();
        assert_eq!(state.samples.len(), 80);
        assert_eq!(state.current.as_ref().map(|(id, _)| *id), Some(7));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stopped_clip_is_discarded_after_decoding() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shared = Mutex::new(OutputState {
            generation: 5,
            ..OutputState::default()
        });
        deliver(&shared, 4, 8, Ok(vec![0.5; 16]), completion(8, &tx));
        deliver(&shared, 4, 9, Err(PlaybackError::EmptyClip), completion(9, &tx));

        let state = shared.lock().unwrap();
        assert!(state.samples.is_empty() && state.current.is_none());
        drop(tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn undecodable_clip_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shared = Mutex::new(OutputState::default());
        let rendered = render_clip(&bytes::Bytes::from_static(b"garbage"), 48000);
        assert!(rendered.is_err());
        deliver(&shared, 0, 2, rendered, completion(2, &tx));

        let report = rx.try_recv().unwrap();
        assert_eq!(report.ticket.fragment_id, 2);
        assert!(report.error.is_some());
        assert!(shared.lock().unwrap().current.is_none());
    }

    #[test]
    fn render_duplicates_mono_to_all_channels() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = loaded_state(&[0.5, -0.5, 0.25], tx);
        let mut out = [0.0f32; 4];
        render_frames(&mut state, &mut out, 2);
        assert_eq!(out, [0.5, 0.5, -0.5, -0.5]);
        assert_eq!(state.samples.len(), 1);
        assert!(state.current.is_some());
    }

    #[test]
    fn completion_fires_once_clip_is_drained() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = loaded_state(&[0.1, 0.2], tx);
        let mut out = [0i16; 6];
        render_frames(&mut state, &mut out, 1);
        assert_eq!(out[2..], [0, 0, 0, 0]);
        assert!(state.current.is_none());
        assert_eq!(rx.try_recv().unwrap().ticket.fragment_id, 4);

        // Further callbacks render silence and fire nothing.
        render_frames(&mut state, &mut out, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn i16_conversion_clamps() {
        assert_eq!(i16::from_f32_sample(1.0), 32767);
        assert_eq!(i16::from_f32_sample(-1.0), -32767);
        assert_eq!(i16::from_f32_sample(0.0), 0);
    }
}
