// Compressed clip -> PCM, plus the mono/resample steps the output needs.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::playback::PlaybackError;

/// Input chunk size fed to the resampler.
const RESAMPLER_CHUNK_SIZE: usize = 1024;
/// Zero chunks pushed after the input to drain the filter delay.
const MAX_FLUSH_CHUNKS: usize = 8;

/// Interleaved PCM for one decoded clip.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Natural playback length of the clip.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.frames() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Average all channels down to one.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// Decode a self-contained clip (MP3 from the backend; WAV/OGG also accepted).
pub fn decode_clip(data: &Bytes) -> Result<DecodedClip, PlaybackError> {
    let source = Cursor::new(data.clone());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or(PlaybackError::UnsupportedClip("no default track"))?;
    let track_id = track.id;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A corrupt frame inside an otherwise good clip: skip it.
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!(msg, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let sample_rate = sample_rate.ok_or(PlaybackError::UnsupportedClip("unknown sample rate"))?;
    let channels = channels.ok_or(PlaybackError::UnsupportedClip("unknown channel count"))?;
    if samples.is_empty() {
        return Err(PlaybackError::EmptyClip);
    }

    Ok(DecodedClip {
        samples,
        sample_rate,
        channels,
    })
}

/// Resample a mono signal from `from_hz` to `to_hz`.
pub fn resample_mono(input: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>, PlaybackError> {
    if from_hz == to_hz || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_hz as usize,
        to_hz as usize,
        RESAMPLER_CHUNK_SIZE,
        1,
        1,
    )
    .map_err(|e| PlaybackError::Resampler(e.to_string()))?;

    let expected = (input.len() as f64 * to_hz as f64 / from_hz as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLER_CHUNK_SIZE);
    let mut chunk = vec![0.0f32; RESAMPLER_CHUNK_SIZE];

    // Input chunks, zero padded at the end, then flush the filter delay.
    let mut pos = 0;
    let mut flushes = 0;
    while pos < input.len() || (output.len() < expected + delay && flushes < MAX_FLUSH_CHUNKS) {
        chunk.fill(0.0);
        if pos < input.len() {
            let take = RESAMPLER_CHUNK_SIZE.min(input.len() - pos);
            chunk[..take].copy_from_slice(&input[pos..pos + take]);
            pos += take;
        } else {
            flushes += 1;
        }
        let out = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| PlaybackError::Resampler(e.to_string()))?;
        if let Some(channel) = out.first() {
            output.extend_from_slice(channel);
        }
    }

    let end = (delay + expected).min(output.len());
    Ok(output.get(delay..end).map(<[f32]>::to_vec).unwrap_or_default())
}
