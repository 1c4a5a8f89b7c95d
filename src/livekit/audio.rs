//! Audio between the room and the speech model.
//!
//! Both sides use 16-bit mono PCM at the speech model's rate. The SDK stream
//! resamples caller audio to that rate on the way in.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use livekit::track::RemoteAudioTrack;
use livekit::webrtc::audio_frame::AudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::realtime::BoxedRealtime;

/// Caller audio is batched into 50 ms chunks before it goes to the model.
const INPUT_CHUNK_MS: u32 = 50;

/// Model audio is pushed to the room in 10 ms frames.
const OUTPUT_FRAME_MS: u32 = 10;

pub fn pcm16_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn samples_to_pcm16(samples: &[i16]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    pcm
}

fn samples_per(sample_rate: u32, ms: u32) -> usize {
    ((sample_rate * ms) / 1000).max(1) as usize
}

/// Feed one remote audio track to the speech model until cancelled.
///
/// Audio is dropped while `gate` is closed.
pub async fn bridge_input(
    track: RemoteAudioTrack,
    provider: Arc<Mutex<BoxedRealtime>>,
    gate: Arc<AtomicBool>,
    sample_rate: u32,
    cancel: CancellationToken,
) {
    let mut stream = NativeAudioStream::new(track.rtc_track(), sample_rate as i32, 1);
    let chunk_bytes = samples_per(sample_rate, INPUT_CHUNK_MS) * 2;
    let mut pending: Vec<u8> = Vec::with_capacity(chunk_bytes);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        if !gate.load(Ordering::Relaxed) {
            pending.clear();
            continue;
        }

        pending.extend_from_slice(&samples_to_pcm16(&frame.data));
        if pending.len() < chunk_bytes {
            continue;
        }

        let chunk = Bytes::from(std::mem::replace(
            &mut pending,
            Vec::with_capacity(chunk_bytes),
        ));
        if let Err(e) = provider.lock().await.send_audio(chunk).await {
            debug!("Dropping caller audio: {}", e);
        }
    }

    stream.close();
    debug!("Caller audio bridge stopped");
}

/// Play speech model audio into the room until cancelled.
pub async fn play_output(
    source: NativeAudioSource,
    mut audio: mpsc::UnboundedReceiver<Bytes>,
    gate: Arc<AtomicBool>,
    sample_rate: u32,
    cancel: CancellationToken,
) {
    let frame_samples = samples_per(sample_rate, OUTPUT_FRAME_MS);

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = audio.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        if !gate.load(Ordering::Relaxed) {
            continue;
        }

        let samples = pcm16_to_samples(&chunk);
        for frame in samples.chunks(frame_samples) {
            let frame = AudioFrame {
                data: Cow::Borrowed(frame),
                sample_rate,
                num_channels: 1,
                samples_per_channel: frame.len() as u32,
            };
            if let Err(e) = source.capture_frame(&frame).await {
                warn!("Failed to push agent audio: {}", e);
                break;
            }
        }
    }

    debug!("Agent audio playout stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_conversion() {
        let samples = [0i16, 1, -1, i16::MAX, i16::MIN];
        let pcm = samples_to_pcm16(&samples);
        assert_eq!(pcm.len(), 10);
        assert_eq!(&pcm[2..4], &[1, 0]);
        assert_eq!(&pcm[4..6], &[0xff, 0xff]);
        assert_eq!(pcm16_to_samples(&pcm), samples);
    }

    #[test]
    fn test_odd_trailing_byte_is_ignored() {
        assert_eq!(pcm16_to_samples(&[1, 0, 7]), vec![1]);
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(samples_per(24_000, OUTPUT_FRAME_MS), 240);
        assert_eq!(samples_per(16_000, INPUT_CHUNK_MS), 800);
    }
}
