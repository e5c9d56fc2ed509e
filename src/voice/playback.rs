//! Audio playback to speakers
//!
//! Plays one streaming audio source at a time through the default output
//! device, exposing a playing/not-playing signal for the UI.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample rate of synthesized audio
pub const PLAYBACK_SAMPLE_RATE: u32 = 44100;

/// Device buffer target: ~20ms at the playback rate, to bound latency
const BUFFER_FRAMES: u32 = 882;

/// Capacity of a source's chunk channel
const SOURCE_CHANNEL_CAPACITY: usize = 32;

/// A playable stream of mono f32 sample chunks
///
/// Chunks keep arriving in the background while playback is already
/// underway; the source is exhausted when its sender side closes.
pub struct AudioSource {
    rx: mpsc::Receiver<Vec<f32>>,
    sample_rate: u32,
}

impl AudioSource {
    /// Create a source and the sender that feeds it
    #[must_use]
    pub fn channel(sample_rate: u32) -> (mpsc::Sender<Vec<f32>>, Self) {
        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        (tx, Self { rx, sample_rate })
    }

    /// Wrap an already-complete sample buffer as a source
    #[must_use]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let chunks: Vec<Vec<f32>> = samples.chunks(4096).map(<[f32]>::to_vec).collect();
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // Capacity matches the chunk count, so try_send cannot fail
            let _ = tx.try_send(chunk);
        }
        Self { rx, sample_rate }
    }

    /// Receive the next chunk; `None` once the source is exhausted
    pub async fn next_chunk(&mut self) -> Option<Vec<f32>> {
        self.rx.recv().await
    }

    /// Sample rate of the source audio
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Clears the playing flag when playback unwinds, on success or error
struct PlayingGuard(Arc<AtomicBool>);

impl PlayingGuard {
    fn engage(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Arc::clone(flag))
    }
}

impl Drop for PlayingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Plays audio to the default output device
///
/// One playback slot with wait semantics: `play` borrows the instance
/// mutably and runs to completion, so an overlapping caller waits for the
/// prior utterance to finish rather than clipping it.
#[derive(Default)]
pub struct AudioPlayback {
    playing: Arc<AtomicBool>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a source is currently being played
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Play a source to completion
    ///
    /// Sets the playing signal on entry and clears it when the source is
    /// drained or playback fails.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackFailed` if the output device cannot be opened or the
    /// stream cannot be started.
    #[allow(clippy::future_not_send)]
    pub async fn play(&mut self, mut source: AudioSource) -> Result<()> {
        let _playing = PlayingGuard::engage(&self.playing);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::PlaybackFailed("no output device available".to_string()))?;

        let sample_rate = source.sample_rate();
        let supported = pick_output_config(&device, sample_rate)?;
        let mut config = supported.config();
        config.buffer_size = BufferSize::Fixed(BUFFER_FRAMES);
        let channels = config.channels as usize;

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue_out = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue_out.lock().unwrap();
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::PlaybackFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::PlaybackFailed(e.to_string()))?;

        // Feed until the source closes, then wait for the queue to drain
        let mut played = 0usize;
        while let Some(chunk) = source.next_chunk().await {
            played += chunk.len();
            queue.lock().unwrap().extend(chunk);
        }

        while !queue.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Let the device buffer itself empty out
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(stream);
        tracing::debug!(samples = played, "playback complete");

        Ok(())
    }
}

/// Pick an output config at the given rate: mono preferred, stereo fallback
fn pick_output_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let rate = SampleRate(sample_rate);

    device
        .supported_output_configs()
        .map_err(|e| Error::PlaybackFailed(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .or_else(|| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
        })
        .map(|c| c.with_sample_rate(rate))
        .ok_or_else(|| Error::PlaybackFailed("no suitable output config found".to_string()))
}
