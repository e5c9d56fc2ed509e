//! Audio capture from microphone
//!
//! One recording session per push-to-talk press: the device is acquired on
//! `start`, encoded chunks buffer in arrival order, a frame-cadence meter
//! publishes the input loudness, and `stop` tears everything down and hands
//! back the finalized clip.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, SupportedStreamConfig};

use crate::{Error, Result};

/// Preferred sample rate for capture (16kHz for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Cadence of the loudness meter (roughly one display frame)
const METER_INTERVAL: Duration = Duration::from_millis(16);

/// Scale from RMS energy (speech sits well under 0.25) to the 0-100 meter
const LEVEL_SCALE: f32 = 400.0;

/// A finalized recording: capture chunks concatenated in arrival order
#[derive(Debug, Clone)]
pub struct Clip {
    /// Mono samples in the range [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate the clip was captured at
    pub sample_rate: u32,
}

impl Clip {
    /// Duration of the clip in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Encode the clip as 16-bit PCM WAV for upload
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

            for &sample in &self.samples {
                #[allow(clippy::cast_possible_truncation)]
                let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
            }

            writer
                .finalize()
                .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Everything owned by one recording session, torn down together on stop
struct RecordingSession {
    stream: Stream,
    chunks: Arc<Mutex<Vec<Vec<f32>>>>,
    sample_rate: u32,
    meter: tokio::task::JoinHandle<()>,
}

/// Captures audio from the default input device
///
/// Holds nothing between sessions; every `start` acquires the device anew so
/// device failures stay local to the press that hit them.
#[derive(Default)]
pub struct AudioCapture {
    session: Option<RecordingSession>,
    level: Arc<Mutex<f32>>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a recording session
    ///
    /// Calling while already recording is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no input device can be acquired and
    /// `UnsupportedFormat` if the device offers no encoding this crate can
    /// consume; recording does not start in either case.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supported = pick_input_config(&device)?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let sample_rate = config.sample_rate.0;

        let chunks = Arc::new(Mutex::new(Vec::new()));
        let stream = build_input_stream(&device, &config, sample_format, Arc::clone(&chunks))?;

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        let meter = spawn_meter(Arc::clone(&chunks), Arc::clone(&self.level));

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            format = ?sample_format,
            "recording started"
        );

        self.session = Some(RecordingSession {
            stream,
            chunks,
            sample_rate,
            meter,
        });

        Ok(())
    }

    /// Stop recording and finalize the clip
    ///
    /// Cancels the loudness task, resets the level to zero, releases the
    /// device, and concatenates the buffered chunks in arrival order.
    /// Returns `None` when no recording is in progress.
    pub fn stop(&mut self) -> Option<Clip> {
        let session = self.session.take()?;

        session.meter.abort();
        *self.level.lock().unwrap() = 0.0;

        // Dropping the stream releases the hardware track
        drop(session.stream);

        let chunks = std::mem::take(&mut *session.chunks.lock().unwrap());
        let samples: Vec<f32> = chunks.into_iter().flatten().collect();

        tracing::debug!(samples = samples.len(), "recording stopped");

        Some(Clip {
            samples,
            sample_rate: session.sample_rate,
        })
    }

    /// Whether a recording session is active
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Latest loudness sample, normalized to roughly 0-100
    #[must_use]
    pub fn level(&self) -> f32 {
        *self.level.lock().unwrap()
    }
}

/// Pick an input config: mono preferred, at the speech sample rate if offered
fn pick_input_config(device: &cpal::Device) -> Result<SupportedStreamConfig> {
    let configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .collect();

    if configs.is_empty() {
        return Err(Error::DeviceUnavailable(
            "input device offers no configurations".to_string(),
        ));
    }

    let rate = SampleRate(CAPTURE_SAMPLE_RATE);
    let usable = |f: SampleFormat| matches!(f, SampleFormat::F32 | SampleFormat::I16);

    // Mono at 16kHz first, then any mono config, falling back to its own rate
    let chosen = configs
        .iter()
        .find(|c| {
            c.channels() == 1
                && usable(c.sample_format())
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
        .map(|c| c.with_sample_rate(rate))
        .or_else(|| {
            configs
                .iter()
                .find(|c| c.channels() == 1 && usable(c.sample_format()))
                .map(|c| c.with_max_sample_rate())
        });

    chosen.ok_or_else(|| {
        if configs.iter().any(|c| c.channels() == 1) {
            Error::UnsupportedFormat("no supported sample encoding on input device".to_string())
        } else {
            Error::DeviceUnavailable("no mono input configuration available".to_string())
        }
    })
}

/// Build the cpal input stream, converting samples to f32 chunks
fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    chunks: Arc<Mutex<Vec<Vec<f32>>>>,
) -> Result<Stream> {
    let err_fn = |err| {
        tracing::error!(error = %err, "audio capture error");
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = chunks.lock() {
                    buf.push(data.to_vec());
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = chunks.lock() {
                    buf.push(data.iter().map(|&s| f32::from(s) / 32768.0).collect());
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "sample format {other:?} not supported"
            )));
        }
    };

    stream.map_err(|e| Error::DeviceUnavailable(e.to_string()))
}

/// Start the per-session loudness task
///
/// Samples the newest capture chunk at display-frame cadence and publishes a
/// normalized magnitude. The handle is aborted exactly once, in `stop`.
fn spawn_meter(
    chunks: Arc<Mutex<Vec<Vec<f32>>>>,
    level: Arc<Mutex<f32>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METER_INTERVAL);
        loop {
            ticker.tick().await;
            let sample = chunks
                .lock()
                .ok()
                .and_then(|buf| buf.last().map(|chunk| chunk_level(chunk)))
                .unwrap_or(0.0);
            if let Ok(mut current) = level.lock() {
                *current = sample;
            }
        }
    })
}

/// Normalized loudness of one chunk: RMS energy scaled into 0-100
#[allow(clippy::cast_precision_loss)]
fn chunk_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();
    (rms * LEVEL_SCALE).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_concatenation_preserves_arrival_order() {
        let chunks = vec![vec![0.1, 0.2], vec![0.3], vec![0.4, 0.5]];
        let samples: Vec<f32> = chunks.into_iter().flatten().collect();
        assert_eq!(samples, [0.1, 0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn silence_levels_at_zero() {
        assert_eq!(chunk_level(&[]), 0.0);
        assert_eq!(chunk_level(&[0.0; 512]), 0.0);
    }

    #[test]
    fn loud_signal_caps_at_hundred() {
        let loud = vec![1.0_f32; 512];
        assert!((chunk_level(&loud) - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn stop_without_recording_is_a_noop() {
        let mut capture = AudioCapture::new();
        assert!(capture.stop().is_none());
        assert!(!capture.is_recording());
        assert_eq!(capture.level(), 0.0);
    }

    #[test]
    fn wav_encoding_roundtrips() {
        let clip = Clip {
            samples: vec![0.0, 0.5, -0.5, 1.0, -1.0],
            sample_rate: CAPTURE_SAMPLE_RATE,
        };
        let wav = clip.to_wav().unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, CAPTURE_SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.samples::<i16>().count(), clip.samples.len());
    }
}
