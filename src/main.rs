use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley::config::VOICE_API_KEY_VAR;
use parley::voice::{AudioCapture, AudioPlayback, AudioSource, PLAYBACK_SAMPLE_RATE, TextToSpeech};
use parley::{Orchestrator, Settings, SharedSettings};

/// Parley - push-to-talk voice agent
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test speech synthesis output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the speech synthesis pipeline.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    converse().await
}

/// Run the push-to-talk loop on stdin
#[allow(clippy::future_not_send)]
async fn converse() -> anyhow::Result<()> {
    let settings = SharedSettings::new(Settings::default());
    let mut orchestrator = Orchestrator::from_env(settings)?;

    println!("parley ready - press Enter to talk, Enter again to stop, q to quit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await? {
            // A closed stdin while recording is the focus-loss case: force
            // the stop transition instead of leaving the mic open
            None => {
                orchestrator.focus_lost().await;
                break;
            }
            Some(line) if line.trim() == "q" => {
                orchestrator.focus_lost().await;
                break;
            }
            Some(_) => {
                if orchestrator.is_recording() {
                    orchestrator.stop_recording().await;
                    for message in orchestrator.history().iter().rev().take(2).rev() {
                        println!("[{:?}] {}", message.role, message.content);
                    }
                } else if orchestrator.start_recording().is_ok() {
                    println!("recording... press Enter to stop");
                }
            }
        }
    }

    tracing::info!("parley stopped");
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new();
    capture.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let level = capture.level();

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level / 2.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] level: {level:5.1} | [{meter}]", i + 1);
    }

    let clip = capture.stop();

    println!("\n---");
    match clip {
        Some(clip) => {
            println!(
                "Captured {} samples ({:.1}s at {} Hz)",
                clip.samples.len(),
                clip.duration_secs(),
                clip.sample_rate
            );
            println!("If the meter moved while you spoke, your mic is working!");
        }
        None => println!("No clip captured"),
    }

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new();

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    playback
        .play(AudioSource::from_samples(samples, PLAYBACK_SAMPLE_RATE))
        .await?;

    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

/// Test speech synthesis end to end
#[allow(clippy::future_not_send)]
async fn test_tts(text: &str) -> anyhow::Result<()> {
    let api_key = std::env::var(VOICE_API_KEY_VAR)
        .ok()
        .filter(|k| !k.is_empty());
    let tts = TextToSpeech::new(api_key.map(Into::into));

    if !tts.is_enabled() {
        println!("No voice credential set ({VOICE_API_KEY_VAR}) - synthesis is disabled");
        return Ok(());
    }

    println!("Synthesizing: {text}");
    let voice = Settings::default().voice;

    match tts.synthesize(text, &voice).await? {
        Some(source) => {
            let mut playback = AudioPlayback::new();
            playback.play(source).await?;
            println!("Done.");
        }
        None => println!("Service produced no audio"),
    }

    Ok(())
}
