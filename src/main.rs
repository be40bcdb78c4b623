use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_assistant::chat::{ChatMessage, Conversation, prompts_from_json};
use voice_assistant::config::{self, Config};
use voice_assistant::tts::synthesizer_from_settings;
use voice_assistant::voice::{
    AudioCapture, AudioPlayback, FrameAssembler, PLAYBACK_SAMPLE_RATE, SpeechClassifier,
    WebRtcClassifier, calculate_energy,
};
use voice_assistant::{
    AudioInput, AzureChatClient, ChatCompleter, Pipeline, SpeechSynthesizer, Transcriber,
    TurnOutcome, WhisperTranscriber,
};

/// Voice assistant - talk to Azure OpenAI through your microphone
#[derive(Parser)]
#[command(name = "voice-assistant", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Do not load any .env file
    #[arg(long, global = true, conflicts_with = "env_file")]
    no_dotenv: bool,

    /// TOML config file (default: ~/.config/omni/voice-assistant/config.toml)
    #[arg(short, long, global = true, env = "VOICE_ASSISTANT_CONFIG")]
    config: Option<PathBuf>,

    /// Synthesis backend: azure-speech or openai (overrides TTS_BACKEND)
    #[arg(long, global = true)]
    tts_backend: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the assistant (default)
    Run(RunArgs),
    /// Show which variables are set and fail if a required one is missing
    CheckConfig,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Transcribe an audio file
    Transcribe {
        /// Audio file (wav, mp3, m4a, ...)
        file: PathBuf,
    },
    /// Send one message to the chat model
    Chat {
        /// Message text
        text: String,
        /// JSON prompt list to send before the message instead of the system prompt
        #[arg(long)]
        prompts: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Number of turns before exiting
    #[arg(short = 'n', long, default_value = "1")]
    turns: usize,

    /// Maximum recording length in seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Trailing silence in seconds that ends a recording
    #[arg(long)]
    max_silence: Option<f64>,

    /// Save captured and synthesized audio into this directory
    #[arg(long)]
    save_audio: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            turns: 1,
            max_duration: None,
            max_silence: None,
            save_audio: None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let directives = match cli.verbose {
        0 => "info,voice_assistant=info",
        1 => "info,voice_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(directives),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None => cmd_run(&cli, &RunArgs::default()).await,
        Some(Command::Run(ref args)) => cmd_run(&cli, args).await,
        Some(Command::CheckConfig) => check_config(&cli),
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { ref text }) => test_tts(&cli, text).await,
        Some(Command::Transcribe { ref file }) => transcribe(&cli, file).await,
        Some(Command::Chat {
            ref text,
            ref prompts,
        }) => chat(&cli, text, prompts.as_deref()).await,
    }
}

/// Resolve the session configuration from .env, environment and config file
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if !cli.no_dotenv {
        config::load_dotenv(cli.env_file.as_deref())?;
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_env_with_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(backend) = &cli.tts_backend {
        config.tts_backend = backend.parse()?;
    }

    config.audio.log_audio_server();
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn positive_secs(flag: &str, secs: f64) -> anyhow::Result<Duration> {
    anyhow::ensure!(
        secs.is_finite() && secs > 0.0,
        "{flag} must be a positive number of seconds"
    );
    Ok(Duration::from_secs_f64(secs))
}

/// Run the assistant loop
#[allow(clippy::future_not_send)]
async fn cmd_run(cli: &Cli, args: &RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    if let Some(secs) = args.max_duration {
        config.audio.max_duration = positive_secs("--max-duration", secs)?;
    }
    if let Some(secs) = args.max_silence {
        config.audio.max_silence = positive_secs("--max-silence", secs)?;
    }

    let mut pipeline = Pipeline::from_config(&config)?;
    if let Some(dir) = &args.save_audio {
        pipeline = pipeline.with_save_dir(dir);
    }

    tracing::info!(
        turns = args.turns,
        backend = %config.tts_backend,
        "voice assistant ready - start speaking"
    );

    for outcome in pipeline.run(args.turns).await? {
        match outcome {
            TurnOutcome::Silent => println!("(no speech detected)"),
            TurnOutcome::Completed(turn) => {
                println!("You: {}", turn.transcript);
                println!("Assistant: {}", turn.response);
            }
        }
    }

    Ok(())
}

/// Print the variable contract with presence and redacted values
fn check_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;

    println!("TTS backend: {}\n", config.tts_backend);
    println!("{:<22} {:<9} {:<9} VALUE", "VARIABLE", "STATUS", "REQUIRED");
    for report in config.var_report() {
        let status = if report.value.is_some() { "set" } else { "missing" };
        let required = if report.required { "yes" } else { "no" };
        println!(
            "{:<22} {:<9} {:<9} {}",
            report.info.name,
            status,
            required,
            report.value.as_deref().unwrap_or("-")
        );
    }

    let missing = config.missing_vars();
    anyhow::ensure!(
        missing.is_empty(),
        "missing required variables: {}",
        missing.join(", ")
    );
    config.validate()?;

    println!("\nAll required variables are set.");
    Ok(())
}

/// Test microphone input with a level meter and VAD readout
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    let mut rx = capture.start()?;
    let mut vad = WebRtcClassifier::new(3);
    let mut assembler = FrameAssembler::new();

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut samples = Vec::new();
        while let Ok(Some(chunk)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            samples.extend(chunk);
        }

        let mut frames = 0usize;
        let mut speech = 0usize;
        for frame in assembler.push(&samples) {
            frames += 1;
            if vad.is_speech(&frame)? {
                speech += 1;
            }
        }

        let energy = calculate_energy(&samples);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | speech frames: {:3}/{:3} | [{}]",
            i + 1,
            energy,
            speech,
            frames,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is PULSE_SERVER pointing at the right socket?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE * 2)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());
    playback.play_samples(&samples, PLAYBACK_SAMPLE_RATE).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Synthesize text with the configured backend and play it
#[allow(clippy::future_not_send)]
async fn test_tts(cli: &Cli, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = load_config(cli)?;
    let synthesizer = synthesizer_from_settings(config.synthesis()?)?;

    println!("Synthesizing speech with {}...", synthesizer.name());
    let audio = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of {:?} audio", audio.len(), audio.format);

    println!("Playing audio...");
    AudioPlayback::new()?.play_audio(&audio).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Transcribe a file from disk
async fn transcribe(cli: &Cli, file: &std::path::Path) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let transcriber = WhisperTranscriber::new(config.transcription()?)?;

    let input = AudioInput::from_file(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let transcript = transcriber.transcribe(&input).await?;

    println!("{transcript}");
    Ok(())
}

/// Send a single message and print the reply
async fn chat(cli: &Cli, text: &str, prompts: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let client = AzureChatClient::new(config.chat()?)?;

    let messages = match prompts {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut messages = prompts_from_json(&raw)?;
            messages.push(ChatMessage::user(text));
            messages
        }
        None => Conversation::from_config(&config.chat).prompt_for(text),
    };

    let reply = client.complete(&messages).await?;
    println!("{reply}");
    Ok(())
}
