use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parkeasy::audio::{
    CaptureBackend, CapturePipeline, OutputDevice, PlaybackScheduler, RenderedTimeline,
    WavFileBackend, WavRenderOutput,
};
use parkeasy::{
    create_router, AppState, AudioFile, Campus, Config, GeminiClient, GeminiLiveTransport,
    ParkingAssistant, SessionController, SessionPhase, VoiceSessionHandle,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "parkeasy")]
#[command(about = "Campus parking companion with a live voice assistant")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/parkeasy")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the lot feed simulation
    Serve,

    /// Hold one voice session, using a WAV file as the microphone
    Voice {
        /// 16-bit WAV to stream as microphone input
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the model's spoken replies
        #[arg(short, long, default_value = "reply.wav")]
        output: PathBuf,

        /// Seconds to keep listening after the input ends
        #[arg(long, default_value = "5")]
        linger: u64,
    },

    /// Talk to the voice assistant through the microphone and speaker
    #[cfg(feature = "cpal")]
    Talk {
        /// Input device name (host default when omitted)
        #[arg(long)]
        input_device: Option<String>,

        /// Output device name (host default when omitted)
        #[arg(long)]
        output_device: Option<String>,
    },

    /// Ask the parking assistant a question
    Advise { query: String },

    /// Print the current lot snapshot
    Lots,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("ParkEasy v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    if cfg.api_key.is_none() {
        warn!("No API key configured; assistant replies will use fallbacks");
    }

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Voice {
            input,
            output,
            linger,
        } => voice(&cfg, &input, &output, Duration::from_secs(linger)).await,
        #[cfg(feature = "cpal")]
        Command::Talk {
            input_device,
            output_device,
        } => talk(&cfg, input_device, output_device).await,
        Command::Advise { query } => {
            let campus = Campus::new(&cfg.campus);
            let lots = campus.feed().snapshot().await;
            println!("{}", assistant(&cfg).advice(&lots, &query).await);
            Ok(())
        }
        Command::Lots => {
            let campus = Campus::new(&cfg.campus);
            for lot in campus.feed().snapshot().await {
                println!(
                    "{:<28} {:>3}/{:<3} {:>5.1}%  {:?}",
                    lot.name,
                    lot.available_spots,
                    lot.total_spots,
                    lot.availability_percent(),
                    lot.band()
                );
            }
            Ok(())
        }
    }
}

fn assistant(cfg: &Config) -> ParkingAssistant {
    let client = GeminiClient::new(&cfg.assistant.endpoint, cfg.api_key.clone());
    ParkingAssistant::new(Arc::new(client), cfg.assistant.clone())
}

/// Wire a controller around a WAV microphone and a rendered output timeline
fn voice_session(
    cfg: &Config,
    input: &Path,
) -> (VoiceSessionHandle, JoinHandle<()>, RenderedTimeline) {
    let backend = WavFileBackend::new(input, cfg.voice.capture_config());
    let output = WavRenderOutput::new(cfg.voice.output_sample_rate);
    let timeline = output.timeline();

    let (handle, task) = spawn_session(cfg, Box::new(backend), Box::new(output));
    (handle, task, timeline)
}

fn spawn_session(
    cfg: &Config,
    backend: Box<dyn CaptureBackend>,
    output: Box<dyn OutputDevice>,
) -> (VoiceSessionHandle, JoinHandle<()>) {
    let transport = GeminiLiveTransport::new(
        cfg.voice.endpoint.clone(),
        cfg.api_key.clone(),
        cfg.voice.pending_capacity,
    );

    let controller = SessionController::new(
        cfg.voice.session_config(),
        Arc::new(transport),
        CapturePipeline::new(backend),
        PlaybackScheduler::new(output),
    );

    VoiceSessionHandle::spawn(controller)
}

/// Wait until a toggled session is Active; false when it fell back to Idle
async fn wait_until_open(handle: &VoiceSessionHandle) -> Result<bool> {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            match handle.phase() {
                SessionPhase::Active => return true,
                SessionPhase::Idle => return false,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await
    .context("Timed out waiting for the voice session to open")
}

async fn serve(cfg: Config) -> Result<()> {
    let campus = Campus::new(&cfg.campus);
    let _simulation = campus
        .feed()
        .spawn_simulation(cfg.campus.tick_interval(), campus.tray().clone());

    let mut state = AppState::new(campus, assistant(&cfg));

    if let Some(input) = cfg.voice.input_wav.as_deref() {
        info!("Voice session enabled, microphone input from {}", input);
        let (handle, _task, _timeline) = voice_session(&cfg, Path::new(input));
        state = state.with_voice(handle);
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}

async fn voice(cfg: &Config, input: &Path, output: &Path, linger: Duration) -> Result<()> {
    let input_duration = Duration::from_secs_f64(AudioFile::open(input)?.duration_seconds);
    let (handle, task, timeline) = voice_session(cfg, input);

    handle.toggle().await?;

    if !wait_until_open(&handle).await? {
        bail!("Voice session failed to open");
    }

    info!("Voice session active, streaming {:.1}s of input", input_duration.as_secs_f64());
    tokio::time::sleep(input_duration + linger).await;

    let stats = handle.stats().await?;
    handle.stop().await?;
    drop(handle);
    task.await?;

    info!(
        "Session ended: {} frames sent, {} reply segments, {} decode failures",
        stats.frames_sent, stats.segments_scheduled, stats.decode_failures
    );

    let written = timeline.write_wav(output)?;
    info!("Wrote {} samples to {}", written, output.display());

    Ok(())
}

#[cfg(feature = "cpal")]
async fn talk(cfg: &Config, input_device: Option<String>, output_device: Option<String>) -> Result<()> {
    use parkeasy::audio::{CpalCaptureBackend, CpalOutputDevice};

    let output = CpalOutputDevice::open(output_device).await?;
    let backend = CpalCaptureBackend::new(input_device, cfg.voice.capture_config());
    let (handle, task) = spawn_session(cfg, Box::new(backend), Box::new(output));

    handle.toggle().await?;
    if !wait_until_open(&handle).await? {
        bail!("Voice session failed to open");
    }

    info!("Listening, press Ctrl-C to end the session");
    tokio::signal::ctrl_c().await?;

    let stats = handle.stats().await?;
    handle.stop().await?;
    drop(handle);
    task.await?;

    info!(
        "Session ended after {:.1}s: {} frames sent, {} reply segments",
        stats.duration_secs, stats.frames_sent, stats.segments_scheduled
    );
    Ok(())
}
