use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;

use scenescribe_core::inference::{InferenceClient, Provider};
use scenescribe_core::session::{SessionConfig, SessionController, SessionEvent};
use scenescribe_core::source::SourceKind;

#[derive(Parser)]
#[command(name = "scenescribe-cli")]
#[command(about = "SceneScribe CLI — describe camera, video, or image frames via a vision model server")]
struct Cli {
    /// Inference server preset; sets the default base URL.
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,

    /// Base URL of the inference server (overrides the preset).
    #[arg(long)]
    base_url: Option<String>,

    /// Instruction sent with every frame.
    #[arg(long, default_value = "What do you see?")]
    instruction: String,

    /// Delay between ticks in milliseconds, measured from the end of one
    /// tick's work.
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Analyze a single image file and exit.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Annotate a local video file until Ctrl+C.
    #[cfg(feature = "ffmpeg")]
    #[arg(long)]
    video: Option<PathBuf>,

    /// Where to write the SRT captions on shutdown.
    #[cfg(any(feature = "ffmpeg", all(feature = "v4l-camera", target_os = "linux")))]
    #[arg(long, default_value = "captions.srt")]
    srt: PathBuf,

    /// Describe the live camera until Ctrl+C.
    #[cfg(all(feature = "v4l-camera", target_os = "linux"))]
    #[arg(long)]
    camera: bool,

    /// Camera device id (see --list-devices).
    #[cfg(all(feature = "v4l-camera", target_os = "linux"))]
    #[arg(long)]
    device: Option<String>,

    /// List available camera devices and exit.
    #[cfg(all(feature = "v4l-camera", target_os = "linux"))]
    #[arg(long)]
    list_devices: bool,

    /// Record the camera session and save it on shutdown.
    #[cfg(all(feature = "v4l-camera", target_os = "linux"))]
    #[arg(long)]
    record: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ProviderArg {
    Llamacpp,
    Lmstudio,
}

impl From<ProviderArg> for Provider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Llamacpp => Provider::LlamaCpp,
            ProviderArg::Lmstudio => Provider::LmStudio,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let base_url = cli.base_url.clone().unwrap_or_else(|| {
        let provider: Provider = cli.provider.map(Into::into).unwrap_or(Provider::LlamaCpp);
        provider.default_base_url().to_string()
    });

    #[cfg(all(feature = "v4l-camera", target_os = "linux"))]
    let record = cli.record;
    #[cfg(not(all(feature = "v4l-camera", target_os = "linux")))]
    let record = false;

    let config = SessionConfig {
        instruction: cli.instruction.clone(),
        period: Duration::from_millis(cli.interval_ms),
        base_url: base_url.clone(),
        recording_enabled: record,
    };
    info!(base_url, interval_ms = cli.interval_ms, "SceneScribe CLI starting");

    let client = Arc::new(InferenceClient::new(&base_url));
    let mut controller = SessionController::new(client, config);

    #[cfg(all(feature = "v4l-camera", target_os = "linux"))]
    {
        use scenescribe_core::source::v4l::V4lCameraDriver;
        controller
            .attach_camera(Box::new(V4lCameraDriver::new()))
            .await;

        if cli.list_devices {
            let devices = controller.list_camera_devices().await?;
            println!("Available camera devices:");
            for device in devices {
                println!("  [{}] {}", device.id, device.label);
            }
            return Ok(());
        }
    }

    // Single-shot image analysis.
    if let Some(path) = cli.image.as_ref() {
        let mut rx = controller.subscribe();
        controller
            .load_image(path)
            .await
            .with_context(|| format!("Failed to load image '{}'", path.display()))?;
        controller.switch_source(Some(SourceKind::Image)).await?;
        controller.request_start().await?;

        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Response(text) = event {
                println!("{text}");
                break;
            }
        }
        return Ok(());
    }

    #[cfg(feature = "ffmpeg")]
    if let Some(path) = cli.video.as_ref() {
        use scenescribe_core::media::FfmpegMediaFile;

        let media = FfmpegMediaFile::open(path)
            .with_context(|| format!("Failed to open video '{}'", path.display()))?;
        controller.load_video(Box::new(media)).await;
        controller.video_play().await;
        controller.switch_source(Some(SourceKind::Video)).await?;

        let printer = spawn_event_printer(controller.subscribe());
        controller.request_start().await?;
        info!("Annotating video. Press Ctrl+C to stop.");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl+c")?;
        info!("Shutting down...");
        controller.request_stop().await?;
        export_captions(&controller, &cli.srt).await?;
        printer.abort();
        return Ok(());
    }

    #[cfg(all(feature = "v4l-camera", target_os = "linux"))]
    if cli.camera {
        controller
            .switch_camera_device(cli.device.as_deref())
            .await?;
        controller.switch_source(Some(SourceKind::Camera)).await?;

        let printer = spawn_event_printer(controller.subscribe());
        controller.request_start().await?;
        info!("Describing camera. Press Ctrl+C to stop.");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl+c")?;
        info!("Shutting down...");
        controller.request_stop().await?;

        if let Some(artifact) = controller.take_recording() {
            let name = artifact.suggested_filename();
            std::fs::write(&name, artifact.into_bytes())
                .with_context(|| format!("Failed to write '{name}'"))?;
            info!(file = name, "Recording saved");
        }
        export_captions(&controller, &cli.srt).await?;
        printer.abort();
        return Ok(());
    }

    anyhow::bail!("Nothing to do: pass --image, or enable a capture mode (--video, --camera)");
}

#[cfg(any(feature = "ffmpeg", all(feature = "v4l-camera", target_os = "linux")))]
async fn export_captions(controller: &SessionController, path: &std::path::Path) -> Result<()> {
    match controller.captions_srt().await {
        Some(srt) => {
            std::fs::write(path, srt)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            info!(file = %path.display(), "Captions saved");
        }
        None => info!("No captions to export"),
    }
    Ok(())
}

#[cfg(any(feature = "ffmpeg", all(feature = "v4l-camera", target_os = "linux")))]
fn spawn_event_printer(
    mut rx: tokio::sync::broadcast::Receiver<SessionEvent>,
) -> tokio::task::JoinHandle<()> {
    use tokio::sync::broadcast;
    use tracing::warn;

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Response(text)) => println!("{text}"),
                Ok(SessionEvent::Status(text)) => info!("{text}"),
                Ok(SessionEvent::SamplingChanged { active }) => info!(active, "Sampling"),
                Ok(SessionEvent::RecordingChanged { active }) => info!(active, "Recording"),
                Ok(SessionEvent::RecordingReady {
                    mime_type,
                    byte_len,
                }) => info!(mime_type, byte_len, "Recording ready to save"),
                Ok(SessionEvent::CaptionsReady { intervals }) => {
                    info!(intervals, "Captions ready to export")
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event printer lagging, skipped events")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
