use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vibeshift::normalizer::mime_type_for_path;
use vibeshift::{
    ApiKey, AppSession, AspectRatio, GeminiClient, GeminiConfig, GenerateOutcome, PollPolicy,
    SessionContext, Slot, SourceImage, TransitionStyle,
};

#[derive(Parser, Debug)]
#[command(name = "vibeshift", about = "Generate a cinematic transition video between two images")]
struct Cli {
    /// Starting frame
    #[arg(long)]
    start: PathBuf,

    /// Ending frame
    #[arg(long)]
    end: PathBuf,

    /// Transition style id (auto, drone, morph, portal, hyperlapse, geometric, tracking, custom)
    #[arg(long, default_value = "auto")]
    style: TransitionStyle,

    /// Free-form direction, implies the custom style
    #[arg(long)]
    custom: Option<String>,

    #[arg(long, default_value = "16:9")]
    aspect_ratio: AspectRatio,

    #[arg(long, default_value = "vibeshift-transition.mp4")]
    output: PathBuf,

    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    /// 0 waits forever
    #[arg(long, default_value_t = 600)]
    max_wait_secs: u64,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl Cli {
    fn transition_style(&self) -> TransitionStyle {
        match (&self.custom, &self.style) {
            (Some(text), _) => TransitionStyle::Custom(text.clone()),
            (None, style) => style.clone(),
        }
    }

    fn poll_policy(&self) -> PollPolicy {
        let max_wait = match self.max_wait_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        PollPolicy::fixed(Duration::from_secs(self.poll_interval_secs.max(1))).with_max_wait(max_wait)
    }

    fn api_key(&self) -> Option<ApiKey> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("API_KEY").ok())
            .and_then(ApiKey::new)
    }
}

async fn read_source(path: &Path) -> anyhow::Result<SourceImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    Ok(SourceImage::new(name, mime_type_for_path(path), bytes))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("Starting VibeShift");

    let config = GeminiConfig::from_env();
    let resolution = config.resolution.clone();
    let client = Arc::new(GeminiClient::new(config).context("Failed to set up the Gemini client")?);

    let context = SessionContext::new(client.clone(), client)
        .with_poll_policy(cli.poll_policy())
        .with_resolution(resolution);
    let session = AppSession::new(context);

    if let Some(api_key) = cli.api_key() {
        session.supply_api_key(api_key).await;
    }

    session
        .set_aspect_ratio(cli.aspect_ratio)
        .await
        .context("Failed to set aspect ratio")?;
    session
        .select_style(cli.transition_style())
        .await
        .context("Failed to select transition style")?;

    for (slot, path) in [(Slot::Start, &cli.start), (Slot::End, &cli.end)] {
        let source = read_source(path).await?;
        let image = session
            .load_image(slot, source)
            .await
            .with_context(|| format!("Failed to load {} from {}", slot, path.display()))?;
        info!("Loaded {}: {}x{} {}", slot, image.width, image.height, image.mime_type);
    }

    match session.generate().await.context("Failed to start generation")? {
        GenerateOutcome::Completed(handle) => {
            let bytes = session
                .video_bytes()
                .await
                .context("Generated video is no longer available")?;
            tokio::fs::write(&cli.output, bytes.as_slice())
                .await
                .with_context(|| format!("Failed to write {}", cli.output.display()))?;
            if let Some(prompt) = session.view().await.prompt {
                info!("Prompt: {}", prompt);
            }
            info!("Saved {} ({} bytes) to {}", handle.mime_type, handle.size, cli.output.display());
            Ok(())
        }
        GenerateOutcome::MissingImages => bail!("Both a start and an end image are required"),
        GenerateOutcome::Rejected(message) | GenerateOutcome::Failed(message) => {
            error!("Generation failed: {}", message);
            bail!(message)
        }
        GenerateOutcome::Cancelled => bail!("Generation was cancelled"),
    }
}
