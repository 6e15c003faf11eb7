use anyhow::{Context, Result};
use clap::Parser;
use lingocast_codec::{CpalPlayer, FragmentPlayer, MutedPlayer};
use lingocast_core::{Orchestrator, OrchestratorHandle};
use lingocast_media::ExternalViewer;
use lingocast_models::{Language, StatusBus};
use lingocast_util::validation::validate_language;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod console;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lingocast=info")),
        )
        .init();

    let args = cli::Args::parse();
    if args.list_languages {
        for language in Language::ALL {
            println!("{:<4}{}", language.code(), language.label());
        }
        return Ok(());
    }

    let config = config::Config::load(&args.config)?;
    let language = match args.lang.as_deref() {
        Some(code) => validate_language(code).context("invalid --lang")?,
        None => config.default_language()?,
    };

    let mut viewer_config = config.viewer_config();
    if args.no_video {
        viewer_config.enabled = false;
    }
    let player = build_player(config.player.audio && !args.no_audio);

    let status = StatusBus::default();
    let printer = console::spawn_status_printer(status.subscribe());

    let orchestrator = Orchestrator::new(
        config.orchestrator_config()?,
        player,
        ExternalViewer::new(viewer_config),
        status,
    );
    let (handle, commands) = OrchestratorHandle::new();
    let actor = tokio::spawn(orchestrator.run(commands));

    tracing::info!(
        backend = %config.backend.ws_url,
        lang = %language,
        "lingocast ready"
    );
    println!("{}", console::HELP);

    if let Some(url) = args.url {
        handle.start(url, language).await?;
    }

    console::read_commands(&handle, language).await?;

    // The actor may already be gone; shutting down twice is harmless.
    let _ = handle.shutdown().await;
    actor.await.context("player task failed")?;
    printer.abort();
    Ok(())
}

/// Speaker output when available, otherwise narration is paced silently.
fn build_player(audio: bool) -> Box<dyn FragmentPlayer> {
    if !audio {
        tracing::info!("audio disabled, narration will be muted");
        return Box::new(MutedPlayer::new());
    }
    match CpalPlayer::start() {
        Ok(player) => {
            tracing::info!(
                sample_rate = player.device_sample_rate(),
                "narration output ready"
            );
            Box::new(player)
        }
        Err(e) => {
            tracing::warn!(error = %e, "no usable audio output, narration will be muted");
            Box::new(MutedPlayer::new())
        }
    }
}
