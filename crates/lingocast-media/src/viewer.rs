use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use lingocast_models::{PlayerStatus, StatusBus, StreamKind};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::manifest::{probe_manifest, AttachError};

/// Players tried in order when no viewer command is configured.
const DEFAULT_VIEWERS: &[&str] = &["mpv", "ffplay", "vlc"];

/// Renders the live video next to the translation pipeline.
///
/// Attachment is fire-and-forget: failures are published on the status bus
/// and never reach the caller.
pub trait StreamAttachment: Send {
    fn attach(&mut self, manifest_url: &str, status: &StatusBus);
    fn detach(&mut self);
}

impl<A: StreamAttachment + ?Sized> StreamAttachment for Box<A> {
    fn attach(&mut self, manifest_url: &str, status: &StatusBus) {
        (**self).attach(manifest_url, status)
    }

    fn detach(&mut self) {
        (**self).detach()
    }
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Launch a viewer process; the manifest is still probed when disabled.
    pub enabled: bool,
    /// Explicit player program. `None` searches `DEFAULT_VIEWERS`.
    pub command: Option<String>,
    pub probe_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            probe_timeout: Duration::from_secs(10),
        }
    }
}

/// Probes the manifest and hands it to an external video player.
pub struct ExternalViewer {
    config: ViewerConfig,
    http: reqwest::Client,
    current: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ExternalViewer {
    pub fn new(config: ViewerConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .unwrap_or_default();
        Self {
            config,
            http,
            current: None,
        }
    }
}

impl StreamAttachment for ExternalViewer {
    fn attach(&mut self, manifest_url: &str, status: &StatusBus) {
        self.detach();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_viewer(
            self.config.clone(),
            self.http.clone(),
            manifest_url.to_string(),
            status.clone(),
            cancel.clone(),
        ));
        self.current = Some((cancel, task));
    }

    fn detach(&mut self) {
        if let Some((cancel, _task)) = self.current.take() {
            cancel.cancel();
        }
    }
}

impl Drop for ExternalViewer {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn run_viewer(
    config: ViewerConfig,
    http: reqwest::Client,
    manifest_url: String,
    status: StatusBus,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        probed = probe_manifest(&http, &manifest_url) => probed,
    };
    let stream = match stream {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!(url = %manifest_url, error = %e, "manifest probe failed");
            status.publish(PlayerStatus::StreamFailed {
                message: e.to_string(),
            });
            return;
        }
    };
    tracing::info!(url = %manifest_url, ?stream, "live manifest probed");

    if !config.enabled {
        status.publish(PlayerStatus::StreamAttached {
            stream,
            viewer: None,
        });
        return;
    }

    let mut child = match spawn_viewer(&config, &manifest_url, &stream) {
        Ok((program, child)) => {
            status.publish(PlayerStatus::StreamAttached {
                stream,
                viewer: Some(program),
            });
            child
        }
        Err(e) => {
            tracing::warn!(error = %e, "video viewer unavailable");
            status.publish(PlayerStatus::StreamFailed {
                message: e.to_string(),
            });
            return;
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill video viewer: {}", e);
            } else {
                tracing::info!("video viewer stopped");
            }
        }
        exit = child.wait() => match exit {
            Ok(code) => tracing::info!(%code, "video viewer exited"),
            Err(e) => tracing::warn!(error = %e, "video viewer wait failed"),
        },
    }
}

fn spawn_viewer(
    config: &ViewerConfig,
    manifest_url: &str,
    stream: &StreamKind,
) -> Result<(String, Child), AttachError> {
    let Some(path) = resolve_viewer(config.command.as_deref()) else {
        let tried = match &config.command {
            Some(cmd) => cmd.clone(),
            None => DEFAULT_VIEWERS.join(", "),
        };
        return Err(AttachError::ViewerNotFound(tried));
    };
    let program = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    tracing::info!(viewer = %path.display(), "launching video viewer");
    let child = Command::new(&path)
        .args(viewer_args(&program, manifest_url, stream))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AttachError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;
    Ok((program, child))
}

/// Locate the viewer binary, either the configured one or the first default on PATH.
fn resolve_viewer(command: Option<&str>) -> Option<PathBuf> {
    match command {
        Some(cmd) => {
            let candidate = PathBuf::from(cmd);
            if candidate.is_file() {
                return Some(candidate);
            }
            which::which(cmd).ok()
        }
        None => DEFAULT_VIEWERS
            .iter()
            .find_map(|name| which::which(name).ok()),
    }
}

/// Arguments for a live, low-latency window titled after the stream.
fn viewer_args(program: &str, manifest_url: &str, stream: &StreamKind) -> Vec<String> {
    let mut args = Vec::new();
    match program {
        "mpv" => {
            args.push("--force-window=immediate".to_string());
            args.push("--title=lingocast".to_string());
            if matches!(stream, StreamKind::Adaptive { .. }) {
                args.push("--profile=low-latency".to_string());
            }
        }
        "ffplay" => {
            args.extend(["-window_title", "lingocast", "-loglevel", "error"].map(String::from));
            if matches!(stream, StreamKind::Adaptive { .. }) {
                args.extend(["-fflags", "nobuffer"].map(String::from));
            }
        }
        "vlc" | "cvlc" => {
            args.push("--meta-title=lingocast".to_string());
        }
        _ => {}
    }
    args.push(manifest_url.to_string());
    args
}
