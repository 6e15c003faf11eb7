use lingocast_models::StreamKind;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use url::Url;

/// How much of the manifest body is inspected.
const PROBE_BYTES: usize = 64 * 1024;

const PLAYLIST_HEADER: &str = "#EXTM3U";
const VARIANT_TAG: &str = "#EXT-X-STREAM-INF";

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("invalid manifest URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("manifest request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("manifest server answered {0}")]
    Status(u16),
    #[error("cannot read local manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("no video player found (tried {0})")]
    ViewerNotFound(String),
    #[error("failed to launch {program}: {message}")]
    Spawn { program: String, message: String },
}

/// Decide what kind of stream a manifest body describes.
pub fn classify_manifest(body: &str) -> StreamKind {
    let body = body.trim_start_matches('\u{feff}').trim_start();
    if !body.starts_with(PLAYLIST_HEADER) {
        return StreamKind::Direct;
    }
    let variants = body
        .lines()
        .filter(|line| line.trim_start().starts_with(VARIANT_TAG))
        .count();
    StreamKind::Adaptive { variants }
}

/// Fetch the head of a manifest and classify it.
///
/// Sources that are neither HTTP nor a local file (rtmp, srt, rtsp) are
/// handed to the viewer as direct media without being read.
pub async fn probe_manifest(
    http: &reqwest::Client,
    manifest_url: &str,
) -> Result<StreamKind, AttachError> {
    let url = Url::parse(manifest_url)?;
    match url.scheme() {
        "http" | "https" | "file" => {}
        _ => return Ok(StreamKind::Direct),
    }
    if url.scheme() == "file" {
        let path = url
            .to_file_path()
            .map_err(|_| AttachError::InvalidUrl(url::ParseError::InvalidDomainCharacter))?;
        let file = tokio::fs::File::open(&path).await?;
        let mut head = Vec::with_capacity(4096);
        file.take(PROBE_BYTES as u64).read_to_end(&mut head).await?;
        return Ok(classify_manifest(&String::from_utf8_lossy(&head)));
    }

    let mut resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(AttachError::Status(resp.status().as_u16()));
    }

    // Media served directly (e.g. a progressive mp4) is not worth reading.
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if content_type.starts_with("video/") || content_type.starts_with("audio/") {
        return Ok(StreamKind::Direct);
    }

    let mut head = Vec::with_capacity(4096);
    while head.len() < PROBE_BYTES {
        match resp.chunk().await? {
            Some(chunk) => head.extend_from_slice(&chunk),
            None => break,
        }
    }
    Ok(classify_manifest(&String::from_utf8_lossy(&head)))
}
