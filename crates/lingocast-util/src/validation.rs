use lingocast_models::Language;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("enter a live stream URL (.m3u8) first")]
    EmptyUrl,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("unsupported language code: {0:?}")]
    UnknownLanguage(String),
}

/// Check a user-supplied live stream address and return it trimmed.
///
/// Only emptiness is rejected. The backend hands the address to its own
/// stream reader, so rtmp, srt, rtsp and plain paths are all passed through.
pub fn validate_manifest_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    if let Err(e) = Url::parse(trimmed) {
        tracing::debug!(url = trimmed, error = %e, "stream address is not an absolute URL");
    }
    Ok(trimmed.to_string())
}

pub fn validate_language(raw: &str) -> Result<Language, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::UnknownLanguage(raw.to_string()))
}

/// Check the backend endpoint the session channel connects to.
pub fn validate_backend_url(raw: &str) -> Result<Url, ValidationError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(ValidationError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_is_rejected() {
        assert_eq!(validate_manifest_url(""), Err(ValidationError::EmptyUrl));
        assert_eq!(validate_manifest_url("   "), Err(ValidationError::EmptyUrl));
    }

    #[test]
    fn manifest_is_trimmed() {
        assert_eq!(
            validate_manifest_url("  https://example/live.m3u8 ").unwrap(),
            "https://example/live.m3u8"
        );
    }

    #[test]
    fn accepts_any_live_source() {
        for source in [
            "rtmp://live.example/app/stream",
            "srt://live.example:9000",
            "rtsp://cam/stream",
            "example.com/live.m3u8",
            "/var/media/live.m3u8",
        ] {
            assert_eq!(validate_manifest_url(&format!(" {source}\t")).unwrap(), source);
        }
        let long = format!("https://example/{}", "a".repeat(4096));
        assert_eq!(validate_manifest_url(&long).unwrap(), long);
    }

    #[test]
    fn language_codes() {
        assert_eq!(validate_language("te").unwrap(), Language::Te);
        assert_eq!(
            validate_language("xx"),
            Err(ValidationError::UnknownLanguage("xx".into()))
        );
    }

    #[test]
    fn backend_must_be_websocket() {
        assert!(validate_backend_url("ws://localhost:8000/ws-ott").is_ok());
        assert!(validate_backend_url("wss://translate.example/ws-ott").is_ok());
        assert!(matches!(
            validate_backend_url("http://localhost:8000"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
    }
}
