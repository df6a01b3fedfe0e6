use crate::core::error::ScrapeError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use tracing::{debug, warn};

/// Raw export body as returned by the brokerage, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    pub media_type: String,
    pub body: Vec<u8>,
}

/// Extracts the lowercased media type from a `Content-Type` value, dropping
/// parameters such as `charset`.
pub fn media_type(content_type: &str) -> Option<String> {
    let media = content_type.split(';').next()?.trim().to_ascii_lowercase();
    (!media.is_empty()).then_some(media)
}

/// Classifies an export response.
///
/// Status comes first: 401 means the session expired and any other non-2xx
/// is a server failure, whatever page it was served with. Expired sessions
/// are not always reported with a 401 though; some portals redirect to a
/// login page served as HTML with a 200, so a 2xx of the wrong media type
/// also maps to [`ScrapeError::Unauthenticated`]. A 2xx without any
/// `Content-Type` is a malformed response and maps to `Transport`.
pub async fn classify_export(
    response: Response,
    expected_media_type: &str,
) -> Result<ExportPayload, ScrapeError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        debug!("Export answered 401");
        return Err(ScrapeError::Unauthenticated);
    }
    if !status.is_success() {
        return Err(ScrapeError::Transport(format!(
            "export request returned {status}"
        )));
    }

    let actual = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(media_type)
        .ok_or_else(|| {
            ScrapeError::Transport(format!("export response ({status}) has no content type"))
        })?;
    if actual != expected_media_type {
        warn!(
            expected = expected_media_type,
            actual = %actual,
            %status,
            "Export returned unexpected content type, assuming session expired"
        );
        return Err(ScrapeError::Unauthenticated);
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ScrapeError::Transport(format!("failed to read export body: {e}")))?;

    Ok(ExportPayload {
        media_type: expected_media_type.to_string(),
        body: body.to_vec(),
    })
}
