//! Extracting a locator from an intent-like payload

use lumen_core::Locator;

/// Media kinds accepted by [`resolve_locator`]
pub const DEFAULT_ACCEPTED_KINDS: &[&str] = &["image/*"];

/// A share/open request as handed over by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingPayload {
    pub mime_type: Option<String>,
    /// Streamed content reference; preferred when present
    pub stream: Option<String>,
    /// Inline data reference
    pub data: Option<String>,
}

impl IncomingPayload {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: Some(mime_type.into()),
            ..Self::default()
        }
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Locator for an `image/*` payload, or `None` when there is nothing to load
pub fn resolve_locator(payload: &IncomingPayload) -> Option<Locator> {
    resolve_locator_with(payload, DEFAULT_ACCEPTED_KINDS)
}

/// Like [`resolve_locator`] with an explicit list of accepted kinds.
/// Entries are exact types (`image/png`) or wildcards (`image/*`).
pub fn resolve_locator_with(payload: &IncomingPayload, accepted: &[&str]) -> Option<Locator> {
    let mime = payload.mime_type.as_deref()?;
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if !accepted.iter().any(|kind| kind_matches(kind, &essence)) {
        tracing::debug!(mime, "Unsupported payload kind");
        return None;
    }

    [payload.stream.as_deref(), payload.data.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .map(Locator::new)
}

fn kind_matches(pattern: &str, essence: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    match pattern.strip_suffix("/*") {
        Some(top_level) => essence
            .split_once('/')
            .is_some_and(|(kind, subtype)| kind == top_level && !subtype.is_empty()),
        None => pattern == essence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_preferred_over_data() {
        let payload = IncomingPayload::new("image/png")
            .with_stream("content://media/1")
            .with_data("file:///sdcard/1.png");
        assert_eq!(
            resolve_locator(&payload),
            Some(Locator::new("content://media/1"))
        );
    }

    #[test]
    fn test_falls_back_to_data() {
        let payload = IncomingPayload::new("Image/JPEG; q=0.9").with_data(" /tmp/a.jpg ");
        assert_eq!(resolve_locator(&payload), Some(Locator::new("/tmp/a.jpg")));

        let blank_stream = IncomingPayload::new("image/png")
            .with_stream("  ")
            .with_data("/tmp/b.png");
        assert_eq!(resolve_locator(&blank_stream), Some(Locator::new("/tmp/b.png")));
    }

    #[test]
    fn test_unsupported_or_missing_yields_none() {
        assert!(resolve_locator(&IncomingPayload::default()).is_none());
        assert!(resolve_locator(&IncomingPayload::new("text/plain").with_data("/a.txt")).is_none());
        assert!(resolve_locator(&IncomingPayload::new("image/")).is_none());
        assert!(resolve_locator(&IncomingPayload::new("image/png")).is_none());
    }

    #[test]
    fn test_explicit_kinds() {
        let payload = IncomingPayload::new("image/gif").with_data("/a.gif");
        assert!(resolve_locator_with(&payload, &["image/png"]).is_none());
        assert!(resolve_locator_with(&payload, &["image/png", "image/gif"]).is_some());
    }
}
