use serde::Deserialize;

use crate::backend::SessionNotifier;

/// Turns streaming-platform page URLs into directly playable media URLs.
pub trait StreamResolver: 'static {
    /// Whether `url` points at a page that needs resolving first.
    fn is_indirect(&self, url: &str) -> bool;

    /// Resolve `url` and report the outcome through
    /// [`SessionNotifier::resolved`]. May complete asynchronously.
    fn resolve(&self, url: &str, notifier: SessionNotifier);
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolveError {
    UnsupportedUrl(String),
    Request(String),
    InvalidResponse(String),
    Unplayable(String),
    NoStream,
    /// A streaming-platform link was given but no resolver is installed.
    NoResolver,
}

impl std::error::Error for ResolveError {}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedUrl(url) => write!(f, "unsupported stream url {url}"),
            Self::Request(message) => write!(f, "stream lookup failed: {message}"),
            Self::InvalidResponse(message) => write!(f, "invalid player response: {message}"),
            Self::Unplayable(reason) => write!(f, "video is not playable: {reason}"),
            Self::NoStream => write!(f, "player response has no playable stream"),
            Self::NoResolver => write!(f, "no stream resolver installed"),
        }
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidResponse(value.to_string())
    }
}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for ResolveError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        Self::Request(format!("{value:?}"))
    }
}

pub fn is_youtube_url(url: &str) -> bool {
    youtube_video_id(url).is_some()
}

/// Extract the video id from the usual YouTube link shapes: `watch?v=`,
/// `youtu.be/`, `shorts/`, `embed/`, `live/` and `v/`.
pub fn youtube_video_id(url: &str) -> Option<&str> {
    let rest = url.trim();
    let rest = rest
        .strip_prefix("https://")
        .or_else(|| rest.strip_prefix("http://"))
        .unwrap_or(rest);
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = authority.split(':').next().unwrap_or(authority);
    let host = host.to_ascii_lowercase();
    let host = ["www.", "m.", "music."]
        .iter()
        .find_map(|prefix| host.strip_prefix(*prefix))
        .unwrap_or(host.as_str());

    let path = path.split('#').next().unwrap_or("");
    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next(),
        "youtube.com" | "youtube-nocookie.com" => match segments.next() {
            Some("watch") => query.split('&').find_map(|pair| pair.strip_prefix("v=")),
            Some("shorts" | "embed" | "live" | "v") => segments.next(),
            _ => None,
        },
        _ => None,
    };
    candidate.filter(|id| {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// The subset of a YouTube player response needed to pick a stream.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    #[serde(default)]
    playability_status: Option<PlayabilityStatus>,
    #[serde(default)]
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayabilityStatus {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    hls_manifest_url: Option<String>,
    #[serde(default)]
    formats: Vec<StreamFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamFormat {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    bitrate: Option<u64>,
}

impl PlayerResponse {
    pub fn from_json(json: &str) -> Result<Self, ResolveError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Live streams resolve to their HLS manifest, everything else to the
    /// tallest muxed format that carries a direct url.
    pub fn stream_url(&self) -> Result<&str, ResolveError> {
        if let Some(status) = &self.playability_status
            && status.status != "OK"
        {
            return Err(ResolveError::Unplayable(
                status.reason.clone().unwrap_or_else(|| status.status.clone()),
            ));
        }
        let streaming_data = self.streaming_data.as_ref().ok_or(ResolveError::NoStream)?;
        if let Some(manifest) = &streaming_data.hls_manifest_url {
            return Ok(manifest);
        }
        streaming_data
            .formats
            .iter()
            .filter_map(|format| {
                format
                    .url
                    .as_deref()
                    .map(|url| ((format.height, format.bitrate), url))
            })
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, url)| url)
            .ok_or(ResolveError::NoStream)
    }
}
