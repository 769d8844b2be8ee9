use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::{
    backend::SessionNotifier,
    resolver::{PlayerResponse, ResolveError, StreamResolver, is_youtube_url, youtube_video_id},
};

/// Resolves YouTube links through a player-response endpoint.
///
/// Browsers cannot query YouTube directly, so `endpoint` points at a proxy
/// that answers with the video's player response JSON. `{id}` in the
/// endpoint is replaced with the video id.
#[derive(Clone, Debug)]
pub struct YoutubeResolver {
    endpoint: String,
}

impl YoutubeResolver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn request_url(&self, video_id: &str) -> String {
        self.endpoint.replace("{id}", video_id)
    }
}

impl StreamResolver for YoutubeResolver {
    fn is_indirect(&self, url: &str) -> bool {
        is_youtube_url(url)
    }

    fn resolve(&self, url: &str, notifier: SessionNotifier) {
        let Some(video_id) = youtube_video_id(url) else {
            notifier.resolved(Err(ResolveError::UnsupportedUrl(url.to_owned())));
            return;
        };
        let request = self.request_url(video_id);
        wasm_bindgen_futures::spawn_local(async move {
            notifier.resolved(fetch_stream_url(&request).await);
        });
    }
}

async fn fetch_stream_url(request: &str) -> Result<String, ResolveError> {
    let window = web_sys::window().ok_or_else(|| ResolveError::Request("window".into()))?;
    let pending: js_sys::Promise = window.fetch_with_str(request);
    let response: web_sys::Response = JsFuture::from(pending).await?.dyn_into()?;
    if !response.ok() {
        return Err(ResolveError::Request(format!(
            "{request} returned HTTP {}",
            response.status()
        )));
    }
    let body = JsFuture::from(response.text()?)
        .await?
        .as_string()
        .ok_or_else(|| ResolveError::InvalidResponse("body is not text".into()))?;
    PlayerResponse::from_json(&body)?
        .stream_url()
        .map(str::to_owned)
}
