use std::{cell::RefCell, collections::HashMap};

use bevy::{
    asset::RenderAssetUsages,
    prelude::*,
    render::render_resource::{Extent3d, TextureDimension, TextureFormat, TextureUsages},
};
use gloo_events::EventListener;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::{
    VideoScreenError,
    backend::{FrameStatus, SessionNotifier, VideoBackend, VideoDecoder},
};

/// `HTMLMediaElement.HAVE_CURRENT_DATA`
const HAVE_CURRENT_DATA: u16 = 2;

// wasm on web is single threaded, so this should be OK
thread_local! {
    static FRAME_SOURCES: RefCell<HashMap<AssetId<Image>, FrameSource>> =
        RefCell::new(HashMap::default());
}

pub(crate) struct FrameSource {
    pub element: web_sys::HtmlVideoElement,
    pub renderable: bool,
}

pub(crate) fn with_frame_sources<R>(
    f: impl FnOnce(&HashMap<AssetId<Image>, FrameSource>) -> R,
) -> R {
    FRAME_SOURCES.with_borrow(f)
}

/// Creates one `<video>` element per session. The element is copied into
/// the target texture by the render world every frame it has data.
#[derive(Clone, Copy, Default, Debug)]
pub struct HtmlVideoBackend;

impl VideoBackend for HtmlVideoBackend {
    fn create(
        &mut self,
        target: AssetId<Image>,
        notifier: SessionNotifier,
    ) -> Result<Box<dyn VideoDecoder>, VideoScreenError> {
        let element = web_sys::window()
            .ok_or_else(|| VideoScreenError::Backend("window".into()))?
            .document()
            .ok_or_else(|| VideoScreenError::Backend("document".into()))?
            .create_element("video")?
            .dyn_into::<web_sys::HtmlVideoElement>()
            .map_err(|e| VideoScreenError::Backend(format!("{e:?}")))?;
        element.set_cross_origin(Some("anonymous"));
        element.set_muted(true);
        element.set_autoplay(true);

        let listeners = add_listeners(&element, &notifier);
        FRAME_SOURCES.with_borrow_mut(|sources| {
            sources.insert(
                target,
                FrameSource {
                    element: element.clone(),
                    renderable: false,
                },
            )
        });
        Ok(Box::new(HtmlVideoDecoder {
            element,
            target,
            listeners,
            last_time: None,
            size: UVec2::ZERO,
        }))
    }
}

fn add_listeners(
    element: &web_sys::HtmlVideoElement,
    notifier: &SessionNotifier,
) -> Vec<EventListener> {
    let loaded = notifier.clone();
    let audio = notifier.clone();
    let seeked = notifier.clone();
    let ended = notifier.clone();
    let failed = notifier.clone();
    vec![
        EventListener::once(element, "playing", move |_event: &web_sys::Event| {
            loaded.loaded()
        }),
        EventListener::once(element, "canplay", move |_event: &web_sys::Event| {
            audio.audio_ready()
        }),
        EventListener::new(element, "seeked", move |_event: &web_sys::Event| {
            seeked.seeked()
        }),
        EventListener::new(element, "ended", move |_event: &web_sys::Event| {
            ended.ended()
        }),
        EventListener::new(element, "error", move |_event: &web_sys::Event| {
            failed.failed("media element error")
        }),
    ]
}

struct HtmlVideoDecoder {
    element: web_sys::HtmlVideoElement,
    target: AssetId<Image>,
    listeners: Vec<EventListener>,
    last_time: Option<f64>,
    size: UVec2,
}

impl VideoDecoder for HtmlVideoDecoder {
    fn play(&mut self, url: &str) {
        self.element.set_src(url);
        if let Err(err) = self.element.play() {
            warn!("Failed to play {url}: {err:?}");
        }
    }

    fn seek(&mut self, time: f64) {
        self.element.set_current_time(time);
    }

    fn present(&mut self, images: &mut Assets<Image>) -> FrameStatus {
        let size = UVec2::new(self.element.video_width(), self.element.video_height());
        if size.x == 0 || size.y == 0 {
            return FrameStatus::default();
        }
        if size != self.size {
            self.size = size;
            images.insert(self.target, video_image(size));
        }

        let time = self.element.current_time();
        let advanced = self.last_time != Some(time) && !self.element.paused();
        self.last_time = Some(time);
        let texture_ready = self.element.ready_state() >= HAVE_CURRENT_DATA;
        FRAME_SOURCES.with_borrow_mut(|sources| {
            if let Some(source) = sources.get_mut(&self.target) {
                source.renderable = texture_ready;
            }
        });
        FrameStatus {
            texture_ready,
            advanced,
        }
    }

    fn playback_time(&self) -> f64 {
        self.element.current_time()
    }

    fn set_looping(&mut self, looping: bool) {
        self.element.set_loop(looping);
    }

    fn attach_audio(&mut self, volume: f32) {
        self.element.set_volume(volume as f64);
        self.element.set_muted(false);
        // Browsers pause autoplayed media that is unmuted without a user
        // gesture. Fall back to muted playback in that case.
        let element = self.element.clone();
        match self.element.play() {
            Ok(promise) => wasm_bindgen_futures::spawn_local(async move {
                if let Err(err) = JsFuture::from(promise).await {
                    warn!("Audio blocked until user interaction: {err:?}");
                    element.set_muted(true);
                    if let Err(err) = element.play() {
                        warn!("Failed to resume muted video: {err:?}");
                    }
                }
            }),
            Err(err) => warn!("Failed to unmute video: {err:?}"),
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.element.set_volume(volume as f64);
    }

    fn dispose(&mut self) {
        self.listeners.clear();
        if let Err(err) = self.element.pause() {
            warn!("Failed to pause video: {err:?}");
        }
        if let Err(err) = self.element.remove_attribute("src") {
            warn!("Failed to clear video source: {err:?}");
        }
        self.element.load();
        FRAME_SOURCES.with_borrow_mut(|sources| sources.remove(&self.target));
    }
}

fn video_image(size: UVec2) -> Image {
    let mut image = Image::new_uninit(
        Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        TextureFormat::Rgba8Unorm,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.texture_descriptor.usage |= TextureUsages::RENDER_ATTACHMENT;
    image
}
