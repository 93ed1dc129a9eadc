//! Page viewer task: owns the surface, drives renders, publishes snapshots

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::watch;

use super::cache::{CacheKey, CacheStats, PageCache};
use super::error::RenderError;
use super::fit::SurfaceGeometry;
use super::gauge::{ContainerGauge, wait_for_container};
use super::source::PageSource;
use super::state::{Command, Effect, Phase, RenderParams, RenderState, RequestId};
use super::types::{PageData, Surface, TextLayer};
use super::zoom::Zoom;
use crate::settings;

/// Tunables of the viewer task
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewerConfig {
    pub default_zoom: f32,
    pub zoom_step: f32,
    pub device_pixel_ratio: f32,
    pub poll_interval: Duration,
    pub poll_retries: u32,
    pub cache_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_zoom: Zoom::DEFAULT_FACTOR,
            zoom_step: Zoom::STEP,
            device_pixel_ratio: 1.0,
            poll_interval: Duration::from_millis(100),
            poll_retries: 10,
            cache_capacity: PageCache::DEFAULT_CAPACITY,
        }
    }
}

impl ViewerConfig {
    pub fn from_settings() -> Self {
        Self {
            default_zoom: settings::get_default_zoom(),
            zoom_step: settings::get_zoom_step(),
            device_pixel_ratio: settings::get_device_pixel_ratio(),
            poll_interval: settings::get_container_poll_interval(),
            poll_retries: settings::get_container_poll_retries(),
            ..Self::default()
        }
    }
}

/// Requests accepted by the viewer task
pub enum ViewerCommand {
    Open(Arc<dyn PageSource>),
    Close,
    GoTo(usize),
    Next,
    Prev,
    ZoomIn,
    ZoomOut,
    ZoomReset,
    SetDevicePixelRatio(f32),
}

impl std::fmt::Debug for ViewerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(source) => write!(f, "Open({} pages)", source.page_count()),
            Self::Close => write!(f, "Close"),
            Self::GoTo(page) => write!(f, "GoTo({page})"),
            Self::Next => write!(f, "Next"),
            Self::Prev => write!(f, "Prev"),
            Self::ZoomIn => write!(f, "ZoomIn"),
            Self::ZoomOut => write!(f, "ZoomOut"),
            Self::ZoomReset => write!(f, "ZoomReset"),
            Self::SetDevicePixelRatio(ratio) => write!(f, "SetDevicePixelRatio({ratio})"),
        }
    }
}

/// What the viewer currently shows
#[derive(Clone, Debug, Default)]
pub struct ViewerSnapshot {
    pub page: usize,
    pub page_count: usize,
    pub zoom: f32,
    pub rendering: bool,
    pub pending: Option<usize>,
    pub surface: Option<Arc<Surface>>,
    pub last_error: Option<String>,
}

impl ViewerSnapshot {
    /// `"3 / 12"`, or empty without a document
    pub fn page_info(&self) -> String {
        if self.page_count == 0 {
            String::new()
        } else {
            format!("{} / {}", self.page, self.page_count)
        }
    }
}

/// Cheap handle for talking to a running [`PageViewer`]
#[derive(Clone)]
pub struct ViewerHandle {
    commands: UnboundedSender<ViewerCommand>,
    snapshot: watch::Receiver<ViewerSnapshot>,
    renders: Arc<AtomicUsize>,
    cache: Arc<Mutex<PageCache>>,
}

impl ViewerHandle {
    /// Fire and forget; the viewer task applies commands in order
    pub fn send(&self, command: ViewerCommand) {
        if self.commands.send(command).is_err() {
            warn!("Page viewer is gone, command dropped");
        }
    }

    pub fn open(&self, source: Arc<dyn PageSource>) {
        self.send(ViewerCommand::Open(source));
    }

    pub fn close(&self) {
        self.send(ViewerCommand::Close);
    }

    pub fn go_to(&self, page: usize) {
        self.send(ViewerCommand::GoTo(page));
    }

    pub fn next_page(&self) {
        self.send(ViewerCommand::Next);
    }

    pub fn prev_page(&self) {
        self.send(ViewerCommand::Prev);
    }

    pub fn zoom_in(&self) {
        self.send(ViewerCommand::ZoomIn);
    }

    pub fn zoom_out(&self) {
        self.send(ViewerCommand::ZoomOut);
    }

    pub fn zoom_reset(&self) {
        self.send(ViewerCommand::ZoomReset);
    }

    pub fn set_device_pixel_ratio(&self, ratio: f32) {
        self.send(ViewerCommand::SetDevicePixelRatio(ratio));
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerSnapshot> {
        self.snapshot.clone()
    }

    /// Rasterizations actually executed, cache hits excluded
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).stats()
    }
}

struct Rendered {
    params: RenderParams,
    geometry: SurfaceGeometry,
    data: Arc<PageData>,
}

type RenderJob = BoxFuture<'static, (RequestId, Result<Rendered, RenderError>)>;

/// Everything a render job needs, cloned out of the viewer
#[derive(Clone)]
struct JobContext {
    source: Arc<dyn PageSource>,
    gauge: Arc<dyn ContainerGauge>,
    cache: Arc<Mutex<PageCache>>,
    renders: Arc<AtomicUsize>,
    poll_interval: Duration,
    poll_retries: u32,
}

/// Owner of the render state and the displayed surface
pub struct PageViewer {
    state: RenderState,
    source: Option<Arc<dyn PageSource>>,
    gauge: Arc<dyn ContainerGauge>,
    cache: Arc<Mutex<PageCache>>,
    config: ViewerConfig,
    surface: Option<Arc<Surface>>,
    last_error: Option<String>,
    snapshot: watch::Sender<ViewerSnapshot>,
    renders: Arc<AtomicUsize>,
}

impl PageViewer {
    /// Start the viewer task on the current tokio runtime
    pub fn spawn(gauge: Arc<dyn ContainerGauge>, config: ViewerConfig) -> ViewerHandle {
        let (commands, command_rx) = unbounded_channel();
        let state = RenderState::new(
            Zoom::with_config(config.default_zoom, config.zoom_step),
            config.device_pixel_ratio,
        );
        let (snapshot, snapshot_rx) = watch::channel(ViewerSnapshot {
            zoom: state.zoom(),
            ..ViewerSnapshot::default()
        });
        let renders = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(Mutex::new(PageCache::new(config.cache_capacity)));

        let viewer = Self {
            state,
            source: None,
            gauge,
            cache: cache.clone(),
            config,
            surface: None,
            last_error: None,
            snapshot,
            renders: renders.clone(),
        };
        tokio::spawn(viewer.run(command_rx));

        ViewerHandle {
            commands,
            snapshot: snapshot_rx,
            renders,
            cache,
        }
    }

    async fn run(mut self, mut commands: UnboundedReceiver<ViewerCommand>) {
        let mut in_flight: Option<RenderJob> = None;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    debug!("Viewer command: {command:?}");
                    let effects = self.handle_command(command);
                    self.execute(effects, None, &mut in_flight);
                }
                (id, result) = async {
                    match in_flight.as_mut() {
                        Some(job) => job.await,
                        None => std::future::pending().await,
                    }
                } => {
                    in_flight = None;
                    self.finish(id, result, &mut in_flight);
                }
            }
            self.publish();
        }
        debug!("Page viewer stopped");
    }

    fn handle_command(&mut self, command: ViewerCommand) -> Vec<Effect> {
        match command {
            ViewerCommand::Open(source) => {
                let page_count = source.page_count();
                self.source = Some(source);
                self.last_error = None;
                info!("Viewer opened a document with {page_count} pages");
                self.state.apply(Command::Open { page_count })
            }
            ViewerCommand::Close => {
                self.source = None;
                self.last_error = None;
                self.state.apply(Command::Close)
            }
            ViewerCommand::GoTo(page) => self.state.apply(Command::Request(page)),
            ViewerCommand::Next => self.state.apply(Command::Next),
            ViewerCommand::Prev => self.state.apply(Command::Prev),
            ViewerCommand::ZoomIn => self.state.apply(Command::ZoomIn),
            ViewerCommand::ZoomOut => self.state.apply(Command::ZoomOut),
            ViewerCommand::ZoomReset => self.state.apply(Command::ZoomReset),
            ViewerCommand::SetDevicePixelRatio(ratio) => {
                self.state.apply(Command::SetDevicePixelRatio(ratio))
            }
        }
    }

    fn finish(
        &mut self,
        id: RequestId,
        result: Result<Rendered, RenderError>,
        in_flight: &mut Option<RenderJob>,
    ) {
        let effects = match result {
            Ok(rendered) => {
                let effects = self.state.apply(Command::Completed(id));
                self.execute(effects, Some(rendered), in_flight);
                return;
            }
            Err(RenderError::ContainerUnavailable { attempts }) => {
                self.last_error = Some(format!("viewer pane has no size after {attempts} attempts"));
                self.state.apply(Command::LayoutTimedOut(id))
            }
            Err(e) => {
                warn!("Page render failed: {e}");
                self.last_error = Some(e.to_string());
                self.state.apply(Command::Failed(id))
            }
        };
        self.execute(effects, None, in_flight);
    }

    fn execute(
        &mut self,
        effects: Vec<Effect>,
        mut rendered: Option<Rendered>,
        in_flight: &mut Option<RenderJob>,
    ) {
        for effect in effects {
            match effect {
                Effect::StartRender { id, params } => {
                    let Some(source) = self.source.clone() else {
                        continue;
                    };
                    let context = JobContext {
                        source,
                        gauge: self.gauge.clone(),
                        cache: self.cache.clone(),
                        renders: self.renders.clone(),
                        poll_interval: self.config.poll_interval,
                        poll_retries: self.config.poll_retries,
                    };
                    *in_flight = Some(render_job(id, params, context).boxed());
                }

                Effect::Present(id) => {
                    if let Some(done) = rendered.take() {
                        self.present(done);
                    } else {
                        debug!("Nothing to present for {id:?}");
                    }
                }

                Effect::Discard(id) => {
                    debug!("Discarding superseded render {id:?}");
                    rendered = None;
                }

                Effect::InvalidateCache => {
                    self.cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clear();
                }

                Effect::ClearSurface => {
                    self.surface = None;
                }
            }
        }
    }

    /// Replace the surface, building a fresh text layer for it
    fn present(&mut self, rendered: Rendered) {
        let Rendered {
            params,
            geometry,
            data,
        } = rendered;
        let text_layer = TextLayer::build(data.text_runs.clone(), geometry.css_size);
        debug!(
            "Presenting page {} at scale {:.3} ({} text runs)",
            params.page,
            geometry.scale,
            text_layer.runs().len()
        );
        self.last_error = None;
        self.surface = Some(Arc::new(Surface {
            page: params.page,
            scale: geometry.scale,
            device_pixel_ratio: params.device_pixel_ratio,
            css_size: geometry.css_size,
            backing_width: geometry.backing_width,
            backing_height: geometry.backing_height,
            raster: data,
            text_layer,
        }));
    }

    fn publish(&self) {
        let (rendering, pending) = match self.state.phase() {
            Phase::Idle => (false, None),
            Phase::Rendering { .. } => (true, self.state.pending()),
        };
        self.snapshot.send_replace(ViewerSnapshot {
            page: self.state.current_page(),
            page_count: self.state.page_count(),
            zoom: self.state.zoom(),
            rendering,
            pending,
            surface: self.surface.clone(),
            last_error: self.last_error.clone(),
        });
    }
}

async fn render_job(
    id: RequestId,
    params: RenderParams,
    context: JobContext,
) -> (RequestId, Result<Rendered, RenderError>) {
    (id, render_page(params, context).await)
}

async fn render_page(params: RenderParams, context: JobContext) -> Result<Rendered, RenderError> {
    let container = wait_for_container(
        context.gauge.as_ref(),
        context.poll_interval,
        context.poll_retries,
    )
    .await?;
    let page_size = context.source.page_size(params.page)?;
    let geometry =
        SurfaceGeometry::compute(page_size, container, params.zoom, params.device_pixel_ratio);
    let key = CacheKey::for_surface(params.page, &geometry);

    let cached = context
        .cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .lookup(&key);
    if let Some(data) = cached {
        debug!("Page {} served from cache", params.page);
        return Ok(Rendered {
            params,
            geometry,
            data,
        });
    }

    context.renders.fetch_add(1, Ordering::SeqCst);
    let source = context.source.clone();
    let page = params.page;
    let data = tokio::task::spawn_blocking(move || -> Result<PageData, RenderError> {
        let raster = source.rasterize(page, geometry.backing_scale)?;
        let text_runs = source.text_runs(page, geometry.scale)?;
        Ok(PageData {
            page,
            raster,
            text_runs,
        })
    })
    .await
    .map_err(|e| RenderError::generic(format!("render worker crashed: {e}")))??;

    let data = context
        .cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .store(key, data);
    Ok(Rendered {
        params,
        geometry,
        data,
    })
}
