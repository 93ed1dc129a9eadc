//! Render state management
//!
//! The viewer is either idle or rendering exactly one page. Requests that
//! arrive while a render is in flight collapse into a single pending slot,
//! latest request wins.

use super::zoom::Zoom;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Parameters for rendering a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    /// 1-based page number
    pub page: usize,
    pub zoom: f32,
    pub device_pixel_ratio: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Phase {
    Idle,
    Rendering { id: RequestId, page: usize },
}

/// Current render state for a document
#[derive(Clone, Debug)]
pub struct RenderState {
    phase: Phase,
    pending: Option<usize>,
    /// Current page (1-indexed), 0 without a document
    current_page: usize,
    page_count: usize,
    zoom: Zoom,
    device_pixel_ratio: f32,
    next_request_id: u64,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new(Zoom::default(), 1.0)
    }
}

impl RenderState {
    #[must_use]
    pub fn new(zoom: Zoom, device_pixel_ratio: f32) -> Self {
        Self {
            phase: Phase::Idle,
            pending: None,
            current_page: 0,
            page_count: 0,
            zoom,
            device_pixel_ratio: sanitize_ratio(device_pixel_ratio).unwrap_or(1.0),
            next_request_id: 1,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::Open { page_count } => {
                self.page_count = page_count;
                self.current_page = 0;
                self.pending = None;
                self.phase = Phase::Idle;
                let mut effects = vec![Effect::InvalidateCache];
                effects.extend(self.request(1));
                effects
            }

            Command::Close => {
                self.page_count = 0;
                self.current_page = 0;
                self.pending = None;
                self.phase = Phase::Idle;
                self.zoom.reset();
                vec![Effect::InvalidateCache, Effect::ClearSurface]
            }

            Command::Request(page) => self.request(page),

            Command::Next => {
                if self.current_page < self.page_count {
                    self.request(self.current_page + 1)
                } else {
                    vec![]
                }
            }

            Command::Prev => {
                if self.current_page > 1 {
                    self.request(self.current_page - 1)
                } else {
                    vec![]
                }
            }

            Command::ZoomIn => {
                self.zoom.step_in();
                self.request(self.current_page)
            }

            Command::ZoomOut => {
                self.zoom.step_out();
                self.request(self.current_page)
            }

            Command::ZoomReset => {
                self.zoom.reset();
                self.request(self.current_page)
            }

            Command::SetDevicePixelRatio(ratio) => match sanitize_ratio(ratio) {
                Some(ratio) if (ratio - self.device_pixel_ratio).abs() > f32::EPSILON => {
                    self.device_pixel_ratio = ratio;
                    self.request(self.current_page)
                }
                _ => vec![],
            },

            Command::Completed(id) => {
                if !self.is_active(id) {
                    return vec![Effect::Discard(id)];
                }
                self.phase = Phase::Idle;
                match self.pending.take() {
                    Some(page) => {
                        let mut effects = vec![Effect::Discard(id)];
                        effects.extend(self.request(page));
                        effects
                    }
                    None => vec![Effect::Present(id)],
                }
            }

            Command::Failed(id) => {
                if !self.is_active(id) {
                    return vec![];
                }
                self.phase = Phase::Idle;
                match self.pending.take() {
                    Some(page) => self.request(page),
                    None => vec![],
                }
            }

            Command::LayoutTimedOut(id) => {
                if self.is_active(id) {
                    self.phase = Phase::Idle;
                    self.pending = None;
                }
                vec![]
            }
        }
    }

    fn is_active(&self, id: RequestId) -> bool {
        matches!(self.phase, Phase::Rendering { id: active, .. } if active == id)
    }

    fn request(&mut self, page: usize) -> Vec<Effect> {
        if self.page_count == 0 {
            return vec![];
        }
        let page = page.clamp(1, self.page_count);
        self.current_page = page;

        if let Phase::Rendering { .. } = self.phase {
            self.pending = Some(page);
            return vec![];
        }

        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        self.phase = Phase::Rendering { id, page };
        vec![Effect::StartRender {
            id,
            params: RenderParams {
                page,
                zoom: self.zoom.factor(),
                device_pixel_ratio: self.device_pixel_ratio,
            },
        }]
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn zoom(&self) -> f32 {
        self.zoom.factor()
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }
}

fn sanitize_ratio(ratio: f32) -> Option<f32> {
    (ratio.is_finite() && ratio > 0.0).then_some(ratio)
}

/// Commands that modify render state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A document with this many pages was loaded
    Open { page_count: usize },
    Close,
    /// Show a page (1-based, clamped)
    Request(usize),
    Next,
    Prev,
    ZoomIn,
    ZoomOut,
    ZoomReset,
    SetDevicePixelRatio(f32),
    /// The render finished successfully
    Completed(RequestId),
    /// The render failed
    Failed(RequestId),
    /// The pane never reported a usable size
    LayoutTimedOut(RequestId),
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    StartRender { id: RequestId, params: RenderParams },
    /// Show the result of this render
    Present(RequestId),
    /// Drop the result of a superseded render
    Discard(RequestId),
    InvalidateCache,
    ClearSurface,
}
