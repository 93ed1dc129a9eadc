//! PDF page viewer: fit-to-pane scaling, zoom, coalesced rendering

mod cache;
mod error;
mod fit;
mod gauge;
mod service;
mod source;
mod state;
mod types;
mod zoom;

pub use cache::{CacheKey, CacheStats, PageCache};
pub use error::RenderError;
pub use fit::{SurfaceGeometry, fit_scale};
pub use gauge::{ContainerGauge, PaneGauge, wait_for_container};
pub use service::{PageViewer, ViewerCommand, ViewerConfig, ViewerHandle, ViewerSnapshot};
#[cfg(feature = "pdf")]
pub use source::MupdfSource;
pub use source::{PageSource, check_page};
pub use state::{Command, Effect, Phase, RenderParams, RenderState, RequestId};
pub use types::*;
pub use zoom::Zoom;
