//! Diagram blocks in assistant replies

mod error;
mod fallback;
mod mermaid;
mod normalize;
mod renderer;
mod scan;

pub use error::DiagramError;
pub use fallback::{FallbackPanel, escape_html, unescape_html};
pub use mermaid::MermaidBackend;
pub use normalize::normalize_source;
pub use renderer::{
    BlockState, DiagramBlock, DiagramRenderer, MessageKey, PassReport, RenderedDiagram, Segment,
    next_diagram_id,
};
pub use scan::{DIAGRAM_LANG, FencedDiagram, scan_diagram_blocks};

/// Turns a normalized diagram source into rendered markup (SVG)
pub trait DiagramBackend: Send + Sync {
    fn render(&self, id: &str, source: &str) -> Result<String, DiagramError>;
}
