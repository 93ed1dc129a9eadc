//! Mermaid sources laid out and drawn as SVG by `mermaid-rs-renderer`

use std::fs;
use std::path::PathBuf;

use log::{debug, warn};
use mermaid_rs_renderer::config::LayoutConfig;
use mermaid_rs_renderer::layout::compute_layout;
use mermaid_rs_renderer::parser::parse_mermaid;
use mermaid_rs_renderer::render::render_svg;
use mermaid_rs_renderer::theme::Theme;

use super::DiagramBackend;
use super::error::DiagramError;

/// Renders every diagram type the crate knows (flowcharts, sequence,
/// class, state, pie, gantt, mind maps) to an SVG document.
#[derive(Debug, Default)]
pub struct MermaidBackend {
    /// Each rendered diagram is also written here as `<id>.svg`
    output_dir: Option<PathBuf>,
}

impl MermaidBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    fn save(&self, id: &str, svg: &str) {
        let Some(dir) = &self.output_dir else {
            return;
        };
        let path = dir.join(format!("{id}.svg"));
        match fs::create_dir_all(dir).and_then(|()| fs::write(&path, svg)) {
            Ok(()) => debug!("Saved {id} to {}", path.display()),
            Err(e) => warn!("Failed to save {id} to {}: {e}", path.display()),
        }
    }
}

impl DiagramBackend for MermaidBackend {
    fn render(&self, id: &str, source: &str) -> Result<String, DiagramError> {
        if source.trim().is_empty() {
            return Err(DiagramError::Empty);
        }
        let parsed = parse_mermaid(source).map_err(|e| DiagramError::Syntax(e.to_string()))?;
        let theme = Theme::modern();
        let layout_config = LayoutConfig::default();
        let layout = compute_layout(&parsed.graph, &theme, &layout_config);
        let svg = render_svg(&layout, &theme, &layout_config);
        self.save(id, &svg);
        Ok(svg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flowchart_becomes_svg_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MermaidBackend::new().with_output_dir(dir.path().join("diagrams"));

        let svg = backend.render("diagram-7", "graph TD\nA[Encoder] --> B[Decoder]").unwrap();

        assert!(svg.contains("<svg"));
        let saved = fs::read_to_string(dir.path().join("diagrams").join("diagram-7.svg")).unwrap();
        assert_eq!(saved, svg);
    }

    #[test]
    fn blank_source_is_empty() {
        assert_eq!(MermaidBackend::new().render("d", "  \n"), Err(DiagramError::Empty));
    }
}
