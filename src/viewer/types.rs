//! Core types for page rendering

use std::ops::Range;
use std::sync::Arc;

/// Width and height in CSS pixels or PDF points
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Both sides finite and strictly positive
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }
}

/// Raw rendered page image.
///
/// RGB pixel data at the backing resolution, before any terminal encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    /// 3 bytes per pixel: R, G, B
    pub pixels: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// One line of page text positioned in CSS pixels
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Rasterization output for one page at one scale
#[derive(Clone, Debug)]
pub struct PageData {
    pub page: usize,
    pub raster: Raster,
    pub text_runs: Vec<TextRun>,
}

/// Selectable text laid over the page image.
///
/// Character offsets index the concatenation of all runs, one `\n` between
/// consecutive runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextLayer {
    size: Size,
    runs: Vec<TextRun>,
    /// Character offset where each run starts
    starts: Vec<usize>,
    text: String,
}

impl TextLayer {
    /// Build a layer sized to the visible surface. Runs lying entirely
    /// outside of it are dropped.
    #[must_use]
    pub fn build(runs: Vec<TextRun>, size: Size) -> Self {
        let mut layer = Self {
            size,
            ..Self::default()
        };
        let mut offset = 0;
        for run in runs {
            let visible = run.x1 > 0.0 && run.y1 > 0.0 && run.x0 < size.width && run.y0 < size.height;
            if !visible || run.text.is_empty() {
                continue;
            }
            if !layer.runs.is_empty() {
                layer.text.push('\n');
                offset += 1;
            }
            layer.starts.push(offset);
            offset += run.text.chars().count();
            layer.text.push_str(&run.text);
            layer.runs.push(run);
        }
        layer
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Runs overlapping the character range `start..end`, for highlighting
    pub fn runs_in_range(&self, start: usize, end: usize) -> Vec<&TextRun> {
        self.runs
            .iter()
            .zip(&self.starts)
            .filter(|&(run, &run_start)| {
                let run_end = run_start + run.text.chars().count();
                run_start < end && start < run_end
            })
            .map(|(run, _)| run)
            .collect()
    }

    /// Character ranges of every case-insensitive occurrence of `query`
    pub fn find(&self, query: &str) -> Vec<Range<usize>> {
        let needle: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
        if needle.is_empty() {
            return Vec::new();
        }
        let hay: Vec<char> = self
            .text
            .chars()
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect();
        if needle.len() > hay.len() {
            return Vec::new();
        }

        let mut found = Vec::new();
        let mut i = 0;
        while i + needle.len() <= hay.len() {
            if hay[i..i + needle.len()] == needle[..] {
                found.push(i..i + needle.len());
                i += needle.len();
            } else {
                i += 1;
            }
        }
        found
    }
}

/// The rendered page as shown: image, sizes and text overlay
#[derive(Clone, Debug)]
pub struct Surface {
    /// 1-based page number
    pub page: usize,
    /// Scale applied to layout (fit times zoom)
    pub scale: f32,
    pub device_pixel_ratio: f32,
    /// Size the page occupies on screen
    pub css_size: Size,
    /// Pixel size of the backing image, `css_size` times the pixel ratio
    pub backing_width: u32,
    pub backing_height: u32,
    pub raster: Arc<PageData>,
    pub text_layer: TextLayer,
}
