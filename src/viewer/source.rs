//! Where page images and text come from

use super::error::RenderError;
use super::types::{Raster, Size, TextRun};

/// A loaded document. Pages are 1-based.
///
/// Implementations are called from a blocking worker thread.
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Intrinsic page size in points
    fn page_size(&self, page: usize) -> Result<Size, RenderError>;

    /// RGB image of the page at `scale` pixels per point
    fn rasterize(&self, page: usize, scale: f32) -> Result<Raster, RenderError>;

    /// Text lines positioned for a page drawn at `scale`
    fn text_runs(&self, page: usize, scale: f32) -> Result<Vec<TextRun>, RenderError>;
}

/// Check a 1-based page number against the page count
pub fn check_page(page: usize, count: usize) -> Result<usize, RenderError> {
    if page == 0 || page > count {
        return Err(RenderError::PageOutOfRange { page, count });
    }
    Ok(page - 1)
}

#[cfg(feature = "pdf")]
pub use self::mupdf_source::MupdfSource;

#[cfg(feature = "pdf")]
mod mupdf_source {
    use std::path::{Path, PathBuf};

    use log::{debug, info};
    use mupdf::text_page::TextBlockType;
    use mupdf::{Colorspace, Document, Matrix, Pixmap, TextPageFlags};

    use super::{PageSource, check_page};
    use crate::viewer::error::RenderError;
    use crate::viewer::types::{Raster, Size, TextRun};

    /// MuPDF-backed document.
    ///
    /// `mupdf::Document` is not shareable between threads, so each call
    /// opens its own handle; page sizes are read once up front.
    pub struct MupdfSource {
        path: PathBuf,
        page_sizes: Vec<Size>,
    }

    impl MupdfSource {
        pub fn open(path: &Path) -> Result<Self, RenderError> {
            let doc = open_document(path)?;
            let count = doc.page_count()?.max(0) as usize;
            let mut page_sizes = Vec::with_capacity(count);
            for index in 0..count {
                let bounds = doc.load_page(index as i32)?.bounds()?;
                page_sizes.push(Size::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0));
            }
            info!("Opened {} ({count} pages)", path.display());
            Ok(Self {
                path: path.to_path_buf(),
                page_sizes,
            })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    fn open_document(path: &Path) -> Result<Document, RenderError> {
        Ok(Document::open(path.to_string_lossy().as_ref())?)
    }

    impl PageSource for MupdfSource {
        fn page_count(&self) -> usize {
            self.page_sizes.len()
        }

        fn page_size(&self, page: usize) -> Result<Size, RenderError> {
            let index = check_page(page, self.page_sizes.len())?;
            Ok(self.page_sizes[index])
        }

        fn rasterize(&self, page: usize, scale: f32) -> Result<Raster, RenderError> {
            let index = check_page(page, self.page_sizes.len())?;
            let doc = open_document(&self.path)?;
            let page = doc.load_page(index as i32)?;
            let matrix = Matrix::new_scale(scale, scale);
            let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)?;
            debug!(
                "Rasterized page {} at {scale:.3}: {}x{}",
                index + 1,
                pixmap.width(),
                pixmap.height()
            );
            Ok(Raster {
                pixels: pixmap_to_rgb(&pixmap)?,
                width_px: pixmap.width(),
                height_px: pixmap.height(),
            })
        }

        fn text_runs(&self, page: usize, scale: f32) -> Result<Vec<TextRun>, RenderError> {
            let index = check_page(page, self.page_sizes.len())?;
            let doc = open_document(&self.path)?;
            let page = doc.load_page(index as i32)?;
            let text_page = page.to_text_page(TextPageFlags::empty())?;

            let mut runs = Vec::new();
            let text_blocks = text_page
                .blocks()
                .filter(|block| block.r#type() == TextBlockType::Text);
            for block in text_blocks {
                runs.extend(block.lines().filter_map(|line| {
                    let text: String = line.chars().filter_map(|ch| ch.char()).collect();
                    if text.trim().is_empty() {
                        return None;
                    }
                    let bounds = line.bounds();
                    Some(TextRun {
                        text,
                        x0: bounds.x0 * scale,
                        y0: bounds.y0 * scale,
                        x1: bounds.x1 * scale,
                        y1: bounds.y1 * scale,
                    })
                }));
            }
            Ok(runs)
        }
    }

    /// Tightly packed RGB, dropping alpha and row padding
    fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, RenderError> {
        let channels = pixmap.n() as usize;
        if channels < 3 {
            return Err(RenderError::generic(format!(
                "expected an RGB pixmap, got {channels} channels"
            )));
        }
        let (width, height) = (pixmap.width() as usize, pixmap.height() as usize);
        let stride = pixmap.stride() as usize;
        let used = width * channels;
        let samples = pixmap.samples();
        if stride == 0 || height == 0 {
            return Ok(Vec::new());
        }
        if used > stride || samples.len() < stride.saturating_mul(height) {
            return Err(RenderError::generic("pixmap is smaller than its dimensions"));
        }

        let rgb = samples
            .chunks(stride)
            .take(height)
            .flat_map(|row| row[..used].chunks_exact(channels))
            .flat_map(|px| px[..3].iter().copied())
            .collect();
        Ok(rgb)
    }
}
