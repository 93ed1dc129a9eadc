//! Fitting a page into the viewer pane

use super::types::Size;

/// Scale that fits `page` into `container`.
///
/// Height-fit is preferred; width-fit is used when the height-fitted page
/// would be wider than the container.
#[must_use]
pub fn fit_scale(page: Size, container: Size) -> f32 {
    if !page.is_positive() || !container.is_positive() {
        return 1.0;
    }
    let by_height = container.height / page.height;
    let by_width = container.width / page.width;
    if page.width * by_height > container.width {
        by_width
    } else {
        by_height
    }
}

/// Sizes derived for one render: layout uses `scale`, the backing image
/// additionally multiplies by the device pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceGeometry {
    pub fit: f32,
    pub scale: f32,
    pub backing_scale: f32,
    pub css_size: Size,
    pub backing_width: u32,
    pub backing_height: u32,
}

impl SurfaceGeometry {
    #[must_use]
    pub fn compute(page: Size, container: Size, zoom: f32, device_pixel_ratio: f32) -> Self {
        let fit = fit_scale(page, container);
        let scale = fit * zoom;
        let backing_scale = scale * device_pixel_ratio;
        let css_size = page.scaled(scale);
        let backing = page.scaled(backing_scale);
        Self {
            fit,
            scale,
            backing_scale,
            css_size,
            backing_width: backing.width.round().max(1.0) as u32,
            backing_height: backing.height.round().max(1.0) as u32,
        }
    }
}
