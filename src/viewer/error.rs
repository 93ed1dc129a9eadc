/// Failures while loading or rasterizing pages
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("viewer pane has no size after {attempts} attempts")]
    ContainerUnavailable { attempts: u32 },

    #[error("no document is open")]
    NoDocument,

    #[error("{detail}")]
    Source { detail: String },
}

impl RenderError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Source { detail: msg.into() }
    }
}
