//! Backend API client

mod backend;
mod client;
mod error;
mod types;

pub use backend::ReadingBackend;
pub use client::BackendClient;
pub use error::ApiError;
pub use types::{
    ChatRequest, LocalPaper, MindmapOutline, PaperKind, PaperSession, SessionData, SessionDetail,
    SessionSummary, UploadRequest, paper_url_path,
};
