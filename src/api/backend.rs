use async_trait::async_trait;
use bytes::Bytes;

use super::error::ApiError;
use super::types::{LocalPaper, MindmapOutline, PaperSession, SessionDetail, SessionSummary};
use crate::chat::ChatTransport;

/// Everything the client asks of the backend besides the chat stream
#[async_trait]
pub trait ReadingBackend: ChatTransport {
    async fn local_papers(&self) -> Result<Vec<LocalPaper>, ApiError>;

    async fn use_local_paper(&self, user_id: &str, filename: &str)
    -> Result<PaperSession, ApiError>;

    async fn upload(
        &self,
        user_id: &str,
        pdf_url: &str,
        title: &str,
    ) -> Result<PaperSession, ApiError>;

    async fn convert_to_markdown(&self, session_id: &str) -> Result<(), ApiError>;

    async fn proactive_summary(&self, session_id: &str) -> Result<String, ApiError>;

    async fn generate_mindmap(&self, session_id: &str) -> Result<MindmapOutline, ApiError>;

    async fn session(&self, session_id: &str) -> Result<SessionDetail, ApiError>;

    async fn sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ApiError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError>;

    /// Download a served file, `url_path` relative to the backend root
    async fn download(&self, url_path: &str) -> Result<Bytes, ApiError>;
}
