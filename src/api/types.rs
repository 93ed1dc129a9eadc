//! Request and response bodies of the backend API

use serde::{Deserialize, Serialize};

use crate::chat::Message;

/// Body of `POST /api/chat/stream`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub session_id: String,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperKind {
    Pdf,
    Markdown,
}

/// Entry of `GET /api/local-papers`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPaper {
    pub filename: String,
    pub title: String,
    #[serde(default)]
    pub path: Option<String>,
    pub has_markdown: bool,
    #[serde(default)]
    pub markdown_path: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: PaperKind,
}

impl LocalPaper {
    #[must_use]
    pub fn has_pdf(&self) -> bool {
        self.kind == PaperKind::Pdf || self.path.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocalPapersResponse {
    #[serde(default)]
    pub papers: Vec<LocalPaper>,
}

/// A freshly created reading session (`use-local-paper` or `upload`)
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PaperSession {
    pub session_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub has_markdown: bool,
    #[serde(default)]
    pub has_pdf: bool,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

/// Body of `POST /api/upload`
#[derive(Clone, Debug, Serialize)]
pub struct UploadRequest {
    pub user_id: String,
    pub pdf_url: String,
    pub title: String,
}

/// Entry of `GET /api/sessions?user_id=`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SessionSummary {
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("Untitled session")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionsResponse {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

/// Server-side state kept inside a session record
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub chat_history: Vec<Message>,
    #[serde(default)]
    pub mindmap_outline: Option<String>,
}

/// Full session record from `GET /api/session/{id}`
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SessionDetail {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub paper_path: Option<String>,
    #[serde(default)]
    pub markdown_path: Option<String>,
    #[serde(default)]
    pub session_data: SessionData,
}

impl SessionDetail {
    /// Server path the session's PDF is served from
    #[must_use]
    pub fn paper_url_path(&self) -> Option<String> {
        self.paper_path.as_deref().map(paper_url_path)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionResponse {
    pub session: SessionDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SummaryResponse {
    pub summary: String,
}

/// Mind map outline in markdown
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MindmapOutline {
    pub markdown: String,
    #[serde(default)]
    pub from_cache: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Acknowledged {}

/// Map a stored paper path to the route serving the file.
///
/// Local papers live under `/local-papers/`, everything else under `/uploads/`.
#[must_use]
pub fn paper_url_path(paper_path: &str) -> String {
    let filename = paper_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(paper_path);
    if paper_path.contains("local_papers") {
        format!("local-papers/{filename}")
    } else {
        format!("uploads/{filename}")
    }
}
