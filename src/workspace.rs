//! Document workflow: opening papers, restoring sessions, clearing
//!
//! A `Workspace` wires the backend, the chat session, the viewer task and
//! the panel notifier together. Only the first request of a workflow can
//! abort it; later steps (loading the PDF, converting it to text, the
//! reading guide) report their failure as a system message and the flow
//! carries on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::api::{
    LocalPaper, MindmapOutline, PaperSession, ReadingBackend, SessionDetail, SessionSummary,
};
use crate::chat::{ChatError, ChatSession, Role, SendOutcome};
use crate::diagram::{DiagramBackend, DiagramRenderer, PassReport};
use crate::panel::AppContext;
use crate::viewer::{PageSource, RenderError, ViewerHandle};

/// Opens a downloaded PDF as a page source
pub type SourceOpener =
    Box<dyn Fn(&Path) -> Result<Arc<dyn PageSource>, RenderError> + Send + Sync>;

/// Page source backed by MuPDF when built with the `pdf` feature
pub fn default_source_opener() -> SourceOpener {
    Box::new(open_pdf_source)
}

#[cfg(feature = "pdf")]
fn open_pdf_source(path: &Path) -> Result<Arc<dyn PageSource>, RenderError> {
    let source = crate::viewer::MupdfSource::open(path)?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "pdf"))]
fn open_pdf_source(path: &Path) -> Result<Arc<dyn PageSource>, RenderError> {
    Err(RenderError::generic(format!(
        "cannot display {}: built without the pdf feature",
        path.display()
    )))
}

/// Where downloaded papers are kept
pub fn default_papers_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("readagent")
        .join("papers")
}

/// Where rendered diagrams are saved as `<id>.svg`
pub fn default_diagrams_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("readagent")
        .join("diagrams")
}

/// Name of the PDF that belongs to a local paper entry
fn pdf_filename(filename: &str) -> String {
    match filename.strip_suffix(".md") {
        Some(stem) => format!("{stem}.pdf"),
        None => filename.to_string(),
    }
}

/// Last path component with anything path-like removed
fn local_file_name(url_path: &str) -> String {
    let name = url_path
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .filter(|part| !matches!(*part, "." | ".."))
        .unwrap_or("paper.pdf");
    name.chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect()
}

pub struct Workspace {
    backend: Arc<dyn ReadingBackend>,
    chat: Arc<ChatSession>,
    context: Arc<AppContext>,
    viewer: ViewerHandle,
    diagrams: Mutex<DiagramRenderer>,
    papers_dir: PathBuf,
    opener: SourceOpener,
    title: Mutex<Option<String>>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("session_id", &self.context.session_id())
            .field("papers_dir", &self.papers_dir)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn new(
        backend: Arc<dyn ReadingBackend>,
        chat: Arc<ChatSession>,
        context: Arc<AppContext>,
        viewer: ViewerHandle,
    ) -> Self {
        Self {
            backend,
            chat,
            context,
            viewer,
            diagrams: Mutex::new(DiagramRenderer::default()),
            papers_dir: default_papers_dir(),
            opener: default_source_opener(),
            title: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_papers_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.papers_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_diagram_backend(self, backend: Box<dyn DiagramBackend>) -> Self {
        Self {
            diagrams: Mutex::new(DiagramRenderer::new(backend)),
            ..self
        }
    }

    #[must_use]
    pub fn with_source_opener(mut self, opener: SourceOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn chat(&self) -> &Arc<ChatSession> {
        &self.chat
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    pub fn viewer(&self) -> &ViewerHandle {
        &self.viewer
    }

    pub fn backend(&self) -> &Arc<dyn ReadingBackend> {
        &self.backend
    }

    pub fn title(&self) -> Option<String> {
        self.title
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn diagrams(&self) -> MutexGuard<'_, DiagramRenderer> {
        self.diagrams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn local_papers(&self) -> Result<Vec<LocalPaper>> {
        self.backend
            .local_papers()
            .await
            .context("Failed to list local papers")
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        self.backend
            .sessions(self.context.user_id())
            .await
            .context("Failed to list sessions")
    }

    /// Open a paper from the backend's local library
    pub async fn open_local_paper(&self, filename: &str) -> Result<()> {
        info!("Opening local paper {filename}");
        let session = match self
            .backend
            .use_local_paper(self.context.user_id(), filename)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.chat.push_system(format!("Failed to open {filename}: {e}"));
                return Err(e).context(format!("Failed to open local paper {filename}"));
            }
        };
        if !session.has_pdf && !session.has_markdown {
            self.chat
                .push_system(format!("{filename} has neither a PDF nor a text version"));
            bail!("Paper {filename} has neither a PDF nor a text version");
        }

        self.start_session(&session, filename);
        if session.has_pdf {
            let url_path = format!("local-papers/{}", pdf_filename(filename));
            self.load_pdf(&url_path).await;
        }
        self.mark_document_loaded();

        if session.has_markdown {
            self.context.notifier().notify_markdown_ready(true);
        } else {
            self.convert_to_text(&session.session_id).await;
        }
        self.proactive_summary(&session.session_id).await;
        Ok(())
    }

    /// Register a PDF by URL and open it as a new session
    pub async fn upload_paper(&self, pdf_url: &str, title: &str) -> Result<()> {
        info!("Uploading paper {pdf_url}");
        let session = match self
            .backend
            .upload(self.context.user_id(), pdf_url, title)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.chat.push_system(format!("Upload failed: {e}"));
                return Err(e).context("Failed to upload paper");
            }
        };

        self.start_session(&session, title);
        if let Some(url_path) = session.pdf_url.as_deref() {
            self.load_pdf(url_path.trim_start_matches('/')).await;
        }
        self.mark_document_loaded();

        self.convert_to_text(&session.session_id).await;
        self.proactive_summary(&session.session_id).await;
        Ok(())
    }

    /// Reopen a stored session with its chat history
    pub async fn restore_session(&self, session_id: &str) -> Result<SessionDetail> {
        let detail = self
            .backend
            .session(session_id)
            .await
            .with_context(|| format!("Failed to load session {session_id}"))?;
        info!(
            "Restoring session {session_id} with {} messages",
            detail.session_data.chat_history.len()
        );

        self.context.set_session_id(Some(detail.session_id.clone()));
        self.chat.set_session_id(Some(detail.session_id.clone()));
        self.diagrams().clear();
        self.chat.load_history(detail.session_data.chat_history.clone());
        *self.title.lock().unwrap_or_else(PoisonError::into_inner) = detail.title.clone();

        if let Some(url_path) = detail.paper_url_path() {
            self.load_pdf(&url_path).await;
        }
        self.mark_document_loaded();
        self.context
            .notifier()
            .notify_markdown_ready(detail.markdown_path.is_some());
        Ok(detail)
    }

    /// Drop the open document. The session stays current.
    pub fn clear_document(&self) {
        debug!("Clearing document");
        self.viewer.close();
        *self.title.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.chat.set_document_loaded(false);
        let notifier = self.context.notifier();
        notifier.notify_document_status(false);
        notifier.notify_markdown_ready(false);
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.backend
            .delete_session(session_id)
            .await
            .with_context(|| format!("Failed to delete session {session_id}"))?;
        if self.context.session_id().as_deref() == Some(session_id) {
            self.context.set_session_id(None);
            self.chat.set_session_id(None);
            self.chat.clear();
            self.diagrams().clear();
            self.clear_document();
        }
        Ok(())
    }

    pub async fn generate_mindmap(&self) -> Result<MindmapOutline> {
        let session_id = self.context.session_id().ok_or(ChatError::NoSession)?;
        self.backend
            .generate_mindmap(&session_id)
            .await
            .context("Failed to generate mind map")
    }

    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ChatError> {
        self.chat.send_message(text, &*self.backend).await
    }

    pub fn delete_message(&self, index: usize) -> bool {
        let deleted = self.chat.delete_message(index);
        if deleted {
            self.diagrams().clear();
        }
        deleted
    }

    /// Render diagrams of every assistant message that has new closed blocks
    pub fn render_diagrams(&self) -> PassReport {
        let history = self.chat.history();
        let mut diagrams = self.diagrams();
        let mut total = PassReport::default();
        for (index, message) in history.iter().enumerate() {
            if message.role != Role::Assistant || message.is_error {
                continue;
            }
            let report = diagrams.render_pass(index as u64, &message.content);
            total.rendered += report.rendered;
            total.failed += report.failed;
            total.skipped += report.skipped;
        }
        total
    }

    /// Run `f` against the diagram records, for display
    pub fn with_diagrams<R>(&self, f: impl FnOnce(&mut DiagramRenderer) -> R) -> R {
        f(&mut self.diagrams())
    }

    fn start_session(&self, session: &PaperSession, fallback_title: &str) {
        debug!("Starting session {}", session.session_id);
        self.context.set_session_id(Some(session.session_id.clone()));
        self.chat.set_session_id(Some(session.session_id.clone()));
        self.chat.clear();
        self.diagrams().clear();
        let title = if session.title.is_empty() {
            fallback_title.to_string()
        } else {
            session.title.clone()
        };
        *self.title.lock().unwrap_or_else(PoisonError::into_inner) = Some(title);
    }

    fn mark_document_loaded(&self) {
        self.chat.set_document_loaded(true);
        self.context.notifier().notify_document_status(true);
    }

    /// Download a PDF and hand it to the viewer. Failure is reported, not returned.
    async fn load_pdf(&self, url_path: &str) {
        if let Err(e) = self.try_load_pdf(url_path).await {
            warn!("Failed to load PDF {url_path}: {e:#}");
            self.chat.push_system(format!("Failed to load the PDF: {e:#}"));
        }
    }

    async fn try_load_pdf(&self, url_path: &str) -> Result<()> {
        let bytes = self
            .backend
            .download(url_path)
            .await
            .with_context(|| format!("Failed to download {url_path}"))?;
        let path = self.papers_dir.join(local_file_name(url_path));
        debug!("Saving {} bytes to {}", bytes.len(), path.display());

        std::fs::create_dir_all(&self.papers_dir)
            .with_context(|| format!("Failed to create {}", self.papers_dir.display()))?;
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let source = (self.opener)(&path)?;
        info!("Opened {} ({} pages)", path.display(), source.page_count());
        self.viewer.open(source);
        Ok(())
    }

    async fn convert_to_text(&self, session_id: &str) {
        match self.backend.convert_to_markdown(session_id).await {
            Ok(()) => {
                info!("Converted session {session_id} to text");
                self.context.notifier().notify_markdown_ready(true);
                self.chat.push_system("PDF conversion finished.");
            }
            Err(e) => {
                warn!("Conversion failed for {session_id}: {e}");
                self.chat
                    .push_system("PDF conversion failed, you can still ask about the PDF.");
            }
        }
    }

    async fn proactive_summary(&self, session_id: &str) {
        match self.backend.proactive_summary(session_id).await {
            Ok(summary) if !summary.trim().is_empty() => self.chat.push_assistant(summary),
            Ok(_) => debug!("Empty reading guide for {session_id}"),
            Err(e) => {
                warn!("Reading guide failed for {session_id}: {e}");
                self.chat
                    .push_system(format!("Failed to generate the reading guide: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_entries_map_to_their_pdf() {
        assert_eq!(pdf_filename("attention.md"), "attention.pdf");
        assert_eq!(pdf_filename("attention.pdf"), "attention.pdf");
    }

    #[test]
    fn local_file_names_drop_directories() {
        assert_eq!(local_file_name("local-papers/a b.pdf"), "a b.pdf");
        assert_eq!(local_file_name("uploads/../x.pdf"), "x.pdf");
        assert_eq!(local_file_name("uploads/"), "uploads");
        assert_eq!(local_file_name("c:\\tmp\\y.pdf"), "y.pdf");
    }

    #[test]
    fn dot_segments_never_escape_the_papers_dir() {
        assert_eq!(local_file_name("uploads/.."), "paper.pdf");
        assert_eq!(local_file_name("uploads/./"), "paper.pdf");
        assert_eq!(local_file_name(".."), "paper.pdf");
    }
}
