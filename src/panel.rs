//! Document status propagation and the tool panel
//!
//! The workflow that loads a paper publishes "document loaded" and "text
//! ready" through a [`PanelNotifier`]. Components subscribe whenever they
//! come up and immediately see the latest status, so a component created
//! after the notification still ends up in the right state.

use std::sync::{PoisonError, RwLock};

use log::debug;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentStatus {
    pub loaded: bool,
    pub text_ready: bool,
    /// Bumped on every load or unload, so opening another paper is a change
    /// even though `loaded` stays true
    pub generation: u64,
}

/// Fire-and-forget publisher of [`DocumentStatus`]
#[derive(Debug)]
pub struct PanelNotifier {
    status: watch::Sender<DocumentStatus>,
}

impl Default for PanelNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelNotifier {
    pub fn new() -> Self {
        let (status, _) = watch::channel(DocumentStatus::default());
        Self { status }
    }

    /// A new document (or none). Text readiness starts over.
    pub fn notify_document_status(&self, loaded: bool) {
        self.status.send_modify(|s| {
            *s = DocumentStatus {
                loaded,
                text_ready: false,
                generation: s.generation + 1,
            };
            debug!("Document status: loaded={loaded} generation={}", s.generation);
        });
    }

    pub fn notify_markdown_ready(&self, ready: bool) {
        debug!("Document status: text_ready={ready}");
        self.status.send_modify(|s| s.text_ready = ready);
    }

    pub fn status(&self) -> DocumentStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> PanelSubscription {
        PanelSubscription {
            rx: self.status.subscribe(),
        }
    }
}

/// Receiving end held by a component
#[derive(Debug, Clone)]
pub struct PanelSubscription {
    rx: watch::Receiver<DocumentStatus>,
}

impl PanelSubscription {
    /// Latest status, marking it seen
    pub fn current(&mut self) -> DocumentStatus {
        *self.rx.borrow_and_update()
    }

    /// Wait for the next change. `None` once the notifier is gone.
    pub async fn changed(&mut self) -> Option<DocumentStatus> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

/// Process-wide pointers shared by the components
#[derive(Debug)]
pub struct AppContext {
    notifier: PanelNotifier,
    session_id: RwLock<Option<String>>,
    user_id: String,
}

impl AppContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            notifier: PanelNotifier::new(),
            session_id: RwLock::new(None),
            user_id: user_id.into(),
        }
    }

    pub fn notifier(&self) -> &PanelNotifier {
        &self.notifier
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overwrite the current session wholesale
    pub fn set_session_id(&self, session_id: Option<String>) {
        *self
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session_id;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanelView {
    #[default]
    Controls,
    Mindmap,
}

/// What a click on the mind map tool should do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MindmapAction {
    /// Tools are disabled until a paper with text is loaded
    Disabled,
    /// Already generating, wait
    Busy,
    /// Data is present, just switch view
    Show,
    /// Ask the backend for a mind map, then call `finish_mindmap`
    Generate,
}

/// State of the tool panel
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PanelState {
    pub pdf_loaded: bool,
    pub mindmap_enabled: bool,
    pub notes_enabled: bool,
    pub view: PanelView,
    pub mindmap: Option<String>,
    pub mindmap_generating: bool,
    pub mindmap_error: Option<String>,
    /// Document generation this state belongs to
    pub generation: u64,
}

impl PanelState {
    pub fn set_pdf_loaded(&mut self, loaded: bool) {
        self.pdf_loaded = loaded;
        self.mindmap = None;
        self.mindmap_error = None;
        self.mindmap_generating = false;
        self.view = PanelView::Controls;
        if !loaded {
            self.mindmap_enabled = false;
            self.notes_enabled = false;
        }
    }

    /// Tools switch on only once a loaded paper also has its text
    pub fn set_markdown_ready(&mut self, ready: bool) {
        if ready && self.pdf_loaded {
            self.mindmap_enabled = true;
            self.notes_enabled = true;
        }
    }

    pub fn apply_status(&mut self, status: DocumentStatus) {
        if status.generation != self.generation {
            self.generation = status.generation;
            self.set_pdf_loaded(status.loaded);
            self.mindmap_enabled = false;
            self.notes_enabled = false;
        }
        self.set_markdown_ready(status.text_ready);
    }

    pub fn begin_mindmap(&mut self) -> MindmapAction {
        if !self.mindmap_enabled {
            return MindmapAction::Disabled;
        }
        if self.mindmap_generating {
            return MindmapAction::Busy;
        }
        self.view = PanelView::Mindmap;
        if self.mindmap.is_some() {
            return MindmapAction::Show;
        }
        self.mindmap_generating = true;
        self.mindmap_error = None;
        MindmapAction::Generate
    }

    /// Store a generation result. Results for an earlier document are
    /// dropped and `false` is returned.
    pub fn finish_mindmap(&mut self, generation: u64, result: Result<String, String>) -> bool {
        if generation != self.generation {
            debug!("Dropping mind map of document generation {generation}");
            return false;
        }
        self.mindmap_generating = false;
        match result {
            Ok(markdown) => self.mindmap = Some(markdown),
            Err(e) => self.mindmap_error = Some(format!("Generation failed: {e}")),
        }
        true
    }

    pub fn retry_mindmap(&mut self) -> MindmapAction {
        self.mindmap = None;
        self.mindmap_error = None;
        self.begin_mindmap()
    }

    pub fn back_to_controls(&mut self) {
        self.view = PanelView::Controls;
    }
}
