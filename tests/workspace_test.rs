use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use readagent::api::{PaperSession, SessionData, SessionDetail};
use readagent::chat::{ChatError, Message, Role};
use readagent::panel::{AppContext, DocumentStatus};
use readagent::test_utils::test_helpers::{
    Chunk, FakeBackend, FakePageSource, FakeTransport, StaticGauge,
};
use readagent::viewer::{PageSource, PageViewer, RenderError, Size, ViewerConfig};
use readagent::{ChatSession, Workspace};
use tempfile::TempDir;

struct Harness {
    backend: Arc<FakeBackend>,
    workspace: Workspace,
    opened: Arc<Mutex<Vec<PathBuf>>>,
    dir: TempDir,
}

fn harness(backend: FakeBackend) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(backend);
    let viewer = PageViewer::spawn(
        Arc::new(StaticGauge(Size::new(800.0, 600.0))),
        ViewerConfig::default(),
    );
    let opened = Arc::new(Mutex::new(Vec::new()));
    let seen = opened.clone();

    let workspace = Workspace::new(
        backend.clone(),
        Arc::new(ChatSession::new("user_test")),
        Arc::new(AppContext::new("user_test")),
        viewer,
    )
    .with_papers_dir(dir.path())
    .with_source_opener(Box::new(
        move |path: &Path| -> Result<Arc<dyn PageSource>, RenderError> {
            seen.lock().unwrap().push(path.to_path_buf());
            Ok(Arc::new(FakePageSource::portrait(3)))
        },
    ));

    Harness {
        backend,
        workspace,
        opened,
        dir,
    }
}

fn contents(workspace: &Workspace) -> Vec<(Role, String)> {
    workspace
        .chat()
        .history()
        .into_iter()
        .map(|m| (m.role, m.content))
        .collect()
}

/// `(loaded, text_ready)` of the current document
fn status(workspace: &Workspace) -> (bool, bool) {
    let DocumentStatus {
        loaded, text_ready, ..
    } = workspace.context().notifier().status();
    (loaded, text_ready)
}

#[tokio::test]
async fn opening_a_pdf_only_paper_converts_then_summarizes() {
    let h = harness(FakeBackend::new());

    h.workspace.open_local_paper("attention.md").await.unwrap();

    assert_eq!(
        h.backend.calls(),
        vec![
            "use_local_paper attention.md",
            "download local-papers/attention.pdf",
            "convert session-1",
            "summary session-1",
        ]
    );
    assert_eq!(
        contents(&h.workspace),
        vec![
            (Role::System, "PDF conversion finished.".to_string()),
            (Role::Assistant, "## Reading guide".to_string()),
        ]
    );
    assert_eq!(h.workspace.context().session_id().as_deref(), Some("session-1"));
    assert_eq!(h.workspace.chat().session_id().as_deref(), Some("session-1"));
    assert_eq!(h.workspace.title().as_deref(), Some("paper"));
    assert!(h.workspace.chat().can_send());
    assert_eq!(
        status(&h.workspace),
        (true, true)
    );

    let saved = h.dir.path().join("attention.pdf");
    assert_eq!(std::fs::read(&saved).unwrap(), b"%PDF-1.7");
    assert_eq!(*h.opened.lock().unwrap(), vec![saved]);

    let mut snapshots = h.workspace.viewer().subscribe();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.page_count == 3 && s.surface.is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(snapshot.page, 1);
}

#[tokio::test]
async fn paper_with_text_skips_conversion() {
    let mut backend = FakeBackend::new();
    backend.paper_session = Ok(PaperSession {
        session_id: "s2".to_string(),
        title: String::new(),
        has_markdown: true,
        has_pdf: true,
        pdf_url: None,
    });
    let h = harness(backend);

    h.workspace.open_local_paper("notes.pdf").await.unwrap();

    assert_eq!(
        h.backend.calls(),
        vec!["use_local_paper notes.pdf", "download local-papers/notes.pdf", "summary s2"]
    );
    assert_eq!(h.workspace.title().as_deref(), Some("notes.pdf"));
    assert!(status(&h.workspace).1);
}

#[tokio::test]
async fn failed_conversion_is_reported_and_the_flow_continues() {
    let mut backend = FakeBackend::new();
    backend.convert = Err("converter offline".to_string());
    let h = harness(backend);

    h.workspace.open_local_paper("attention.pdf").await.unwrap();

    assert_eq!(
        contents(&h.workspace),
        vec![
            (
                Role::System,
                "PDF conversion failed, you can still ask about the PDF.".to_string()
            ),
            (Role::Assistant, "## Reading guide".to_string()),
        ]
    );
    assert_eq!(
        status(&h.workspace),
        (true, false)
    );
    assert!(h.workspace.chat().can_send());
}

#[tokio::test]
async fn failed_summary_and_download_become_system_messages() {
    let mut backend = FakeBackend::new();
    backend.pdf = Err("gone".to_string());
    backend.summary = Err("model busy".to_string());
    let h = harness(backend);

    h.workspace.open_local_paper("attention.pdf").await.unwrap();

    let history = contents(&h.workspace);
    assert_eq!(history.len(), 3);
    assert!(history[0].1.starts_with("Failed to load the PDF"));
    assert_eq!(history[1].1, "PDF conversion finished.");
    assert!(history[2].1.starts_with("Failed to generate the reading guide"));
    assert!(history[2].1.contains("model busy"));
    assert!(h.opened.lock().unwrap().is_empty());
    assert!(status(&h.workspace).0);
}

#[tokio::test]
async fn rejected_paper_aborts_before_anything_else() {
    let mut backend = FakeBackend::new();
    backend.paper_session = Err("no such file".to_string());
    let h = harness(backend);

    let result = h.workspace.open_local_paper("missing.pdf").await;

    assert!(result.is_err());
    assert_eq!(h.backend.calls(), vec!["use_local_paper missing.pdf"]);
    assert!(h.workspace.context().session_id().is_none());
    assert!(!h.workspace.chat().can_send());
    let history = contents(&h.workspace);
    assert_eq!(history.len(), 1);
    assert!(history[0].1.starts_with("Failed to open missing.pdf"));
    assert_eq!(status(&h.workspace), (false, false));
}

#[tokio::test]
async fn uploaded_paper_loads_from_its_url() {
    let h = harness(FakeBackend::new());

    h.workspace
        .upload_paper("https://example.org/paper.pdf", "Paper")
        .await
        .unwrap();

    assert_eq!(
        h.backend.calls(),
        vec![
            "upload https://example.org/paper.pdf",
            "download uploads/paper.pdf",
            "convert session-1",
            "summary session-1",
        ]
    );
    assert!(h.dir.path().join("paper.pdf").exists());
}

#[tokio::test]
async fn restoring_a_session_brings_back_history_and_document() {
    let mut backend = FakeBackend::new();
    backend.detail = Some(SessionDetail {
        session_id: "s9".to_string(),
        title: Some("Attention".to_string()),
        current_state: Some("answered".to_string()),
        paper_path: Some("/srv/local_papers/attention.pdf".to_string()),
        markdown_path: Some("/srv/local_papers/attention.md".to_string()),
        session_data: SessionData {
            chat_history: vec![Message::user("What is new?"), Message::assistant("Attention.")],
            mindmap_outline: None,
        },
    });
    let h = harness(backend);

    let detail = h.workspace.restore_session("s9").await.unwrap();

    assert_eq!(detail.session_id, "s9");
    assert_eq!(
        h.backend.calls(),
        vec!["session s9", "download local-papers/attention.pdf"]
    );
    assert_eq!(
        contents(&h.workspace),
        vec![
            (Role::User, "What is new?".to_string()),
            (Role::Assistant, "Attention.".to_string()),
        ]
    );
    assert_eq!(h.workspace.context().session_id().as_deref(), Some("s9"));
    assert_eq!(h.workspace.title().as_deref(), Some("Attention"));
    assert_eq!(
        status(&h.workspace),
        (true, true)
    );
}

#[tokio::test]
async fn each_opened_paper_is_a_new_document_generation() {
    let h = harness(FakeBackend::new());
    let notifier = h.workspace.context().notifier();

    h.workspace.open_local_paper("attention.pdf").await.unwrap();
    let first = notifier.status();
    h.workspace.open_local_paper("transformers.pdf").await.unwrap();
    let second = notifier.status();

    assert!(first.loaded && second.loaded);
    assert!(second.generation > first.generation);
}

#[tokio::test]
async fn clearing_the_document_keeps_the_session() {
    let h = harness(FakeBackend::new());
    h.workspace.open_local_paper("attention.pdf").await.unwrap();
    let mut late = h.workspace.context().notifier().subscribe();
    assert!(late.current().loaded);

    h.workspace.clear_document();

    assert_eq!(status(&h.workspace), (false, false));
    assert_eq!(
        late.changed().await.map(|s| (s.loaded, s.text_ready)),
        Some((false, false))
    );
    assert!(!h.workspace.chat().can_send());
    assert!(h.workspace.title().is_none());
    assert_eq!(h.workspace.context().session_id().as_deref(), Some("session-1"));

    let mut snapshots = h.workspace.viewer().subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.page_count == 0 && s.surface.is_none()),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn deleting_the_current_session_resets_everything() {
    let h = harness(FakeBackend::new());
    h.workspace.open_local_paper("attention.pdf").await.unwrap();

    h.workspace.delete_session("session-1").await.unwrap();

    assert!(h.backend.calls().contains(&"delete session-1".to_string()));
    assert!(h.workspace.context().session_id().is_none());
    assert!(h.workspace.chat().is_empty());
    assert_eq!(status(&h.workspace), (false, false));
}

#[tokio::test]
async fn mind_map_needs_a_session() {
    let h = harness(FakeBackend::new());

    let err = h.workspace.generate_mindmap().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ChatError>(),
        Some(ChatError::NoSession)
    ));
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn mind_map_of_the_open_session() {
    let h = harness(FakeBackend::new());
    h.workspace.open_local_paper("attention.pdf").await.unwrap();

    let outline = h.workspace.generate_mindmap().await.unwrap();

    assert_eq!(outline.markdown, "# Paper\n## Method");
    assert_eq!(h.backend.calls().last().map(String::as_str), Some("mindmap session-1"));
}

#[tokio::test]
async fn streamed_reply_diagrams_render_once() {
    let reply = "Flow:\n```mermaid\ngraph TD\nA-->B\n```\ndone";
    let mut backend = FakeBackend::new();
    backend.chat = FakeTransport::new().with_reply(vec![Chunk::delta(reply), Chunk::done()]);
    backend.summary = Ok(String::new());
    let h = harness(backend);
    h.workspace.open_local_paper("attention.pdf").await.unwrap();

    h.workspace.send_message("Show the method").await.unwrap();

    let first = h.workspace.render_diagrams();
    let second = h.workspace.render_diagrams();
    assert_eq!((first.rendered, first.failed), (1, 0));
    assert_eq!((second.rendered, second.skipped), (0, 1));

    let index = h.workspace.chat().len() - 1;
    assert!(h.workspace.delete_message(index));
    assert!(h.workspace.with_diagrams(|d| d.is_empty()));
}
