//! Terminal front end state and key handling

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use log::{debug, info, warn};
use ratatui::Terminal;
use ratatui::backend::Backend;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::watch;

use crate::api::LocalPaper;
use crate::chat::{ChatError, ChatNotice, IgnoreReason, SendOutcome};
use crate::client_state::ClientState;
use crate::event_source::EventSource;
use crate::notification::NotificationManager;
use crate::panel::{MindmapAction, PanelState, PanelSubscription, PanelView};
use crate::viewer::{PaneGauge, ViewerSnapshot};
use crate::workspace::Workspace;

use super::ui;

const TICK: Duration = Duration::from_millis(250);
const RESIZE_STEP: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Viewer,
    Chat,
    Panel,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Viewer => Focus::Chat,
            Focus::Chat => Focus::Panel,
            Focus::Panel => Focus::Viewer,
        }
    }
}

/// Results of background work, delivered back to the UI loop
#[derive(Debug)]
pub enum TaskResult {
    Papers(Result<Vec<LocalPaper>, String>),
    Opened { name: String, result: Result<(), String> },
    Mindmap {
        generation: u64,
        result: Result<String, String>,
    },
    Sent(Result<SendOutcome, ChatError>),
}

pub struct App {
    workspace: Arc<Workspace>,
    client_state: ClientState,
    gauge: Arc<PaneGauge>,
    pub(super) panel: PanelState,
    panel_status: PanelSubscription,
    chat_notices: UnboundedReceiver<ChatNotice>,
    viewer: watch::Receiver<ViewerSnapshot>,
    tasks_tx: UnboundedSender<TaskResult>,
    tasks_rx: UnboundedReceiver<TaskResult>,
    pub(super) notifications: NotificationManager,
    pub(super) focus: Focus,
    pub(super) input: String,
    pub(super) selected_message: Option<usize>,
    pub(super) papers: Vec<LocalPaper>,
    pub(super) paper_cursor: usize,
    pub(super) chat_scroll: u16,
    should_quit: bool,
}

impl App {
    pub fn new(workspace: Arc<Workspace>, gauge: Arc<PaneGauge>, client_state: ClientState) -> Self {
        let (tasks_tx, tasks_rx) = unbounded_channel();
        let chat_notices = workspace.chat().subscribe();
        let mut panel_status = workspace.context().notifier().subscribe();
        let mut panel = PanelState::default();
        panel.apply_status(panel_status.current());
        let viewer = workspace.viewer().subscribe();
        Self {
            workspace,
            client_state,
            gauge,
            panel,
            panel_status,
            chat_notices,
            viewer,
            tasks_tx,
            tasks_rx,
            notifications: NotificationManager::new(),
            focus: Focus::Chat,
            input: String::new(),
            selected_message: None,
            papers: Vec::new(),
            paper_cursor: 0,
            chat_scroll: 0,
            should_quit: false,
        }
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn client_state(&self) -> &ClientState {
        &self.client_state
    }

    pub fn gauge(&self) -> &PaneGauge {
        &self.gauge
    }

    pub fn viewer_snapshot(&self) -> ViewerSnapshot {
        self.viewer.borrow().clone()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Run `work` on the runtime and hand its result back to the UI loop
    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        let tx = self.tasks_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
    }

    pub fn refresh_papers(&self) {
        let workspace = Arc::clone(&self.workspace);
        self.spawn(async move {
            TaskResult::Papers(workspace.local_papers().await.map_err(|e| format!("{e:#}")))
        });
    }

    fn open_selected_paper(&mut self) {
        let Some(paper) = self.papers.get(self.paper_cursor) else {
            self.notifications.warn("No paper selected");
            return;
        };
        let name = paper.filename.clone();
        self.notifications.info(format!("Opening {}", paper.title));
        let workspace = Arc::clone(&self.workspace);
        self.spawn(async move {
            let result = workspace
                .open_local_paper(&name)
                .await
                .map_err(|e| format!("{e:#}"));
            TaskResult::Opened { name, result }
        });
    }

    fn send_input(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        if !self.workspace.chat().can_send() {
            self.notifications.warn("Open a paper and wait for the reply to finish");
            return;
        }
        self.input.clear();
        self.chat_scroll = 0;
        let workspace = Arc::clone(&self.workspace);
        self.spawn(async move { TaskResult::Sent(workspace.send_message(&text).await) });
    }

    fn start_mindmap(&mut self, action: MindmapAction) {
        match action {
            MindmapAction::Disabled => self.notifications.warn("Mind map needs a loaded paper"),
            MindmapAction::Busy | MindmapAction::Show => {}
            MindmapAction::Generate => {
                let workspace = Arc::clone(&self.workspace);
                let generation = self.panel.generation;
                self.spawn(async move {
                    let result = workspace
                        .generate_mindmap()
                        .await
                        .map(|outline| outline.markdown)
                        .map_err(|e| format!("{e:#}"));
                    TaskResult::Mindmap { generation, result }
                });
            }
        }
    }

    fn copy_message(&mut self, index: usize) {
        let Some(text) = self.workspace.chat().message_text(index) else {
            return;
        };
        let copied = arboard::Clipboard::new()
            .map_err(|e| format!("Failed to access clipboard: {e}"))
            .and_then(|mut clipboard| {
                clipboard
                    .set_text(text)
                    .map_err(|e| format!("Failed to copy to clipboard: {e}"))
            });
        match copied {
            Ok(()) => self.notifications.success("Copied to clipboard"),
            Err(e) => {
                warn!("{e}");
                self.notifications.error(e);
            }
        }
    }

    fn resize(&mut self, left: f32, right: f32) {
        let mut layout = self.client_state.layout();
        layout.resize_left(left);
        layout.resize_right(right);
        self.client_state.set_layout(layout);
    }

    fn toggle_collapsed(&mut self, left: bool) {
        let mut layout = self.client_state.layout();
        if left {
            layout.left_panel_collapsed = !layout.left_panel_collapsed;
        } else {
            layout.right_panel_collapsed = !layout.right_panel_collapsed;
        }
        self.client_state.set_layout(layout);
    }

    pub fn handle_event(&mut self, event: Event) {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                self.handle_key(key);
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if key.code == KeyCode::Tab {
            self.focus = self.focus.next();
            self.selected_message = None;
            return;
        }
        if self.focus == Focus::Chat && self.handle_chat_key(key) {
            return;
        }
        self.handle_global_key(key);
    }

    /// Keys consumed by the chat pane. Typing goes to the input line
    /// unless a message is selected.
    fn handle_chat_key(&mut self, key: KeyEvent) -> bool {
        let history_len = self.workspace.chat().len();
        match key.code {
            KeyCode::Enter => self.send_input(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Up => {
                self.selected_message = match self.selected_message {
                    None if history_len > 0 => Some(history_len - 1),
                    Some(i) => Some(i.saturating_sub(1)),
                    None => None,
                };
            }
            KeyCode::Down => {
                self.selected_message = self
                    .selected_message
                    .map(|i| i + 1)
                    .filter(|&i| i < history_len);
            }
            KeyCode::PageUp => self.chat_scroll = self.chat_scroll.saturating_add(5),
            KeyCode::PageDown => self.chat_scroll = self.chat_scroll.saturating_sub(5),
            KeyCode::Esc => self.selected_message = None,
            KeyCode::Char('d') if self.selected_message.is_some() => {
                if let Some(index) = self.selected_message.take() {
                    if self.workspace.delete_message(index) {
                        self.notifications.info("Message deleted");
                    } else {
                        self.notifications.warn("Cannot delete while a reply is streaming");
                    }
                }
            }
            KeyCode::Char('y') if self.selected_message.is_some() => {
                if let Some(index) = self.selected_message {
                    self.copy_message(index);
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.selected_message = None;
                self.input.push(c);
            }
            _ => return false,
        }
        true
    }

    fn handle_global_key(&mut self, key: KeyEvent) {
        let workspace = Arc::clone(&self.workspace);
        let viewer = workspace.viewer();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('n') | KeyCode::Right => viewer.next_page(),
            KeyCode::Char('p') | KeyCode::Left => viewer.prev_page(),
            KeyCode::Char('+') | KeyCode::Char('=') => viewer.zoom_in(),
            KeyCode::Char('-') => viewer.zoom_out(),
            KeyCode::Char('0') => viewer.zoom_reset(),
            KeyCode::Char('[') => self.resize(-RESIZE_STEP, 0.0),
            KeyCode::Char(']') => self.resize(RESIZE_STEP, 0.0),
            KeyCode::Char('{') => self.resize(0.0, -RESIZE_STEP),
            KeyCode::Char('}') => self.resize(0.0, RESIZE_STEP),
            KeyCode::Char('h') => self.toggle_collapsed(true),
            KeyCode::Char('l') => self.toggle_collapsed(false),
            KeyCode::Char('m') => {
                let action = self.panel.begin_mindmap();
                self.start_mindmap(action);
            }
            KeyCode::Char('r') if self.panel.view == PanelView::Mindmap => {
                let action = self.panel.retry_mindmap();
                self.start_mindmap(action);
            }
            KeyCode::Esc => self.panel.back_to_controls(),
            KeyCode::Char('c') => {
                workspace.clear_document();
                self.notifications.info("Document closed");
            }
            KeyCode::Char('j') | KeyCode::Down if self.focus == Focus::Panel => {
                if self.paper_cursor + 1 < self.papers.len() {
                    self.paper_cursor += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up if self.focus == Focus::Panel => {
                self.paper_cursor = self.paper_cursor.saturating_sub(1);
            }
            KeyCode::Char('o') | KeyCode::Enter if self.focus == Focus::Panel => {
                self.open_selected_paper();
            }
            KeyCode::Char('g') => self.refresh_papers(),
            _ => {}
        }
    }

    pub fn on_task(&mut self, result: TaskResult) {
        match result {
            TaskResult::Papers(Ok(papers)) => {
                debug!("{} local papers", papers.len());
                self.paper_cursor = self.paper_cursor.min(papers.len().saturating_sub(1));
                self.papers = papers;
            }
            TaskResult::Papers(Err(e)) => self.notifications.error(e),
            TaskResult::Opened { name, result } => match result {
                Ok(()) => info!("Opened {name}"),
                Err(e) => self.notifications.error(e),
            },
            TaskResult::Mindmap { generation, result } => {
                if let Err(e) = &result {
                    warn!("Mind map failed: {e}");
                }
                self.panel.finish_mindmap(generation, result);
            }
            TaskResult::Sent(Ok(SendOutcome::Failed(message))) => {
                self.notifications.error(message);
            }
            TaskResult::Sent(Ok(SendOutcome::Ignored(IgnoreReason::Busy))) => {
                self.notifications.warn("A reply is still streaming");
            }
            TaskResult::Sent(Ok(_)) => {}
            TaskResult::Sent(Err(e)) => self.notifications.error(e.to_string()),
        }
    }

    /// Pick up everything that arrived without waking the loop
    pub fn drain(&mut self) {
        while let Ok(result) = self.tasks_rx.try_recv() {
            self.on_task(result);
        }
        while self.chat_notices.try_recv().is_ok() {}
        if self.panel_status.has_changed() {
            let status = self.panel_status.current();
            self.panel.apply_status(status);
        }
        self.workspace.render_diagrams();
        self.notifications.update();
    }

    async fn wait(&mut self, events: &mut EventSource) -> Result<()> {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => self.handle_event(event),
                Some(Err(e)) => return Err(e.into()),
                None => self.should_quit = true,
            },
            Some(result) = self.tasks_rx.recv() => self.on_task(result),
            Some(_) = self.chat_notices.recv() => {}
            Some(status) = self.panel_status.changed() => self.panel.apply_status(status),
            Ok(()) = self.viewer.changed() => {}
            _ = tokio::time::sleep(TICK) => {}
        }
        Ok(())
    }
}

/// Draw and react until the user quits
pub async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut events: EventSource,
) -> Result<()>
where
    B::Error: std::error::Error + Send + Sync + 'static,
{
    app.refresh_papers();
    loop {
        app.drain();
        terminal.draw(|frame| ui::draw(frame, app))?;
        if app.should_quit() {
            break;
        }
        app.wait(&mut events).await?;
    }
    Ok(())
}
