//! Incremental rendering of the diagram blocks inside chat messages
//!
//! A pass may run any number of times over the same message, for instance
//! after every streamed delta. Each closed block is rendered once; a block
//! that failed keeps its fallback until [`DiagramRenderer::retry`] is asked
//! for it explicitly.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use super::error::DiagramError;
use super::fallback::FallbackPanel;
use super::mermaid::MermaidBackend;
use super::normalize::normalize_source;
use super::scan::scan_diagram_blocks;
use super::DiagramBackend;

/// Identifies the message a block belongs to
pub type MessageKey = u64;

static NEXT_DIAGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Fresh process-wide unique element id, `diagram-<n>`
pub fn next_diagram_id() -> String {
    format!("diagram-{}", NEXT_DIAGRAM_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedDiagram {
    pub id: String,
    pub markup: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockState {
    Rendered(RenderedDiagram),
    Failed {
        error: DiagramError,
        panel: FallbackPanel,
    },
}

impl BlockState {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }
}

#[derive(Clone, Debug)]
pub struct DiagramBlock {
    /// Source as it appeared in the message, before normalization
    pub raw: String,
    /// Cleared when the backend failed, which makes the block retryable
    pub processed: bool,
    pub attempts: u32,
    pub state: BlockState,
}

/// What a single pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub rendered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A message split into prose and diagrams for display
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Diagram {
        ordinal: usize,
        source: String,
        /// `None` until a pass has seen the block
        state: Option<BlockState>,
    },
}

pub struct DiagramRenderer {
    backend: Box<dyn DiagramBackend>,
    blocks: HashMap<(MessageKey, usize), DiagramBlock>,
}

impl Default for DiagramRenderer {
    fn default() -> Self {
        Self::new(Box::new(MermaidBackend::new()))
    }
}

impl std::fmt::Debug for DiagramRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramRenderer")
            .field("blocks", &self.blocks.len())
            .finish_non_exhaustive()
    }
}

impl DiagramRenderer {
    pub fn new(backend: Box<dyn DiagramBackend>) -> Self {
        Self {
            backend,
            blocks: HashMap::new(),
        }
    }

    /// Render every closed block of `content` that has not been seen yet.
    ///
    /// Never fails: a block whose backend errors or panics gets a fallback
    /// panel and the pass moves on to the next one.
    pub fn render_pass(&mut self, key: MessageKey, content: &str) -> PassReport {
        let mut report = PassReport::default();

        for fenced in scan_diagram_blocks(content) {
            let slot = (key, fenced.ordinal);
            if let Some(existing) = self.blocks.get(&slot) {
                if existing.raw == fenced.source {
                    report.skipped += 1;
                    continue;
                }
                debug!("Diagram {}/{} changed, rendering again", key, fenced.ordinal);
            }

            let block = self.render_block(fenced.source, 1);
            if block.state.is_rendered() {
                report.rendered += 1;
            } else {
                report.failed += 1;
            }
            self.blocks.insert(slot, block);
        }

        if report.rendered + report.failed > 0 {
            debug!("Diagram pass for message {key}: {report:?}");
        }
        report
    }

    /// Render a failed block again. Returns the new state, or `None` when
    /// there is no failed block at that position.
    pub fn retry(&mut self, key: MessageKey, ordinal: usize) -> Option<&BlockState> {
        let slot = (key, ordinal);
        let previous = self.blocks.get(&slot).filter(|b| !b.processed)?;
        let (raw, attempts) = (previous.raw.clone(), previous.attempts + 1);

        let block = self.render_block(raw, attempts);
        self.blocks.insert(slot, block);
        self.blocks.get(&slot).map(|b| &b.state)
    }

    fn render_block(&self, raw: String, attempts: u32) -> DiagramBlock {
        let id = next_diagram_id();
        let source = normalize_source(&raw);
        match isolated_render(self.backend.as_ref(), &id, &source) {
            Ok(markup) => DiagramBlock {
                raw,
                processed: true,
                attempts,
                state: BlockState::Rendered(RenderedDiagram { id, markup }),
            },
            Err(error) => {
                warn!("Diagram {id} failed to render (attempt {attempts}): {error}");
                DiagramBlock {
                    state: BlockState::Failed {
                        panel: FallbackPanel::new(error.to_string(), raw.clone()),
                        error,
                    },
                    raw,
                    processed: false,
                    attempts,
                }
            }
        }
    }

    /// Split `content` into prose and diagram segments in document order
    pub fn view(&self, key: MessageKey, content: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut cursor = 0;

        for fenced in scan_diagram_blocks(content) {
            if fenced.range.start > cursor {
                segments.push(Segment::Text(content[cursor..fenced.range.start].to_string()));
            }
            let state = self
                .blocks
                .get(&(key, fenced.ordinal))
                .filter(|b| b.raw == fenced.source)
                .map(|b| b.state.clone());
            segments.push(Segment::Diagram {
                ordinal: fenced.ordinal,
                source: fenced.source,
                state,
            });
            cursor = fenced.range.end;
        }

        if cursor < content.len() {
            segments.push(Segment::Text(content[cursor..].to_string()));
        }
        segments
    }

    pub fn block(&self, key: MessageKey, ordinal: usize) -> Option<&DiagramBlock> {
        self.blocks.get(&(key, ordinal))
    }

    /// Drop every record of one message
    pub fn forget(&mut self, key: MessageKey) {
        self.blocks.retain(|(k, _), _| *k != key);
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

thread_local! {
    static QUIET_PANICS: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

/// Wrap the hook installed at the time of the first render so panics caught
/// here do not print over the terminal UI. Panics elsewhere, or on other
/// threads, still reach the wrapped hook.
fn install_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !QUIET_PANICS.try_with(Cell::get).unwrap_or(false) {
                previous(info);
            }
        }));
    });
}

fn isolated_render(
    backend: &dyn DiagramBackend,
    id: &str,
    source: &str,
) -> Result<String, DiagramError> {
    install_quiet_hook();
    QUIET_PANICS.with(|quiet| quiet.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(|| backend.render(id, source)));
    QUIET_PANICS.with(|quiet| quiet.set(false));

    match result {
        Ok(rendered) => rendered,
        Err(payload) => Err(DiagramError::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
