//! Fake collaborators for tests
//!
//! Compiled for unit tests and, with the `test-utils` feature, for the
//! integration tests under `tests/`.

pub mod test_helpers {
    use std::collections::VecDeque;
    use std::sync::{Condvar, Mutex, PoisonError};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use crate::api::{
        ApiError, ChatRequest, LocalPaper, MindmapOutline, PaperSession, ReadingBackend,
        SessionDetail, SessionSummary,
    };
    use crate::chat::{ChatTransport, ChunkStream};
    use crate::event_source::{Event, KeyCode, KeyModifiers, SimulatedEventSource};
    use crate::viewer::{ContainerGauge, PageSource, Raster, RenderError, Size, TextRun};

    fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One piece of a scripted response body
    #[derive(Clone, Debug)]
    pub enum Chunk {
        Data(String),
        /// Transport failure while reading
        Fail(String),
        /// Never produce anything else
        Hang,
    }

    impl Chunk {
        pub fn data(text: &str) -> Self {
            Chunk::Data(text.to_string())
        }

        pub fn delta(content: &str) -> Self {
            Chunk::Data(format!(
                "data: {}\n\n",
                serde_json::json!({ "content": content })
            ))
        }

        pub fn done() -> Self {
            Chunk::data("data: {\"event\":\"done\",\"state\":\"answered\"}\n\n")
        }
    }

    fn chunk_stream(script: Vec<Chunk>) -> ChunkStream {
        let items = stream::iter(script).flat_map(|chunk| match chunk {
            Chunk::Data(text) => stream::once(async move { Ok(Bytes::from(text)) }).boxed(),
            Chunk::Fail(msg) => {
                stream::once(async move { Err(ApiError::generic(msg)) }).boxed()
            }
            Chunk::Hang => stream::pending().boxed(),
        });
        Box::pin(items)
    }

    /// Chat transport replaying scripted bodies, one per request
    #[derive(Debug, Default)]
    pub struct FakeTransport {
        scripts: Mutex<VecDeque<Result<Vec<Chunk>, String>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_reply(self, chunks: Vec<Chunk>) -> Self {
            lock(&self.scripts).push_back(Ok(chunks));
            self
        }

        /// The request itself fails before any byte arrives
        pub fn with_open_failure(self, message: &str) -> Self {
            lock(&self.scripts).push_back(Err(message.to_string()));
            self
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            lock(&self.requests).clone()
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ApiError> {
            lock(&self.requests).push(request.clone());
            let script = lock(&self.scripts).pop_front().unwrap_or_else(|| Ok(Vec::new()));
            match script {
                Ok(chunks) => Ok(chunk_stream(chunks)),
                Err(message) => Err(ApiError::Backend {
                    status: 500,
                    message,
                }),
            }
        }
    }

    /// In-memory backend recording the calls it receives
    #[derive(Debug)]
    pub struct FakeBackend {
        pub chat: FakeTransport,
        pub papers: Vec<LocalPaper>,
        pub paper_session: Result<PaperSession, String>,
        pub convert: Result<(), String>,
        pub summary: Result<String, String>,
        pub mindmap: Result<String, String>,
        pub detail: Option<SessionDetail>,
        pub pdf: Result<Vec<u8>, String>,
        calls: Mutex<Vec<String>>,
    }

    impl Default for FakeBackend {
        fn default() -> Self {
            Self {
                chat: FakeTransport::new(),
                papers: Vec::new(),
                paper_session: Ok(PaperSession {
                    session_id: "session-1".to_string(),
                    title: "paper".to_string(),
                    has_markdown: false,
                    has_pdf: true,
                    pdf_url: Some("/uploads/paper.pdf".to_string()),
                }),
                convert: Ok(()),
                summary: Ok("## Reading guide".to_string()),
                mindmap: Ok("# Paper\n## Method".to_string()),
                detail: None,
                pdf: Ok(b"%PDF-1.7".to_vec()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Names of the endpoints hit so far, in order
        pub fn calls(&self) -> Vec<String> {
            lock(&self.calls).clone()
        }

        fn record(&self, call: impl Into<String>) {
            lock(&self.calls).push(call.into());
        }
    }

    fn backend_error(message: &str) -> ApiError {
        ApiError::Backend {
            status: 500,
            message: message.to_string(),
        }
    }

    #[async_trait]
    impl ChatTransport for FakeBackend {
        async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ApiError> {
            self.record("chat");
            self.chat.open_chat_stream(request).await
        }
    }

    #[async_trait]
    impl ReadingBackend for FakeBackend {
        async fn local_papers(&self) -> Result<Vec<LocalPaper>, ApiError> {
            self.record("local_papers");
            Ok(self.papers.clone())
        }

        async fn use_local_paper(
            &self,
            _user_id: &str,
            filename: &str,
        ) -> Result<PaperSession, ApiError> {
            self.record(format!("use_local_paper {filename}"));
            self.paper_session.clone().map_err(|e| backend_error(&e))
        }

        async fn upload(
            &self,
            _user_id: &str,
            pdf_url: &str,
            _title: &str,
        ) -> Result<PaperSession, ApiError> {
            self.record(format!("upload {pdf_url}"));
            self.paper_session.clone().map_err(|e| backend_error(&e))
        }

        async fn convert_to_markdown(&self, session_id: &str) -> Result<(), ApiError> {
            self.record(format!("convert {session_id}"));
            self.convert.clone().map_err(|e| backend_error(&e))
        }

        async fn proactive_summary(&self, session_id: &str) -> Result<String, ApiError> {
            self.record(format!("summary {session_id}"));
            self.summary.clone().map_err(|e| backend_error(&e))
        }

        async fn generate_mindmap(&self, session_id: &str) -> Result<MindmapOutline, ApiError> {
            self.record(format!("mindmap {session_id}"));
            self.mindmap
                .clone()
                .map(|markdown| MindmapOutline {
                    markdown,
                    from_cache: false,
                })
                .map_err(|e| backend_error(&e))
        }

        async fn session(&self, session_id: &str) -> Result<SessionDetail, ApiError> {
            self.record(format!("session {session_id}"));
            self.detail
                .clone()
                .ok_or_else(|| backend_error("session not found"))
        }

        async fn sessions(&self, _user_id: &str) -> Result<Vec<SessionSummary>, ApiError> {
            self.record("sessions");
            Ok(Vec::new())
        }

        async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
            self.record(format!("delete {session_id}"));
            Ok(())
        }

        async fn download(&self, url_path: &str) -> Result<Bytes, ApiError> {
            self.record(format!("download {url_path}"));
            self.pdf
                .clone()
                .map(Bytes::from)
                .map_err(|e| backend_error(&e))
        }
    }

    /// Page source with fixed-size pages that can hold rasterization
    #[derive(Debug)]
    pub struct FakePageSource {
        pages: usize,
        size: Size,
        paused: Mutex<bool>,
        resumed: Condvar,
        rasterized: Mutex<Vec<usize>>,
        started: Mutex<Vec<usize>>,
    }

    impl FakePageSource {
        pub fn new(pages: usize, size: Size) -> Self {
            Self {
                pages,
                size,
                paused: Mutex::new(false),
                resumed: Condvar::new(),
                rasterized: Mutex::new(Vec::new()),
                started: Mutex::new(Vec::new()),
            }
        }

        /// Letter-ish pages in portrait
        pub fn portrait(pages: usize) -> Self {
            Self::new(pages, Size::new(600.0, 800.0))
        }

        /// Block rasterization until [`FakePageSource::resume`]
        pub fn pause(&self) {
            *lock(&self.paused) = true;
        }

        pub fn resume(&self) {
            *lock(&self.paused) = false;
            self.resumed.notify_all();
        }

        /// Pages whose rasterization finished, in order
        pub fn rasterized(&self) -> Vec<usize> {
            lock(&self.rasterized).clone()
        }

        /// Pages whose rasterization began, in order
        pub fn started(&self) -> Vec<usize> {
            lock(&self.started).clone()
        }
    }

    impl PageSource for FakePageSource {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn page_size(&self, page: usize) -> Result<Size, RenderError> {
            crate::viewer::check_page(page, self.pages)?;
            Ok(self.size)
        }

        fn rasterize(&self, page: usize, scale: f32) -> Result<Raster, RenderError> {
            crate::viewer::check_page(page, self.pages)?;
            lock(&self.started).push(page);
            let mut paused = lock(&self.paused);
            while *paused {
                paused = self
                    .resumed
                    .wait(paused)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            drop(paused);

            let scaled = self.size.scaled(scale);
            let width_px = scaled.width.round().max(1.0) as u32;
            let height_px = scaled.height.round().max(1.0) as u32;
            lock(&self.rasterized).push(page);
            Ok(Raster {
                pixels: vec![255; 3 * width_px as usize * height_px as usize],
                width_px,
                height_px,
            })
        }

        fn text_runs(&self, page: usize, scale: f32) -> Result<Vec<TextRun>, RenderError> {
            crate::viewer::check_page(page, self.pages)?;
            Ok(vec![TextRun {
                text: format!("Page {page}"),
                x0: 10.0 * scale,
                y0: 10.0 * scale,
                x1: 80.0 * scale,
                y1: 24.0 * scale,
            }])
        }
    }

    /// Gauge that always reports the same size
    #[derive(Debug, Clone, Copy)]
    pub struct StaticGauge(pub Size);

    impl ContainerGauge for StaticGauge {
        fn measure(&self) -> Size {
            self.0
        }
    }

    /// Shorthand for building key sequences
    #[derive(Debug, Default)]
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        pub fn type_text(mut self, text: &str) -> Self {
            for c in text.chars() {
                self.events.push(SimulatedEventSource::char_key(c));
            }
            self
        }

        pub fn press(mut self, code: KeyCode) -> Self {
            self.events
                .push(SimulatedEventSource::key_event(code, KeyModifiers::empty()));
            self
        }

        pub fn press_tab(self) -> Self {
            self.press(KeyCode::Tab)
        }

        pub fn press_enter(self) -> Self {
            self.press(KeyCode::Enter)
        }

        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }

    pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    /// Screen contents as plain lines
    pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut lines = Vec::new();
        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                line.push_str(buffer[(x, y)].symbol());
            }
            lines.push(line.trim_end().to_string());
        }
        lines.join("\n")
    }
}
