//! HTTP client for the reading-assistant backend

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::{Client, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::backend::ReadingBackend;
use super::error::ApiError;
use super::types::{
    Acknowledged, ChatRequest, LocalPaper, LocalPapersResponse, MindmapOutline, PaperSession,
    SessionDetail, SessionResponse, SessionSummary, SessionsResponse, SummaryResponse,
    UploadRequest,
};
use crate::chat::{ChatTransport, ChunkStream};
use crate::settings;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_SNIPPET: usize = 200;

/// reqwest-backed implementation of the backend API
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: Client,
    base: Url,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(base_url)
            .map_err(|e| ApiError::generic(format!("invalid backend url {base_url:?}: {e}")))?;
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base,
            request_timeout,
        })
    }

    /// Client configured from the global settings
    pub fn from_settings() -> Result<Self, ApiError> {
        Self::new(&settings::get_backend_url(), settings::get_request_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::generic(format!("backend url {} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        read_envelope(resp).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!("POST {url}");
        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        read_envelope(resp).await
    }
}

async fn read_envelope<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let status = resp.status().as_u16();
    let body = resp.text().await?;
    parse_envelope(status, &body)
}

#[derive(serde::Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Turn a status + body pair into a typed payload or an [`ApiError`].
pub(crate) fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    let ok_status = (200..300).contains(&status);
    match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope {
            success: Some(false),
            error,
        }) => Err(ApiError::Backend {
            status,
            message: error.unwrap_or_else(|| "request failed".to_string()),
        }),
        Ok(Envelope { error, .. }) if !ok_status => Err(ApiError::Backend {
            status,
            message: error.unwrap_or_else(|| format!("HTTP {status}")),
        }),
        Err(_) if !ok_status => Err(ApiError::Status {
            status,
            body: body.chars().take(ERROR_BODY_SNIPPET).collect(),
        }),
        _ => Ok(serde_json::from_str(body)?),
    }
}

#[async_trait]
impl ChatTransport for BackendClient {
    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ApiError> {
        let url = self.endpoint(["api", "chat", "stream"])?;
        debug!("POST {url} (stream)");
        let resp = self.http.post(url).json(request).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!("Chat stream refused with status {status}");
            return match parse_envelope::<Acknowledged>(status, &body) {
                Err(e) => Err(e),
                Ok(_) => Err(ApiError::Status { status, body }),
            };
        }

        Ok(Box::pin(
            resp.bytes_stream().map(|chunk| chunk.map_err(ApiError::from)),
        ))
    }
}

#[async_trait]
impl ReadingBackend for BackendClient {
    async fn local_papers(&self) -> Result<Vec<LocalPaper>, ApiError> {
        let url = self.endpoint(["api", "local-papers"])?;
        let resp: LocalPapersResponse = self.get_json(url).await?;
        Ok(resp.papers)
    }

    async fn use_local_paper(
        &self,
        user_id: &str,
        filename: &str,
    ) -> Result<PaperSession, ApiError> {
        let url = self.endpoint(["api", "use-local-paper"])?;
        self.post_json(url, &json!({ "user_id": user_id, "filename": filename }))
            .await
    }

    async fn upload(
        &self,
        user_id: &str,
        pdf_url: &str,
        title: &str,
    ) -> Result<PaperSession, ApiError> {
        let url = self.endpoint(["api", "upload"])?;
        let body = UploadRequest {
            user_id: user_id.to_string(),
            pdf_url: pdf_url.to_string(),
            title: title.to_string(),
        };
        let mut session: PaperSession = self.post_json(url, &body).await?;
        session.has_pdf = true;
        Ok(session)
    }

    async fn convert_to_markdown(&self, session_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(["api", "convert-to-markdown"])?;
        let _: Acknowledged = self
            .post_json(url, &json!({ "session_id": session_id }))
            .await?;
        Ok(())
    }

    async fn proactive_summary(&self, session_id: &str) -> Result<String, ApiError> {
        let url = self.endpoint(["api", "proactive-summary"])?;
        let resp: SummaryResponse = self
            .post_json(url, &json!({ "session_id": session_id }))
            .await?;
        Ok(resp.summary)
    }

    async fn generate_mindmap(&self, session_id: &str) -> Result<MindmapOutline, ApiError> {
        let url = self.endpoint(["api", "generate-mindmap"])?;
        self.post_json(url, &json!({ "session_id": session_id }))
            .await
    }

    async fn session(&self, session_id: &str) -> Result<SessionDetail, ApiError> {
        let url = self.endpoint(["api", "session", session_id])?;
        let resp: SessionResponse = self.get_json(url).await?;
        Ok(resp.session)
    }

    async fn sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ApiError> {
        let mut url = self.endpoint(["api", "sessions"])?;
        url.query_pairs_mut().append_pair("user_id", user_id);
        let resp: SessionsResponse = self.get_json(url).await?;
        Ok(resp.sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(["api", "session", session_id])?;
        debug!("DELETE {url}");
        let resp = self
            .http
            .delete(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let _: Acknowledged = read_envelope(resp).await?;
        Ok(())
    }

    async fn download(&self, url_path: &str) -> Result<Bytes, ApiError> {
        let url = self.endpoint(url_path.split('/').filter(|s| !s.is_empty()))?;
        debug!("GET {url} (file)");
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?)
    }
}
