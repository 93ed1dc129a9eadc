use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::api::{ApiError, ChatRequest};

/// Raw response body of the chat endpoint
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

/// Opens the streaming chat request for one user turn
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ApiError>;
}
