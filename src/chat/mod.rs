//! Chat history and the streaming conversation turn

mod message;
mod session;
mod transport;

pub use message::{Message, Role};
pub use session::{ChatError, ChatNotice, ChatSession, IgnoreReason, SendOutcome};
pub use transport::{ChatTransport, ChunkStream};
