pub mod api;
pub mod chat;
pub mod client_state;
pub mod diagram;
pub mod event_source;
pub mod mindmap;
pub mod notification;
pub mod panel;
pub mod panic_handler;
pub mod settings;
pub mod stream;
pub mod tui;
pub mod viewer;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chat::{ChatSession, Message, SendOutcome};
pub use panel::{AppContext, PanelNotifier};
pub use workspace::Workspace;
