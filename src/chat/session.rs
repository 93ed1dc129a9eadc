//! Chat history and the single in-flight streaming turn
//!
//! `ChatSession` owns the message list. Every mutation goes through its
//! methods; observers learn about changes through [`ChatNotice`]s. Locks are
//! never held across an await, so the send future stays `Send` and the
//! history can be read while a turn is streaming.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::message::Message;
use super::transport::ChatTransport;
use crate::api::ChatRequest;
use crate::stream::{StreamEvent, decode_stream};

/// Change notifications for whoever renders the chat
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatNotice {
    /// History content changed, redraw
    Refresh,
    /// Sending became possible (`true`) or impossible (`false`)
    InputEnabled(bool),
}

/// Why a send request was dropped without touching the history
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Busy,
    InputDisabled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Ignored(IgnoreReason),
    /// The turn ended normally
    Completed,
    /// The turn ended with an error shown in the assistant message
    Failed(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("no active reading session, open or upload a paper first")]
    NoSession,
}

#[derive(Debug)]
struct Inner {
    history: Vec<Message>,
    session_id: Option<String>,
    user_id: String,
    input_enabled: bool,
    generating: bool,
    /// Bumped whenever the history is replaced wholesale
    epoch: u64,
}

/// Ordered chat history plus the send lock
#[derive(Debug)]
pub struct ChatSession {
    inner: Mutex<Inner>,
    observers: Mutex<Vec<UnboundedSender<ChatNotice>>>,
}

/// Location of the assistant placeholder of the running turn
#[derive(Clone, Copy, Debug)]
struct Slot {
    index: usize,
    epoch: u64,
}

/// Releases the send lock however the turn ends
struct TurnGuard<'a> {
    session: &'a ChatSession,
    slot: Slot,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let enabled = {
            let mut inner = self.session.lock();
            inner.generating = false;
            if let Some(msg) = placeholder_mut(&mut inner, self.slot) {
                msg.is_streaming = false;
            }
            inner.input_enabled
        };
        debug!("Chat turn finished, input enabled: {enabled}");
        self.session.notify(ChatNotice::Refresh);
        self.session.notify(ChatNotice::InputEnabled(enabled));
    }
}

fn placeholder_mut(inner: &mut Inner, slot: Slot) -> Option<&mut Message> {
    if inner.epoch != slot.epoch {
        return None;
    }
    inner.history.get_mut(slot.index)
}

impl ChatSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                history: Vec::new(),
                session_id: None,
                user_id: user_id.into(),
                input_enabled: false,
                generating: false,
                epoch: 0,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: ChatNotice) {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|tx| tx.send(notice.clone()).is_ok());
    }

    /// Receive change notifications from now on
    pub fn subscribe(&self) -> UnboundedReceiver<ChatNotice> {
        let (tx, rx) = unbounded_channel();
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Run one user turn against the chat endpoint.
    ///
    /// Empty input, a turn already in flight or disabled input are ignored.
    /// A missing session id is an error and nothing is sent.
    pub async fn send_message<T>(&self, text: &str, transport: &T) -> Result<SendOutcome, ChatError>
    where
        T: ChatTransport + ?Sized,
    {
        let text = text.trim();
        let (request, slot) = {
            let mut inner = self.lock();
            if text.is_empty() {
                return Ok(SendOutcome::Ignored(IgnoreReason::Empty));
            }
            if inner.generating {
                debug!("Send ignored, a turn is already streaming");
                return Ok(SendOutcome::Ignored(IgnoreReason::Busy));
            }
            if !inner.input_enabled {
                return Ok(SendOutcome::Ignored(IgnoreReason::InputDisabled));
            }
            let Some(session_id) = inner.session_id.clone().filter(|s| !s.is_empty()) else {
                return Err(ChatError::NoSession);
            };

            inner.history.push(Message::user(text));
            inner.history.push(Message::placeholder());
            inner.generating = true;

            let slot = Slot {
                index: inner.history.len() - 1,
                epoch: inner.epoch,
            };
            let request = ChatRequest {
                user_id: inner.user_id.clone(),
                session_id,
                message: text.to_string(),
            };
            (request, slot)
        };
        self.notify(ChatNotice::Refresh);
        self.notify(ChatNotice::InputEnabled(false));

        let guard = TurnGuard {
            session: self,
            slot,
        };

        let outcome = match transport.open_chat_stream(&request).await {
            Ok(chunks) => self.consume(decode_stream(chunks), guard.slot).await,
            Err(e) => {
                warn!("Failed to open chat stream: {e}");
                let message = format!("Sorry, sending failed: {e}");
                self.fail_turn(guard.slot, &message);
                SendOutcome::Failed(message)
            }
        };
        drop(guard);
        Ok(outcome)
    }

    async fn consume(&self, events: impl Stream<Item = StreamEvent>, slot: Slot) -> SendOutcome {
        let mut events = std::pin::pin!(events);
        let mut outcome = SendOutcome::Completed;

        while let Some(event) = events.next().await {
            match event {
                StreamEvent::ContentDelta(delta) => {
                    if let Some(msg) = placeholder_mut(&mut self.lock(), slot) {
                        msg.content.push_str(&delta);
                    }
                }
                StreamEvent::Done(state) => {
                    debug!("Chat turn done, final state: {state}");
                    if let Some(msg) = placeholder_mut(&mut self.lock(), slot) {
                        msg.is_streaming = false;
                    }
                    outcome = SendOutcome::Completed;
                }
                StreamEvent::Error(message) => {
                    warn!("Chat turn failed: {message}");
                    self.fail_turn(slot, &message);
                    outcome = SendOutcome::Failed(message);
                }
            }
            self.notify(ChatNotice::Refresh);
        }
        outcome
    }

    fn fail_turn(&self, slot: Slot, message: &str) {
        if let Some(msg) = placeholder_mut(&mut self.lock(), slot) {
            msg.content = message.to_string();
            msg.is_error = true;
            msg.is_streaming = false;
        }
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        self.lock().session_id = session_id;
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    pub fn user_id(&self) -> String {
        self.lock().user_id.clone()
    }

    /// Document mode: input is available only while a document is loaded
    pub fn set_document_loaded(&self, loaded: bool) {
        self.set_input_enabled(loaded);
    }

    pub fn set_input_enabled(&self, enabled: bool) {
        let can_send = {
            let mut inner = self.lock();
            inner.input_enabled = enabled;
            enabled && !inner.generating
        };
        self.notify(ChatNotice::InputEnabled(can_send));
    }

    pub fn is_input_enabled(&self) -> bool {
        self.lock().input_enabled
    }

    /// True when a send would not be ignored for state reasons
    pub fn can_send(&self) -> bool {
        let inner = self.lock();
        inner.input_enabled && !inner.generating
    }

    pub fn is_generating(&self) -> bool {
        self.lock().generating
    }

    /// Replace the history with a stored conversation
    pub fn load_history(&self, messages: Vec<Message>) {
        {
            let mut inner = self.lock();
            inner.history = messages
                .into_iter()
                .map(|mut m| {
                    m.is_streaming = false;
                    m
                })
                .collect();
            inner.epoch += 1;
            info!("Loaded {} messages of chat history", inner.history.len());
        }
        self.notify(ChatNotice::Refresh);
    }

    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.history.clear();
            inner.epoch += 1;
        }
        self.notify(ChatNotice::Refresh);
    }

    pub fn push(&self, message: Message) {
        self.lock().history.push(message);
        self.notify(ChatNotice::Refresh);
    }

    pub fn push_system(&self, content: impl Into<String>) {
        self.push(Message::system(content));
    }

    pub fn push_assistant(&self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// Remove one message. Refused while a turn is streaming.
    pub fn delete_message(&self, index: usize) -> bool {
        self.delete_messages(&[index]) == 1
    }

    /// Remove several messages, highest index first. Returns how many went.
    pub fn delete_messages(&self, indices: &[usize]) -> usize {
        let removed = {
            let mut inner = self.lock();
            if inner.generating {
                warn!("Refusing to delete messages while a reply is streaming");
                return 0;
            }
            let unique: BTreeSet<usize> = indices.iter().copied().collect();
            let mut removed = 0;
            for index in unique.into_iter().rev() {
                if index < inner.history.len() {
                    inner.history.remove(index);
                    removed += 1;
                }
            }
            removed
        };
        if removed > 0 {
            self.notify(ChatNotice::Refresh);
        }
        removed
    }

    /// Text of a message, for copying
    pub fn message_text(&self, index: usize) -> Option<String> {
        self.lock().history.get(index).map(|m| m.content.clone())
    }

    pub fn history(&self) -> Vec<Message> {
        self.lock().history.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().history.is_empty()
    }

    pub fn last(&self) -> Option<Message> {
        self.lock().history.last().cloned()
    }
}
