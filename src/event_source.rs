use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pub use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use futures_util::Stream;

/// Terminal input as an async stream, so the UI loop can `select!` on it
pub type EventSource = Pin<Box<dyn Stream<Item = io::Result<Event>>>>;

/// Real keyboard event source using crossterm
pub fn keyboard() -> EventSource {
    Box::pin(crossterm::event::EventStream::new())
}

/// Simulated event source for testing. Ends with `q` once drained.
#[derive(Debug, Default)]
pub struct SimulatedEventSource {
    events: VecDeque<Event>,
    quit_sent: bool,
}

impl SimulatedEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
            quit_sent: false,
        }
    }

    pub fn key_event(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: crossterm::event::KeyEventKind::Press,
            state: crossterm::event::KeyEventState::empty(),
        })
    }

    pub fn char_key(c: char) -> Event {
        Self::key_event(KeyCode::Char(c), KeyModifiers::empty())
    }

    pub fn ctrl_char_key(c: char) -> Event {
        Self::key_event(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    pub fn boxed(self) -> EventSource {
        Box::pin(self)
    }
}

impl Stream for SimulatedEventSource {
    type Item = io::Result<Event>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(event) = this.events.pop_front() {
            return Poll::Ready(Some(Ok(event)));
        }
        if this.quit_sent {
            return Poll::Ready(None);
        }
        this.quit_sent = true;
        Poll::Ready(Some(Ok(Self::ctrl_char_key('c'))))
    }
}
