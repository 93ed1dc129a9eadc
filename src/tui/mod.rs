//! Terminal front end: page text, chat and tool panel side by side

mod app;
mod markdown;
mod ui;

pub use app::{App, Focus, TaskResult, run};
pub use markdown::message_lines;
pub use ui::draw;
