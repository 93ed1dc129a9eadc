//! Panic hook for the interactive UI

use std::io::{self, Write};
use std::panic::{self, PanicHookInfo};

use crossterm::cursor::Show;
use crossterm::event::DisableMouseCapture;
use crossterm::execute;
use crossterm::terminal::{LeaveAlternateScreen, disable_raw_mode};

fn payload_text<'a>(info: &'a PanicHookInfo<'a>) -> &'a str {
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Give the terminal back and record the panic in the log file before the
/// better-panic report is printed.
pub fn initialize_panic_handler() {
    better_panic::Settings::auto()
        .most_recent_first(false)
        .lineno_suffix(true)
        .install();

    let report = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        restore_terminal();
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        log::error!("readagent panicked at {location}: {}", payload_text(info));
        report(info);
        std::process::exit(1);
    }));
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let mut stdout = io::stdout();
    let _ = execute!(stdout, LeaveAlternateScreen, DisableMouseCapture, Show);
    let _ = stdout.flush();
}
