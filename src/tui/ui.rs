//! Drawing the three panes

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use unicode_width::UnicodeWidthStr;

use super::app::{App, Focus};
use super::markdown::message_lines;
use crate::chat::Role;
use crate::mindmap::outline_or_raw;
use crate::notification::NotificationLevel;
use crate::panel::PanelView;
use crate::viewer::Size;

/// Rough pixel size of a terminal cell, for fitting pages
const CELL_WIDTH_PX: f32 = 8.0;
const CELL_HEIGHT_PX: f32 = 16.0;

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::new().fg(Color::Yellow)
    } else {
        Style::new().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(title)
}

fn percent(value: f32) -> u16 {
    value.round().clamp(0.0, 100.0) as u16
}

pub fn draw(frame: &mut Frame, app: &App) {
    let [main, status] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());

    let layout = app.client_state().layout();
    let left = if layout.left_panel_collapsed { 0.0 } else { layout.left_panel_width };
    let right = if layout.right_panel_collapsed { 0.0 } else { layout.right_panel_width };
    let [panel_area, viewer_area, chat_area] = Layout::horizontal([
        Constraint::Percentage(percent(left)),
        Constraint::Percentage(percent(layout.center_width())),
        Constraint::Percentage(percent(right)),
    ])
    .areas(main);

    if panel_area.width > 0 {
        draw_panel(frame, app, panel_area);
    }
    draw_viewer(frame, app, viewer_area);
    if chat_area.width > 0 {
        draw_chat(frame, app, chat_area);
    }
    draw_status(frame, app, status);
    draw_notifications(frame, app, frame.area());
}

fn draw_viewer(frame: &mut Frame, app: &App, area: Rect) {
    let snapshot = app.viewer_snapshot();
    let mut title = String::from(" Page ");
    if snapshot.page_count > 0 {
        title.push_str(&format!(
            "{} · {:.0}% ",
            snapshot.page_info(),
            snapshot.zoom * 100.0
        ));
    }
    if snapshot.rendering {
        title.push_str("· rendering ");
    }
    let block = pane_block(title, app.focus == Focus::Viewer);
    let inner = block.inner(area);
    app.gauge().set(Size::new(
        f32::from(inner.width) * CELL_WIDTH_PX,
        f32::from(inner.height) * CELL_HEIGHT_PX,
    ));

    let mut lines: Vec<Line> = Vec::new();
    if let Some(error) = &snapshot.last_error {
        lines.push(Line::from(Span::styled(error.clone(), Style::new().fg(Color::Red))));
    }
    match &snapshot.surface {
        Some(surface) if !surface.text_layer.is_empty() => {
            lines.extend(surface.text_layer.text().lines().map(|l| Line::from(l.to_string())));
        }
        Some(surface) => lines.push(Line::from(format!(
            "Page {} has no text ({}×{} px)",
            surface.page, surface.backing_width, surface.backing_height
        ))),
        None if snapshot.page_count == 0 => {
            lines.push(Line::from("No document open."));
            lines.push(Line::from("Pick a paper in the tool panel and press o."));
        }
        None => lines.push(Line::from("Rendering…")),
    }

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn draw_chat(frame: &mut Frame, app: &App, area: Rect) {
    let [history_area, input_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(area);
    let focused = app.focus == Focus::Chat;

    let block = pane_block(" Chat ".to_string(), focused);
    let inner = block.inner(history_area);
    let width = usize::from(inner.width);
    let workspace = app.workspace();
    let history = workspace.chat().history();

    let mut lines = Vec::new();
    for (index, message) in history.iter().enumerate() {
        let segments = if message.role == Role::Assistant && !message.is_error {
            workspace.with_diagrams(|d| d.view(index as u64, &message.content))
        } else {
            Vec::new()
        };
        let selected = app.selected_message == Some(index);
        lines.extend(message_lines(message, &segments, width, selected));
    }

    let overflow = lines.len().saturating_sub(usize::from(inner.height));
    let offset = overflow.saturating_sub(usize::from(app.chat_scroll));
    let offset = u16::try_from(offset).unwrap_or(u16::MAX);
    frame.render_widget(Paragraph::new(lines).block(block).scroll((offset, 0)), history_area);

    let chat = workspace.chat();
    let title = if chat.is_generating() {
        " Waiting for reply… "
    } else if chat.can_send() {
        " Message (Enter to send) "
    } else {
        " Open a paper to start chatting "
    };
    let mut input = vec![Span::raw(app.input.clone())];
    if focused {
        input.push(Span::styled("▏", Style::new().add_modifier(Modifier::SLOW_BLINK)));
    }
    frame.render_widget(
        Paragraph::new(Line::from(input)).block(pane_block(title.to_string(), focused)),
        input_area,
    );
}

fn flag(enabled: bool) -> Span<'static> {
    if enabled {
        Span::styled("on", Style::new().fg(Color::Green))
    } else {
        Span::styled("off", Style::new().fg(Color::DarkGray))
    }
}

fn draw_panel(frame: &mut Frame, app: &App, area: Rect) {
    let panel = &app.panel;
    let focused = app.focus == Focus::Panel;
    let mut lines = Vec::new();

    let block = match panel.view {
        PanelView::Controls => {
            let title = app.workspace().title().unwrap_or_else(|| "no paper".to_string());
            lines.push(Line::from(Span::styled(
                title,
                Style::new().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(vec![Span::raw("Document  "), flag(panel.pdf_loaded)]));
            lines.push(Line::from(vec![Span::raw("Mind map  "), flag(panel.mindmap_enabled)]));
            lines.push(Line::from(vec![Span::raw("Notes     "), flag(panel.notes_enabled)]));
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "Papers",
                Style::new().add_modifier(Modifier::UNDERLINED),
            )));
            if app.papers.is_empty() {
                lines.push(Line::from(Span::styled(
                    "(none, g to refresh)",
                    Style::new().fg(Color::DarkGray),
                )));
            }
            for (index, paper) in app.papers.iter().enumerate() {
                let marker = if index == app.paper_cursor { "› " } else { "  " };
                let style = if index == app.paper_cursor && focused {
                    Style::new().fg(Color::Yellow)
                } else {
                    Style::new()
                };
                let text_mark = if paper.has_markdown { "" } else { " *" };
                lines.push(Line::from(Span::styled(
                    format!("{marker}{}{text_mark}", paper.title),
                    style,
                )));
            }
            pane_block(" Tools ".to_string(), focused)
        }
        PanelView::Mindmap => {
            if panel.mindmap_generating {
                lines.push(Line::from("Generating mind map…"));
            } else if let Some(error) = &panel.mindmap_error {
                lines.push(Line::from(Span::styled(error.clone(), Style::new().fg(Color::Red))));
                lines.push(Line::from("Press r to retry."));
            } else if let Some(markdown) = &panel.mindmap {
                lines.extend(outline_or_raw(markdown).lines().map(|l| Line::from(l.to_string())));
            }
            pane_block(" Mind map (Esc back, r retry) ".to_string(), focused)
        }
    };

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let help = match app.focus {
        Focus::Chat => "Tab focus · Enter send · ↑↓ select · d delete · y copy · Ctrl+C quit",
        Focus::Viewer => "Tab focus · n/p page · +/- zoom · 0 reset · [ ] { } resize · h/l hide · q quit",
        Focus::Panel => "Tab focus · j/k move · o open · g refresh · m mind map · c close · q quit",
    };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(help, Style::new().fg(Color::DarkGray)))),
        area,
    );
}

fn draw_notifications(frame: &mut Frame, app: &App, area: Rect) {
    if app.notifications.is_empty() {
        return;
    }
    let texts: Vec<(String, NotificationLevel)> = app
        .notifications
        .all()
        .map(|toast| (toast.text(), toast.level))
        .collect();
    let widest = texts.iter().map(|(text, _)| text.width()).max().unwrap_or(0);
    let width = u16::try_from(widest + 2).unwrap_or(u16::MAX).clamp(16, 48).min(area.width);
    let height = u16::try_from(texts.len()).unwrap_or(u16::MAX).saturating_add(2);
    let toast_area = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + 1,
        width,
        height: height.min(area.height),
    };
    let lines: Vec<Line> = texts
        .into_iter()
        .map(|(text, level)| {
            let color = match level {
                NotificationLevel::Info => Color::White,
                NotificationLevel::Success => Color::Green,
                NotificationLevel::Warning => Color::Yellow,
                NotificationLevel::Error => Color::Red,
            };
            Line::from(Span::styled(text, Style::new().fg(color)))
        })
        .collect();
    frame.render_widget(Clear, toast_area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL)),
        toast_area,
    );
}
