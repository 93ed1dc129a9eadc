//! Turning chat messages into styled terminal lines

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::chat::{Message, Role};
use crate::diagram::{BlockState, Segment};

const CODE_STYLE: Style = Style::new().fg(Color::Gray);
const DIAGRAM_STYLE: Style = Style::new().fg(Color::Cyan);
const ERROR_STYLE: Style = Style::new().fg(Color::Red);
const HEADING_STYLE: Style = Style::new().add_modifier(Modifier::BOLD.union(Modifier::UNDERLINED));

fn role_style(role: Role) -> Style {
    match role {
        Role::User => Style::new().fg(Color::Green).add_modifier(Modifier::BOLD),
        Role::Assistant => Style::new().fg(Color::Blue).add_modifier(Modifier::BOLD),
        Role::System => Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    }
}

fn wrap_into(lines: &mut Vec<Line<'static>>, text: &str, width: usize, indent: &str, style: Style) {
    wrap_with(lines, text, width, (indent, indent), style);
}

fn wrap_with(
    lines: &mut Vec<Line<'static>>,
    text: &str,
    width: usize,
    (first, rest): (&str, &str),
    style: Style,
) {
    let options = textwrap::Options::new(width.max(8))
        .initial_indent(first)
        .subsequent_indent(rest);
    for wrapped in textwrap::wrap(text, options) {
        lines.push(Line::from(Span::styled(wrapped.into_owned(), style)));
    }
}

/// Markdown blocks flattened to wrapped terminal lines
struct Prose<'a> {
    lines: &'a mut Vec<Line<'static>>,
    width: usize,
    inline: String,
    style: Style,
    /// Next number of each open list, `None` for bullets
    lists: Vec<Option<u64>>,
    item_marker: Option<String>,
    in_code: bool,
}

impl Prose<'_> {
    fn flush(&mut self) {
        let text = std::mem::take(&mut self.inline);
        let text = text.trim();
        let marker = self.item_marker.take();
        if text.is_empty() {
            return;
        }
        let depth = self.lists.len().saturating_sub(1);
        let indent = "  ".repeat(depth);
        match marker {
            Some(marker) => {
                let first = format!("{indent}{marker} ");
                let rest = " ".repeat(first.chars().count());
                wrap_with(self.lines, text, self.width, (&first, &rest), self.style);
            }
            None if self.lists.is_empty() => {
                wrap_into(self.lines, text, self.width, "", self.style);
            }
            None => {
                let rest = format!("{indent}  ");
                wrap_into(self.lines, text, self.width, &rest, self.style);
            }
        }
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| l.width() > 0) {
            self.lines.push(Line::default());
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                self.flush();
                self.style = HEADING_STYLE;
            }
            Event::End(TagEnd::Heading(_)) => {
                self.flush();
                self.style = Style::new();
            }
            Event::Start(Tag::List(first)) => {
                self.flush();
                self.lists.push(first);
            }
            Event::End(TagEnd::List(_)) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            Event::Start(Tag::Item) => {
                self.flush();
                self.item_marker = Some(match self.lists.last_mut() {
                    Some(Some(n)) => {
                        *n += 1;
                        format!("{}.", *n - 1)
                    }
                    _ => "•".to_string(),
                });
            }
            Event::End(TagEnd::Item) => self.flush(),
            Event::End(TagEnd::Paragraph) => {
                self.flush();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            Event::Start(Tag::CodeBlock(_)) => {
                self.flush();
                self.in_code = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code = false;
                self.blank();
            }
            Event::Text(text) if self.in_code => {
                for line in text.lines() {
                    self.lines
                        .push(Line::from(Span::styled(format!("  {line}"), CODE_STYLE)));
                }
            }
            Event::Text(text) | Event::Code(text) => self.inline.push_str(&text),
            Event::SoftBreak | Event::HardBreak => self.inline.push(' '),
            _ => {}
        }
    }
}

/// Light markdown: headings, lists, paragraphs and code blocks
fn prose_lines(lines: &mut Vec<Line<'static>>, text: &str, width: usize) {
    let start = lines.len();
    let mut prose = Prose {
        lines: &mut *lines,
        width,
        inline: String::new(),
        style: Style::new(),
        lists: Vec::new(),
        item_marker: None,
        in_code: false,
    };
    for event in Parser::new_ext(text, Options::empty()) {
        prose.event(event);
    }
    prose.flush();
    while lines.len() > start && lines.last().is_some_and(|l| l.width() == 0) {
        lines.pop();
    }
}

fn diagram_lines(lines: &mut Vec<Line<'static>>, source: &str, state: Option<&BlockState>) {
    match state {
        None => lines.push(Line::from(Span::styled(
            "⧗ diagram pending…",
            Style::new().fg(Color::DarkGray),
        ))),
        Some(BlockState::Rendered(diagram)) => {
            let kb = diagram.markup.len().div_ceil(1024);
            lines.push(Line::from(Span::styled(
                format!("◆ {}.svg ({kb} KB)", diagram.id),
                DIAGRAM_STYLE.add_modifier(Modifier::BOLD),
            )));
            for line in source.lines() {
                lines.push(Line::from(Span::styled(format!("  │ {line}"), DIAGRAM_STYLE)));
            }
        }
        Some(BlockState::Failed { panel, .. }) => {
            for line in panel.lines() {
                lines.push(Line::from(Span::styled(line, ERROR_STYLE)));
            }
            if panel.source != source {
                lines.push(Line::from(Span::styled("  (source changed)", ERROR_STYLE)));
            }
        }
    }
}

/// Lines for one chat message. `segments` comes from the diagram renderer.
pub fn message_lines(
    message: &Message,
    segments: &[Segment],
    width: usize,
    selected: bool,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut header = vec![Span::styled(message.role.label(), role_style(message.role))];
    if message.is_streaming {
        header.push(Span::styled(" …", Style::new().fg(Color::DarkGray)));
    }
    if selected {
        header.push(Span::styled(" ◀", Style::new().fg(Color::Magenta)));
    }
    lines.push(Line::from(header));

    if message.is_error {
        wrap_into(&mut lines, &message.content, width, "", ERROR_STYLE);
    } else if segments.is_empty() {
        prose_lines(&mut lines, &message.content, width);
    } else {
        for segment in segments {
            match segment {
                Segment::Text(text) => prose_lines(&mut lines, text, width),
                Segment::Diagram { source, state, .. } => {
                    diagram_lines(&mut lines, source, state.as_ref());
                }
            }
        }
    }
    lines.push(Line::default());
    lines
}
