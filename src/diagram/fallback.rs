//! Markup shown in place of a diagram that failed to render

/// Error text plus the untouched source, so nothing the assistant wrote is lost
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackPanel {
    pub message: String,
    pub source: String,
}

impl FallbackPanel {
    pub fn new(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }

    /// HTML fragment with the message and a collapsible copy of the source
    #[must_use]
    pub fn to_markup(&self) -> String {
        format!(
            "<div class=\"diagram-error\"><p>Diagram failed to render: {}</p>\
             <details><summary>Show source</summary><pre><code>{}</code></pre></details></div>",
            escape_html(&self.message),
            escape_html(&self.source)
        )
    }

    /// Recover the source from markup produced by [`FallbackPanel::to_markup`]
    pub fn source_from_markup(markup: &str) -> Option<String> {
        let start = markup.find("<pre><code>")? + "<pre><code>".len();
        let end = start + markup[start..].find("</code></pre>")?;
        Some(unescape_html(&markup[start..end]))
    }

    /// Plain lines for a terminal cell grid
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("⚠ Diagram failed to render: {}", self.message)];
        lines.extend(self.source.lines().map(|l| format!("  │ {l}")));
        lines
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_html`]. `&amp;` goes last so `&amp;lt;` stays `&lt;`.
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let entity = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
        ]
        .into_iter()
        .find(|(name, _)| rest.starts_with(name));
        match entity {
            Some((name, c)) => {
                out.push(c);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_escapes_message_and_source() {
        let panel = FallbackPanel::new("bad <node>", "graph TD\nA-->B & C");
        let markup = panel.to_markup();
        assert!(markup.contains("bad &lt;node&gt;"));
        assert!(markup.contains("A--&gt;B &amp; C"));
        assert!(markup.contains("<details>"));
        assert!(!markup.contains("A-->B"));
    }

    #[test]
    fn source_round_trips_byte_for_byte() {
        let source = "graph TD\n  A[\"x\"] --> B{'<y>'}\n  %% &amp; literal\n\ttab";
        let panel = FallbackPanel::new("oops", source);
        assert_eq!(
            FallbackPanel::source_from_markup(&panel.to_markup()).as_deref(),
            Some(source)
        );
    }

    #[test]
    fn stray_ampersands_survive_unescape() {
        assert_eq!(unescape_html("a & b &unknown; &lt;"), "a & b &unknown; <");
    }

    #[test]
    fn terminal_lines_show_source() {
        let panel = FallbackPanel::new("parse error", "graph TD\nA");
        assert_eq!(panel.lines().len(), 3);
        assert_eq!(panel.lines()[2], "  │ A");
    }
}
