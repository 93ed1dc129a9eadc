//! Locating closed diagram fences in markdown text

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// Info string that marks a fenced block as a diagram
pub const DIAGRAM_LANG: &str = "mermaid";

/// A closed fenced block tagged as a diagram
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FencedDiagram {
    /// Position among the diagram blocks of the same text
    pub ordinal: usize,
    /// Byte range of the whole block, fences included
    pub range: Range<usize>,
    /// Text between the fences, container indentation removed, trimmed
    pub source: String,
}

fn is_diagram_info(info: &str) -> bool {
    info.split_whitespace()
        .next()
        .is_some_and(|lang| lang.eq_ignore_ascii_case(DIAGRAM_LANG))
}

/// Strip list indentation and blockquote markers in front of a fence line
fn fence_line(line: &str) -> &str {
    line.trim_start_matches([' ', '\t', '>'])
}

/// The parser also ends a fence at the end of its container or of the text.
/// Only a block whose last line repeats the opening fence is finished.
/// Returns the block range extended over that line's line break.
fn closed_range(markdown: &str, range: Range<usize>) -> Option<Range<usize>> {
    let block = markdown[range.clone()].trim_end();
    let (opening, rest) = block.split_once('\n')?;
    let opening = fence_line(opening);
    let marker = opening.chars().next()?;
    let width = opening.chars().take_while(|&c| c == marker).count();

    let closing = fence_line(rest.rsplit('\n').next()?).trim_end();
    let closing_width = closing.chars().take_while(|&c| c == marker).count();
    if closing_width < width || closing_width != closing.chars().count() {
        return None;
    }

    let mut end = range.start + block.len();
    let tail = &markdown[end..];
    if tail.starts_with("\r\n") {
        end += 2;
    } else if tail.starts_with('\n') {
        end += 1;
    }
    Some(range.start..end)
}

/// Find every closed diagram fence, in document order.
///
/// A fence still waiting for its closing line (a reply that is still
/// streaming) is not reported.
pub fn scan_diagram_blocks(markdown: &str) -> Vec<FencedDiagram> {
    let mut blocks = Vec::new();
    let mut open: Option<(Range<usize>, String)> = None;

    for (event, range) in Parser::new_ext(markdown, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) if is_diagram_info(&info) => {
                open = Some((range, String::new()));
            }
            Event::Text(text) => {
                if let Some((_, body)) = open.as_mut() {
                    body.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                let Some((range, body)) = open.take() else {
                    continue;
                };
                if let Some(range) = closed_range(markdown, range) {
                    blocks.push(FencedDiagram {
                        ordinal: blocks.len(),
                        range,
                        source: body.trim().to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_closed_diagram_blocks_in_order() {
        let text = "intro\n```mermaid\ngraph TD\nA-->B\n```\nmiddle\n```mermaid\ngraph LR\nC-->D\n```\n";
        let blocks = scan_diagram_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].ordinal, 0);
        assert_eq!(blocks[0].source, "graph TD\nA-->B");
        assert_eq!(blocks[1].source, "graph LR\nC-->D");
        assert_eq!(&text[blocks[0].range.clone()], "```mermaid\ngraph TD\nA-->B\n```\n");
    }

    #[test]
    fn unclosed_fence_is_not_a_block() {
        assert!(scan_diagram_blocks("```mermaid\ngraph TD\nA-->").is_empty());
        assert!(scan_diagram_blocks("```mermaid\n").is_empty());
        assert!(scan_diagram_blocks("````mermaid\ngraph TD\n```").is_empty());
    }

    #[test]
    fn other_languages_are_skipped_but_still_fence() {
        let text = "```rust\n```mermaid\n```\n```mermaid\ngraph TD\nA\n```";
        let blocks = scan_diagram_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "graph TD\nA");
    }

    #[test]
    fn closing_fence_must_match_marker_and_length() {
        let text = "````mermaid\ngraph TD\n```\nA\n~~~~\n````\n";
        let blocks = scan_diagram_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "graph TD\n```\nA\n~~~~");
    }

    #[test]
    fn tilde_fences_and_case_insensitive_tag() {
        let text = "~~~ Mermaid\ngraph TD\nA-->B\n~~~\n";
        assert_eq!(scan_diagram_blocks(text).len(), 1);
    }

    #[test]
    fn deeply_indented_fence_is_code_not_a_fence() {
        let text = "    ```mermaid\n    graph TD\n    ```\n";
        assert!(scan_diagram_blocks(text).is_empty());
    }

    #[test]
    fn fence_inside_a_nested_list_item() {
        let text = "- step\n  - detail\n\n    ```mermaid\n    graph TD\n    A-->B\n    ```\n";
        let blocks = scan_diagram_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "graph TD\nA-->B");
        assert!(text[blocks[0].range.clone()].ends_with("```\n"));
    }

    #[test]
    fn fence_inside_a_blockquote() {
        let text = "> ```mermaid\n> graph TD\n> A-->B\n> ```\n";
        let blocks = scan_diagram_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "graph TD\nA-->B");
    }
}
