//! Mind map outlines generated for the loaded paper
//!
//! The backend returns the mind map as markdown: headings for the main
//! branches, nested lists for the leaves. The tree is rebuilt here and drawn
//! as an indented outline; when the markdown carries no structure the caller
//! shows it as plain text instead.

use log::warn;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// Depth offset of list items, so any list nests under the latest heading
const LIST_BASE_DEPTH: usize = 6;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MindmapError {
    #[error("mind map text is empty")]
    Empty,
    #[error("mind map text has no headings or list items")]
    NoStructure,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MindmapNode {
    pub label: String,
    pub children: Vec<MindmapNode>,
}

impl MindmapNode {
    fn leaf(label: &str) -> Self {
        Self {
            label: label.to_string(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, itself included
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(MindmapNode::size).sum::<usize>()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MindmapTree {
    pub roots: Vec<MindmapNode>,
}

struct Slot {
    label: String,
    children: Vec<usize>,
}

impl MindmapTree {
    pub fn parse(markdown: &str) -> Result<Self, MindmapError> {
        if markdown.trim().is_empty() {
            return Err(MindmapError::Empty);
        }

        // Slot 0 is a virtual root at depth 0.
        let mut slots = vec![Slot {
            label: String::new(),
            children: Vec::new(),
        }];
        let mut open: Vec<(usize, usize)> = vec![(0, 0)];
        let mut capturing: Option<usize> = None;
        let mut list_depth = 0;

        for event in Parser::new(markdown) {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    capturing = Some(insert(&mut slots, &mut open, level as usize));
                }
                Event::Start(Tag::List(_)) => {
                    list_depth += 1;
                    capturing = None;
                }
                Event::End(TagEnd::List(_)) => list_depth -= 1,
                Event::Start(Tag::Item) => {
                    capturing = Some(insert(&mut slots, &mut open, LIST_BASE_DEPTH + list_depth));
                }
                Event::End(TagEnd::Heading(_) | TagEnd::Item | TagEnd::Paragraph) => {
                    capturing = None;
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(idx) = capturing {
                        slots[idx].label.push_str(&text);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if let Some(idx) = capturing {
                        slots[idx].label.push(' ');
                    }
                }
                _ => {}
            }
        }

        if slots[0].children.is_empty() {
            return Err(MindmapError::NoStructure);
        }
        let roots = slots[0]
            .children
            .iter()
            .map(|&idx| build(&slots, idx))
            .collect();
        Ok(Self { roots })
    }

    pub fn size(&self) -> usize {
        self.roots.iter().map(MindmapNode::size).sum()
    }

    /// Indented tree with box-drawing connectors
    pub fn render_outline(&self) -> String {
        let mut lines = Vec::new();
        for root in &self.roots {
            lines.push(root.label.clone());
            outline_children(&root.children, "", &mut lines);
        }
        lines.join("\n")
    }
}

/// Attach a new slot at `depth` under the closest shallower open slot
fn insert(slots: &mut Vec<Slot>, open: &mut Vec<(usize, usize)>, depth: usize) -> usize {
    while open.last().is_some_and(|&(d, _)| d >= depth) {
        open.pop();
    }
    let parent = open.last().map_or(0, |&(_, idx)| idx);
    slots.push(Slot {
        label: String::new(),
        children: Vec::new(),
    });
    let idx = slots.len() - 1;
    slots[parent].children.push(idx);
    open.push((depth, idx));
    idx
}

fn build(slots: &[Slot], idx: usize) -> MindmapNode {
    let mut node = MindmapNode::leaf(slots[idx].label.trim());
    node.children = slots[idx].children.iter().map(|&c| build(slots, c)).collect();
    node
}

fn outline_children(children: &[MindmapNode], prefix: &str, lines: &mut Vec<String>) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let (branch, indent) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
        lines.push(format!("{prefix}{branch}{}", child.label));
        outline_children(&child.children, &format!("{prefix}{indent}"), lines);
    }
}

/// Outline when the markdown has structure, the markdown itself otherwise
pub fn outline_or_raw(markdown: &str) -> String {
    match MindmapTree::parse(markdown) {
        Ok(tree) => tree.render_outline(),
        Err(e) => {
            warn!("Showing mind map as plain text: {e}");
            markdown.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Attention Is All You Need\n\n## Method\n\n- Self-attention\n  - Scaled dot product\n- Multi-head\n\n## Results\n\n1. BLEU 28.4\n";

    #[test]
    fn headings_and_lists_build_a_tree() {
        let tree = MindmapTree::parse(SAMPLE).unwrap();
        assert_eq!(tree.roots.len(), 1);
        let root = &tree.roots[0];
        assert_eq!(root.label, "Attention Is All You Need");
        assert_eq!(root.children.len(), 2);
        let method = &root.children[0];
        assert_eq!(method.children.len(), 2);
        assert_eq!(method.children[0].children[0].label, "Scaled dot product");
        assert_eq!(root.children[1].children[0].label, "BLEU 28.4");
        assert_eq!(tree.size(), 7);
    }

    #[test]
    fn outline_uses_connectors() {
        let tree = MindmapTree::parse("# Root\n## A\n- a1\n## B").unwrap();
        assert_eq!(tree.render_outline(), "Root\n├── A\n│   └── a1\n└── B");
    }

    #[test]
    fn lists_without_headings_are_roots() {
        let tree = MindmapTree::parse("- one\n- two\n  - nested").unwrap();
        assert_eq!(tree.roots.len(), 2);
        assert_eq!(tree.roots[1].children[0].label, "nested");
    }

    #[test]
    fn inline_markup_is_flattened() {
        let tree = MindmapTree::parse("# The `Transformer` model").unwrap();
        assert_eq!(tree.roots[0].label, "The Transformer model");
    }

    #[test]
    fn prose_has_no_structure() {
        assert_eq!(
            MindmapTree::parse("just a paragraph"),
            Err(MindmapError::NoStructure)
        );
        assert_eq!(MindmapTree::parse("  \n"), Err(MindmapError::Empty));
        assert_eq!(outline_or_raw("just a paragraph"), "just a paragraph");
    }
}
