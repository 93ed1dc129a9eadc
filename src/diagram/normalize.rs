//! Repairs for diagram sources written by a language model
//!
//! The assistant tends to decorate node labels with quotes, full-width
//! punctuation and parenthesized annotations, all of which the flowchart
//! grammar rejects inside `[...]` labels.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\"'`´“”‘’]").expect("valid quote pattern"));

static SQUARE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid label pattern"));

static PAREN_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]*)\)").expect("valid paren pattern"));

static EMPTY_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\)").expect("valid empty paren pattern"));

static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid space pattern"));

/// `id(label)` where the label holds no nested brackets
static ROUND_NODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\w(\[])([\p{L}\p{N}_]+)\(([^()\[\]{}]*)\)").expect("valid round node pattern")
});

/// Lines that carry styling rather than graph structure
const DIRECTIVES: [&str; 5] = ["style", "classDef", "class", "linkStyle", "click"];

/// Circled numeral for a parenthesized list marker, `(3)` or `(三)`
fn circled_numeral(text: &str) -> Option<char> {
    let index = match text.trim() {
        "1" | "一" => 0,
        "2" | "二" => 1,
        "3" | "三" => 2,
        "4" | "四" => 3,
        "5" | "五" => 4,
        "6" | "六" => 5,
        "7" | "七" => 6,
        "8" | "八" => 7,
        "9" | "九" => 8,
        "10" | "十" => 9,
        _ => return None,
    };
    char::from_u32('①' as u32 + index)
}

fn clean_label(label: &str) -> String {
    let mut text = label.to_string();
    // Innermost groups first so nested annotations unwrap fully.
    while PAREN_GROUP.is_match(&text) {
        text = PAREN_GROUP
            .replace_all(&text, |caps: &Captures| {
                let inner = &caps[1];
                match circled_numeral(inner) {
                    Some(numeral) => numeral.to_string(),
                    None if inner.trim().is_empty() => String::new(),
                    None => format!(" {} ", inner.trim()),
                }
            })
            .into_owned();
    }
    SPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

fn is_directive(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("%%")
        || DIRECTIVES.iter().any(|d| {
            trimmed
                .strip_prefix(d)
                .is_some_and(|rest| rest.starts_with(char::is_whitespace))
        })
}

fn collapse_empty_parens(line: &str) -> String {
    let mut text = line.to_string();
    while EMPTY_PARENS.is_match(&text) {
        text = EMPTY_PARENS.replace_all(&text, "").into_owned();
    }
    text
}

fn normalize_line(line: &str) -> String {
    if is_directive(line) {
        return line.to_string();
    }
    let line = SQUARE_LABEL.replace_all(line, |caps: &Captures| format!("[{}]", clean_label(&caps[1])));
    let line = collapse_empty_parens(&line);
    ROUND_NODE
        .replace_all(&line, |caps: &Captures| {
            format!("{}{}[{}]", &caps[1], &caps[2], caps[3].trim())
        })
        .into_owned()
}

/// Normalize a raw diagram source before it reaches a backend.
#[must_use]
pub fn normalize_source(raw: &str) -> String {
    let text = QUOTES.replace_all(raw.trim(), "");
    let text = text.replace('（', "(").replace('）', ")");
    text.lines()
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_every_quote_variant() {
        let raw = "graph TD\nA[\"Start\"] --> B['Next'] --> C[“Done”] --> D[‘x’]";
        assert_eq!(
            normalize_source(raw),
            "graph TD\nA[Start] --> B[Next] --> C[Done] --> D[x]"
        );
    }

    #[test]
    fn full_width_parens_become_ascii_and_numerals_are_circled() {
        let raw = "graph TD\nA[步骤（1）读摘要] --> B[步骤(2)精读]";
        assert_eq!(
            normalize_source(raw),
            "graph TD\nA[步骤①读摘要] --> B[步骤②精读]"
        );
    }

    #[test]
    fn chinese_numerals_use_the_same_table() {
        assert_eq!(
            normalize_source("graph TD\nA[第(三)部分]"),
            "graph TD\nA[第③部分]"
        );
        assert_eq!(normalize_source("graph TD\nA[(十)]"), "graph TD\nA[⑩]");
    }

    #[test]
    fn other_annotations_lose_their_parens() {
        assert_eq!(
            normalize_source("graph TD\nA[Transformer (Vaswani et al.) model]"),
            "graph TD\nA[Transformer Vaswani et al. model]"
        );
        assert_eq!(
            normalize_source("graph TD\nA[Method (11)]"),
            "graph TD\nA[Method 11]"
        );
    }

    #[test]
    fn empty_remnants_collapse() {
        assert_eq!(normalize_source("graph TD\nA(\"\") --> B"), "graph TD\nA --> B");
        assert_eq!(normalize_source("graph TD\nA[Intro ()]"), "graph TD\nA[Intro]");
    }

    #[test]
    fn round_nodes_become_square_nodes() {
        assert_eq!(
            normalize_source("graph LR\nA(Start) --> B(End)"),
            "graph LR\nA[Start] --> B[End]"
        );
    }

    #[test]
    fn circle_and_stadium_shapes_are_left_alone() {
        let raw = "graph LR\nA((Hub)) --> B([Pill])";
        assert_eq!(normalize_source(raw), raw);
    }

    #[test]
    fn style_directives_are_untouched() {
        let raw = "graph TD\nA --> B\nstyle A fill:rgb(1,2,3)";
        assert_eq!(normalize_source(raw), raw);
    }

    #[test]
    fn clean_sources_are_unchanged() {
        let raw = "flowchart TD\n  A[Read] --> B{Clear?}\n  B -->|yes| C[Next]";
        assert_eq!(normalize_source(raw), raw);
    }
}
