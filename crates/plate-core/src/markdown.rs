//! Markdown interchange for documents.
//!
//! Supported blocks: paragraphs, fenced code blocks and dividers. Supported
//! marks: bold, italic, strikethrough, inline code and links. Inline voids go
//! through the [`VoidCodec`](crate::VoidCodec) registered for their kind.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::core::{Document, ElementNode, Marks, Node, TextNode};
use crate::plugin::{PluginRegistry, VoidDecode};

pub fn to_markdown(doc: &Document, registry: &PluginRegistry) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for node in &doc.children {
        write_block(node, registry, &mut blocks);
    }
    blocks.join("\n\n")
}

fn write_block(node: &Node, registry: &PluginRegistry, out: &mut Vec<String>) {
    match node {
        Node::Void(v) if v.kind == "divider" => out.push("---".to_string()),
        Node::Void(v) => match registry.void_codec(&v.kind) {
            Some(codec) => out.push(codec.to_markdown(v)),
            None => tracing::warn!(kind = %v.kind, "no markdown codec for void; dropped"),
        },
        Node::Text(_) => out.push(write_inlines(std::slice::from_ref(node), registry)),
        Node::Element(el) if el.kind == "code_block" => out.push(write_code_block(el)),
        Node::Element(el) if registry.is_text_block(el) => {
            out.push(write_inlines(&el.children, registry));
        }
        Node::Element(el) => {
            for child in &el.children {
                write_block(child, registry, out);
            }
        }
    }
}

fn write_code_block(el: &ElementNode) -> String {
    let mut text = String::new();
    for child in &el.children {
        if let Node::Text(t) = child {
            text.push_str(&t.text);
        }
    }
    let longest = longest_run(&text, '`');
    let fence = "`".repeat(longest.max(2) + 1);
    let language = el
        .attrs
        .get("language")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    format!("{fence}{language}\n{text}\n{fence}")
}

fn write_inlines(children: &[Node], registry: &PluginRegistry) -> String {
    let mut out = String::new();
    let last = children.len().saturating_sub(1);
    for (ix, child) in children.iter().enumerate() {
        match child {
            Node::Text(t) => {
                let at_start = out.is_empty();
                out.push_str(&write_text_leaf(t, at_start, ix == last));
            }
            Node::Void(v) => match registry.void_codec(&v.kind) {
                Some(codec) => out.push_str(&codec.to_markdown(v)),
                None => tracing::warn!(kind = %v.kind, "no markdown codec for void; dropped"),
            },
            Node::Element(_) => {}
        }
    }
    out
}

fn write_text_leaf(leaf: &TextNode, at_start: bool, at_end: bool) -> String {
    if leaf.text.is_empty() {
        return String::new();
    }
    let marks = &leaf.marks;

    if marks.code {
        let longest = longest_run(&leaf.text, '`');
        let ticks = "`".repeat(longest + 1);
        let pad = if leaf.text.starts_with('`') || leaf.text.ends_with('`') {
            " "
        } else {
            ""
        };
        let code = format!("{ticks}{pad}{}{pad}{ticks}", leaf.text);
        return wrap_link(code, marks.link.as_deref());
    }

    // Emphasis delimiters must hug non-whitespace.
    let trimmed_start = leaf.text.trim_start_matches([' ', '\t']);
    let leading = &leaf.text[..leaf.text.len() - trimmed_start.len()];
    let core = trimmed_start.trim_end_matches([' ', '\t']);
    let trailing = &trimmed_start[core.len()..];

    let mut body = escape_text(core, at_start && leading.is_empty());
    if !body.is_empty() {
        if marks.strikethrough {
            body = format!("~~{body}~~");
        }
        if marks.italic {
            body = format!("*{body}*");
        }
        if marks.bold {
            body = format!("**{body}**");
        }
        body = wrap_link(body, marks.link.as_deref());
    }

    format!(
        "{}{body}{}",
        encode_edge_spaces(leading, at_start),
        encode_edge_spaces(trailing, at_end)
    )
}

fn wrap_link(text: String, href: Option<&str>) -> String {
    match href {
        Some(href) => format!("[{text}]({})", link_destination(href)),
        None => text,
    }
}

/// Link target that parses back to `href`: syntax characters are
/// backslash-escaped, and targets with whitespace use the angle form.
pub fn link_destination(href: &str) -> String {
    let mut escaped = String::with_capacity(href.len());
    for ch in href.chars() {
        if matches!(ch, '\\' | '&' | '<' | '>' | '(' | ')') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    if href.is_empty() || href.chars().any(char::is_whitespace) {
        format!("<{escaped}>")
    } else {
        escaped
    }
}

/// Spaces at the edges of a block are stripped by markdown parsers, so they
/// are written as character references there.
fn encode_edge_spaces(spaces: &str, at_edge: bool) -> String {
    if !at_edge {
        return spaces.to_string();
    }
    spaces
        .chars()
        .map(|ch| match ch {
            ' ' => "&#32;".to_string(),
            '\t' => "&#9;".to_string(),
            other => other.to_string(),
        })
        .collect()
}

/// Backslash-escapes markdown syntax in plain text.
pub fn escape_text(text: &str, at_block_start: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut line_start = at_block_start;
    let mut leading_digits = at_block_start;

    for ch in text.chars() {
        match ch {
            '\\' | '`' | '*' | '_' | '[' | ']' | '~' | '<' | '>' | '&' | '!' | '|' => {
                out.push('\\');
                out.push(ch);
            }
            '#' | '-' | '+' | '=' if line_start => {
                out.push('\\');
                out.push(ch);
            }
            '.' | ')' if leading_digits && out.chars().last().is_some_and(|c| c.is_ascii_digit()) => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => {
                out.push_str("\\\n");
                line_start = true;
                leading_digits = true;
                continue;
            }
            _ => out.push(ch),
        }
        leading_digits = leading_digits && ch.is_ascii_digit();
        line_start = false;
    }
    out
}

fn longest_run(text: &str, needle: char) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for ch in text.chars() {
        if ch == needle {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

#[derive(Default, Clone, Copy)]
struct InlineState {
    emphasis_depth: usize,
    strong_depth: usize,
    strikethrough_depth: usize,
}

struct OpenLink {
    destination: String,
    first_run: usize,
}

struct ActiveCodeBlock {
    language: Option<String>,
    text: String,
}

pub fn from_markdown(markdown: &str, registry: &PluginRegistry) -> Document {
    let mut blocks: Vec<Node> = Vec::new();
    let mut active: Option<Vec<Node>> = None;
    let mut active_code: Option<ActiveCodeBlock> = None;
    let mut inline_state = InlineState::default();
    let mut links: Vec<OpenLink> = Vec::new();

    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH);
    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph | Tag::Heading { .. } | Tag::Item => {
                    finish_block(&mut blocks, &mut active);
                    active = Some(Vec::new());
                }
                Tag::CodeBlock(kind) => {
                    finish_block(&mut blocks, &mut active);
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    active_code = Some(ActiveCodeBlock {
                        language,
                        text: String::new(),
                    });
                }
                Tag::Emphasis => inline_state.emphasis_depth += 1,
                Tag::Strong => inline_state.strong_depth += 1,
                Tag::Strikethrough => inline_state.strikethrough_depth += 1,
                Tag::Link { dest_url, .. } => {
                    let runs = active.get_or_insert_with(Vec::new);
                    links.push(OpenLink {
                        destination: dest_url.to_string(),
                        first_run: runs.len(),
                    });
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item => {
                    finish_block(&mut blocks, &mut active);
                }
                TagEnd::CodeBlock => {
                    if let Some(code) = active_code.take() {
                        blocks.push(code_block_node(code));
                    }
                }
                TagEnd::Emphasis => {
                    inline_state.emphasis_depth = inline_state.emphasis_depth.saturating_sub(1);
                }
                TagEnd::Strong => {
                    inline_state.strong_depth = inline_state.strong_depth.saturating_sub(1);
                }
                TagEnd::Strikethrough => {
                    inline_state.strikethrough_depth =
                        inline_state.strikethrough_depth.saturating_sub(1);
                }
                TagEnd::Link => {
                    let (Some(link), Some(runs)) = (links.pop(), active.as_mut()) else {
                        continue;
                    };
                    close_link(runs, link, registry, inline_state);
                }
                _ => {}
            },
            Event::Text(text) => {
                if let Some(code) = active_code.as_mut() {
                    code.text.push_str(&text);
                    continue;
                }
                let runs = active.get_or_insert_with(Vec::new);
                let marks = marks_for(inline_state, &links);
                push_run(runs, &text, marks);
            }
            Event::Code(text) => {
                let runs = active.get_or_insert_with(Vec::new);
                let mut marks = marks_for(inline_state, &links);
                marks.code = true;
                push_run(runs, &text, marks);
            }
            Event::SoftBreak => {
                let runs = active.get_or_insert_with(Vec::new);
                push_run(runs, " ", marks_for(inline_state, &links));
            }
            Event::HardBreak => {
                let runs = active.get_or_insert_with(Vec::new);
                push_run(runs, "\n", marks_for(inline_state, &links));
            }
            Event::Rule => {
                finish_block(&mut blocks, &mut active);
                blocks.push(Node::divider());
            }
            Event::Html(text) | Event::InlineHtml(text) => {
                let runs = active.get_or_insert_with(Vec::new);
                push_run(runs, &text, marks_for(inline_state, &links));
            }
            _ => {}
        }
    }

    if let Some(code) = active_code.take() {
        blocks.push(code_block_node(code));
    }
    finish_block(&mut blocks, &mut active);

    if blocks.is_empty() {
        blocks.push(Node::paragraph(""));
    }
    Document { children: blocks }
}

fn marks_for(state: InlineState, links: &[OpenLink]) -> Marks {
    Marks {
        bold: state.strong_depth > 0,
        italic: state.emphasis_depth > 0,
        strikethrough: state.strikethrough_depth > 0,
        code: false,
        link: links.last().map(|l| l.destination.clone()),
    }
}

fn push_run(runs: &mut Vec<Node>, text: &str, marks: Marks) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = runs.last_mut() {
        if last.marks == marks {
            last.text.push_str(text);
            return;
        }
    }
    runs.push(Node::Text(TextNode {
        text: text.to_string(),
        marks,
    }));
}

/// Turns a finished link into an inline void when a codec claims its
/// destination.
fn close_link(
    runs: &mut Vec<Node>,
    link: OpenLink,
    registry: &PluginRegistry,
    state: InlineState,
) {
    let first = link.first_run.min(runs.len());
    let mut text = String::new();
    for run in &runs[first..] {
        if let Node::Text(t) = run {
            text.push_str(&t.text);
        }
    }

    match registry.decode_link(&text, &link.destination) {
        Some(VoidDecode::Node(void)) => {
            runs.truncate(first);
            runs.push(Node::Void(void));
        }
        Some(VoidDecode::Fallback(plain)) => {
            runs.truncate(first);
            push_run(runs, &plain, marks_for(state, &[]));
        }
        None => {}
    }
}

fn finish_block(blocks: &mut Vec<Node>, active: &mut Option<Vec<Node>>) {
    let Some(mut runs) = active.take() else {
        return;
    };
    if runs.is_empty() {
        return;
    }
    if !matches!(runs.last(), Some(Node::Text(_))) {
        runs.push(Node::text(""));
    }
    blocks.push(Node::block("paragraph", runs));
}

fn code_block_node(code: ActiveCodeBlock) -> Node {
    let mut text = code.text;
    if text.ends_with('\n') {
        text.pop();
    }
    let mut node = Node::code_block(text);
    if let (Some(language), Node::Element(el)) = (code.language, &mut node) {
        el.attrs
            .insert("language".to_string(), serde_json::Value::String(language));
    }
    node
}
