use std::collections::HashMap;
use std::sync::OnceLock;

use plate_core::{
    AppliedTransaction, Editor, ElementNode, Marks, Node, Op, Selection, TextNode, Transaction,
    point_at_block_offset,
};
use regex::Regex;

use crate::element::MentionAttrs;
use crate::error::CommitError;
use crate::menu::{Candidate, CandidateKind};
use crate::state::{ActivationState, SuggestionRange};

pub const COMMIT_SOURCE: &str = "command:mention.commit";
pub const LINK_SOURCE: &str = "command:mention.insert_link";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    InsertMention,
    InsertLink,
}

impl CommandId {
    pub fn for_candidate(candidate: &Candidate) -> Option<Self> {
        match candidate.kind {
            CandidateKind::Mention => Some(CommandId::InsertMention),
            CandidateKind::Link { .. } => Some(CommandId::InsertLink),
            CandidateKind::Separator => None,
        }
    }
}

pub struct CommitRequest<'a> {
    pub activation: &'a ActivationState,
    pub candidate: &'a Candidate,
    pub separator: char,
}

/// `Ok(None)` when there was nothing to replace.
pub type CommitHandler =
    fn(&mut Editor, &CommitRequest<'_>) -> Result<Option<AppliedTransaction>, CommitError>;

/// Insert commands keyed by [`CommandId`].
pub struct InsertCommands {
    handlers: HashMap<CommandId, CommitHandler>,
}

impl Default for InsertCommands {
    fn default() -> Self {
        let mut commands = Self::empty();
        commands.register(CommandId::InsertMention, insert_mention);
        commands.register(CommandId::InsertLink, insert_link);
        commands
    }
}

impl InsertCommands {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: CommandId, handler: CommitHandler) -> Option<CommitHandler> {
        self.handlers.insert(id, handler)
    }

    pub fn contains(&self, id: CommandId) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn run(
        &self,
        id: CommandId,
        editor: &mut Editor,
        request: &CommitRequest<'_>,
    ) -> Result<Option<AppliedTransaction>, CommitError> {
        let handler = self
            .handlers
            .get(&id)
            .ok_or(CommitError::MissingCommand(id))?;
        handler(editor, request)
    }
}

fn insert_mention(
    editor: &mut Editor,
    request: &CommitRequest<'_>,
) -> Result<Option<AppliedTransaction>, CommitError> {
    let candidate = request.candidate;
    if !matches!(candidate.kind, CandidateKind::Mention) || candidate.id.is_empty() {
        return Err(CommitError::NotCommittable(candidate.id.clone()));
    }
    let attrs = MentionAttrs::new(&candidate.id, &candidate.display);
    let Some(tx) = build_mention_transaction(editor, request.activation, &attrs, request.separator)
    else {
        return Ok(None);
    };
    tracing::debug!(id = %attrs.id, display = %attrs.display, "committing mention");
    Ok(Some(editor.apply(tx)?))
}

fn insert_link(
    editor: &mut Editor,
    request: &CommitRequest<'_>,
) -> Result<Option<AppliedTransaction>, CommitError> {
    let candidate = request.candidate;
    let CandidateKind::Link { href } = &candidate.kind else {
        return Err(CommitError::NotCommittable(candidate.id.clone()));
    };
    if !is_embeddable_link(href) {
        return Err(CommitError::RejectedLink { href: href.clone() });
    }
    let Some(tx) = build_link_transaction(editor, request.activation, &candidate.display, href)
    else {
        return Ok(None);
    };
    tracing::debug!(href = %href, "committing link");
    Ok(Some(editor.apply(tx)?))
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://\S+$").expect("link pattern is valid"))
}

pub fn is_embeddable_link(href: &str) -> bool {
    link_pattern().is_match(href.trim())
}

/// Replaces the active trigger run with one mention followed by `separator`
/// and puts the caret after the separator. `None` while inactive.
pub fn build_mention_transaction(
    editor: &Editor,
    activation: &ActivationState,
    attrs: &MentionAttrs,
    separator: char,
) -> Option<Transaction> {
    let ActivationState::Active { range, .. } = activation else {
        return None;
    };
    let inserted = vec![attrs.to_node(), Node::text(separator.to_string())];
    let caret = range.from + plate_core::LEAF_SENTINEL.len_utf8() + separator.len_utf8();
    replace_range(editor, range, inserted, caret, COMMIT_SOURCE)
}

/// Replaces the active trigger run with `display` linked to `href`, then a
/// plain space.
pub fn build_link_transaction(
    editor: &Editor,
    activation: &ActivationState,
    display: &str,
    href: &str,
) -> Option<Transaction> {
    let ActivationState::Active { range, .. } = activation else {
        return None;
    };
    let text = if display.is_empty() { href } else { display };
    let inserted = vec![
        Node::Text(TextNode {
            text: text.to_string(),
            marks: Marks {
                link: Some(href.to_string()),
                ..Marks::default()
            },
        }),
        Node::text(" "),
    ];
    let caret = range.from + text.len() + 1;
    replace_range(editor, range, inserted, caret, LINK_SOURCE)
}

/// Rebuilds the block with `[from, to)` swapped for `inserted`, as one node
/// replacement.
fn replace_range(
    editor: &Editor,
    range: &SuggestionRange,
    inserted: Vec<Node>,
    caret_offset: usize,
    source: &str,
) -> Option<Transaction> {
    let Node::Element(block) = editor.doc().node(&range.block)? else {
        return None;
    };
    let (mut children, after) = split_inline(&block.children, range.from, range.to);
    if !matches!(children.last(), Some(Node::Text(_))) {
        children.push(Node::text(""));
    }
    children.extend(inserted);
    children.extend(after);

    let caret = point_at_block_offset(&range.block, &children, caret_offset);
    let next = Node::Element(ElementNode {
        kind: block.kind.clone(),
        attrs: block.attrs.clone(),
        children,
    });

    Some(
        Transaction::new(vec![
            Op::RemoveNode {
                path: range.block.clone(),
            },
            Op::InsertNode {
                path: range.block.clone(),
                node: next,
            },
        ])
        .selection_after(Selection::collapsed(caret))
        .source(source),
    )
}

/// Inline children before `from` and from `to` on. Voids inside the range
/// are dropped, text leaves are cut at the edges.
fn split_inline(children: &[Node], from: usize, to: usize) -> (Vec<Node>, Vec<Node>) {
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut offset = 0usize;

    for child in children {
        let len = child.inline_len();
        let (start, end) = (offset, offset + len);
        offset = end;

        match child {
            Node::Text(t) => {
                if start < from {
                    let cut = plate_core::clamp_to_char_boundary(&t.text, from.min(end) - start);
                    before.push(Node::Text(TextNode {
                        text: t.text[..cut].to_string(),
                        marks: t.marks.clone(),
                    }));
                }
                if end > to {
                    let cut = plate_core::clamp_to_char_boundary(&t.text, to.saturating_sub(start));
                    let rest = &t.text[cut..];
                    if !rest.is_empty() {
                        after.push(Node::Text(TextNode {
                            text: rest.to_string(),
                            marks: t.marks.clone(),
                        }));
                    }
                }
            }
            Node::Void(_) => {
                if end <= from {
                    before.push(child.clone());
                } else if start >= to {
                    after.push(child.clone());
                }
            }
            Node::Element(_) => {}
        }
    }

    (before, after)
}
