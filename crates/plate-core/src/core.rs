use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ops::{AppliedTransaction, Op, Path, Transaction};
use crate::plugin::{CommandError, InputRuleHit, PluginRegistry, QueryError};

pub type Attrs = BTreeMap<String, serde_json::Value>;
pub type ElementKind = String;

/// Placeholder every inline void contributes to a block's leaf text.
pub const LEAF_SENTINEL: char = '\u{FFFC}';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        node_ref(self, path)
    }

    /// Inline children of the text block at `path`.
    pub fn block_children(&self, path: &[usize]) -> Option<&[Node]> {
        match node_ref(self, path)? {
            Node::Element(el) => Some(&el.children),
            Node::Void(_) | Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::block("paragraph", vec![Node::text(text)])
    }

    pub fn code_block(text: impl Into<String>) -> Self {
        Self::block("code_block", vec![Node::text(text)])
    }

    pub fn block(kind: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind: kind.into(),
            attrs: Attrs::default(),
            children,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    pub fn divider() -> Self {
        Node::Void(VoidNode {
            kind: "divider".to_string(),
            attrs: Attrs::default(),
        })
    }

    /// Width of this node in block-offset space.
    pub fn inline_len(&self) -> usize {
        match self {
            Node::Text(t) => t.text.len(),
            Node::Void(v) => v.inline_text_len(),
            Node::Element(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
}

impl VoidNode {
    pub fn new(kind: impl Into<String>, attrs: Attrs) -> Self {
        Self {
            kind: kind.into(),
            attrs,
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }

    /// Voids are atomic: they occupy exactly one sentinel in block offsets,
    /// whatever they render as.
    pub fn inline_text_len(&self) -> usize {
        LEAF_SENTINEL.len_utf8()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// `(start, end)` in document order.
    pub fn ordered(&self) -> (&Point, &Point) {
        if self.anchor <= self.focus {
            (&self.anchor, &self.focus)
        } else {
            (&self.focus, &self.anchor)
        }
    }
}

/// A collapsed selection expressed in block offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caret {
    pub block: Path,
    pub offset: usize,
    pub point: Point,
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Default, Clone)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    /// Bytes of text before the caret that input rules look at.
    pub input_rule_lookback: usize,
}

impl EditorConfig {
    fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        if self.input_rule_lookback == 0 {
            self.input_rule_lookback = 50;
        }
        self
    }
}

/// Result of [`Editor::type_text`].
#[derive(Debug, Clone)]
pub struct TypedText {
    pub applied: AppliedTransaction,
    /// `false` when input rules were skipped (composition or a code context).
    pub rules_evaluated: bool,
    pub rule_hits: Vec<InputRuleHit>,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: PluginRegistry,
    config: EditorConfig,
    composing: bool,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Selection,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let mut editor = Self {
            doc,
            selection,
            registry,
            config: config.with_defaults(),
            composing: false,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        };
        editor.normalize_in_place();
        editor
    }

    pub fn with_core_plugins() -> Self {
        let registry = PluginRegistry::core();
        let doc = Document {
            children: vec![Node::paragraph("")],
        };
        let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        Self::new(doc, selection, registry)
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.normalize_selection_in_place();
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn set_composing(&mut self, composing: bool) {
        self.composing = composing;
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> Option<AppliedTransaction> {
        let record = self.undo_stack.pop()?;

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let changed_blocks = changed_blocks(&inverse_ops);
        let mut redo_ops: Vec<Op> = Vec::new();
        for op in inverse_ops.iter().cloned() {
            if let Ok(inv) = self.apply_op(op) {
                redo_ops.push(inv);
            } else {
                // If we can't apply inverse ops, bail out and stop mutating further.
                break;
            }
        }
        redo_ops.reverse();

        self.selection = selection_before.clone();
        self.normalize_in_place();

        self.redo_stack.push(UndoRecord {
            selection_before: selection_before.clone(),
            selection_after: selection_after.clone(),
            inverse_ops: redo_ops,
        });
        Some(AppliedTransaction {
            selection_before: selection_after,
            selection_after: self.selection.clone(),
            changed_blocks,
            source: Some("history:undo".to_string()),
        })
    }

    pub fn redo(&mut self) -> Option<AppliedTransaction> {
        let record = self.redo_stack.pop()?;

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let changed_blocks = changed_blocks(&inverse_ops);
        let mut undo_ops: Vec<Op> = Vec::new();
        for op in inverse_ops.iter().cloned() {
            if let Ok(inv) = self.apply_op(op) {
                undo_ops.push(inv);
            } else {
                break;
            }
        }
        undo_ops.reverse();

        self.selection = selection_after.clone();
        self.normalize_in_place();

        self.undo_stack.push(UndoRecord {
            selection_before: selection_before.clone(),
            selection_after,
            inverse_ops: undo_ops,
        });
        Some(AppliedTransaction {
            selection_before,
            selection_after: self.selection.clone(),
            changed_blocks,
            source: Some("history:redo".to_string()),
        })
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<AppliedTransaction, ApplyError> {
        let selection_before = self.selection.clone();
        let changed_blocks = changed_blocks(&tx.ops);
        let source = tx.meta.source.clone();

        let mut inverse_ops: Vec<Op> = Vec::new();
        for op in tx.ops.iter().cloned() {
            let inv = self.apply_op(op)?;
            inverse_ops.push(inv);
        }

        if let Some(sel) = tx.selection_after {
            self.selection = sel;
        }

        let mut inverse_normalize = self.normalize_with_inverse_ops()?;
        inverse_ops.append(&mut inverse_normalize);
        inverse_ops.reverse();

        self.normalize_selection_in_place();

        let selection_after = self.selection.clone();

        if !inverse_ops.is_empty() {
            self.undo_stack.push(UndoRecord {
                inverse_ops,
                selection_before: selection_before.clone(),
                selection_after: selection_after.clone(),
            });
            self.redo_stack.clear();
            if self.undo_stack.len() > self.config.max_undo {
                self.undo_stack.remove(0);
            }
        }

        tracing::trace!(
            source = source.as_deref().unwrap_or("-"),
            changed = changed_blocks.len(),
            "transaction applied"
        );

        Ok(AppliedTransaction {
            selection_before,
            selection_after,
            changed_blocks,
            source,
        })
    }

    /// Inserts `text` at the caret (replacing a selection inside one text
    /// leaf), then evaluates the registered input rules against the text
    /// before the new caret.
    ///
    /// Selections spanning several leaves collapse to their start.
    pub fn type_text(&mut self, text: &str) -> Result<TypedText, ApplyError> {
        let (start, end) = self.selection.ordered();
        let (start, end) = (start.clone(), end.clone());

        let leaf = match node_ref(&self.doc, &start.path) {
            Some(Node::Text(t)) => t.text.as_str(),
            _ => return Err(ApplyError::InvalidPath("Selection is not in a text node".into())),
        };
        let from = clamp_to_char_boundary(leaf, start.offset);

        let mut ops: Vec<Op> = Vec::new();
        if start.path == end.path && end.offset > from {
            let to = clamp_to_char_boundary(leaf, end.offset);
            ops.push(Op::RemoveText {
                path: start.path.clone(),
                range: from..to,
            });
        }
        ops.push(Op::InsertText {
            path: start.path.clone(),
            offset: from,
            text: text.to_string(),
        });

        let caret = Point::new(start.path.clone(), from + text.len());
        let applied = self.apply(
            Transaction::new(ops)
                .selection_after(Selection::collapsed(caret))
                .source("input:type_text"),
        )?;

        let rule_hits = self.evaluate_input_rules(false);
        Ok(TypedText {
            applied,
            rules_evaluated: rule_hits.is_some(),
            rule_hits: rule_hits.unwrap_or_default(),
        })
    }

    /// Deletes the character before the caret, or the whole inline void
    /// directly before it. Returns `None` when there is nothing to delete
    /// inside the caret's block.
    pub fn delete_backward(&mut self) -> Result<Option<AppliedTransaction>, ApplyError> {
        let (start, end) = self.selection.ordered();
        let (start, end) = (start.clone(), end.clone());

        if start != end {
            if start.path != end.path {
                return Ok(None);
            }
            let tx = Transaction::new(vec![Op::RemoveText {
                path: start.path.clone(),
                range: start.offset..end.offset,
            }])
            .selection_after(Selection::collapsed(start))
            .source("input:delete_backward");
            return self.apply(tx).map(Some);
        }

        let Some(Node::Text(leaf)) = node_ref(&self.doc, &start.path) else {
            return Ok(None);
        };
        let offset = clamp_to_char_boundary(&leaf.text, start.offset);

        if offset > 0 {
            let prev = leaf.text[..offset]
                .chars()
                .next_back()
                .map(char::len_utf8)
                .unwrap_or(0);
            let tx = Transaction::new(vec![Op::RemoveText {
                path: start.path.clone(),
                range: offset - prev..offset,
            }])
            .selection_after(Selection::collapsed(Point::new(
                start.path.clone(),
                offset - prev,
            )))
            .source("input:delete_backward");
            return self.apply(tx).map(Some);
        }

        let Some((child_ix, block_path)) = start.path.split_last() else {
            return Ok(None);
        };
        let Some(prev_ix) = child_ix.checked_sub(1) else {
            return Ok(None);
        };
        let mut prev_path = block_path.to_vec();
        prev_path.push(prev_ix);
        if !matches!(node_ref(&self.doc, &prev_path), Some(Node::Void(_))) {
            return Ok(None);
        }

        let tx = Transaction::new(vec![Op::RemoveNode {
            path: prev_path.clone(),
        }])
        .selection_after(Selection::collapsed(Point::new(prev_path, 0)))
        .source("input:delete_backward");
        self.apply(tx).map(Some)
    }

    pub fn run_command(
        &mut self,
        id: &str,
        args: Option<serde_json::Value>,
    ) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::UnknownCommand(id.to_string()));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::UnknownQuery(id.to_string()));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value).map_err(QueryError::Decode)
    }

    /// The collapsed selection in block offsets, `None` for a range selection.
    pub fn caret(&self) -> Option<Caret> {
        if !self.selection.is_collapsed() {
            return None;
        }
        let focus = &self.selection.focus;
        let (child_ix, block) = focus.path.split_last()?;
        let children = self.doc.block_children(block)?;
        Some(Caret {
            block: block.to_vec(),
            offset: block_offset(children, *child_ix, focus.offset),
            point: focus.clone(),
        })
    }

    pub fn block_kind(&self, block: &[usize]) -> Option<&str> {
        match node_ref(&self.doc, block)? {
            Node::Element(el) => Some(el.kind.as_str()),
            Node::Void(v) => Some(v.kind.as_str()),
            Node::Text(_) => None,
        }
    }

    /// Leaf text of a text block: text leaves verbatim, inline voids as
    /// [`LEAF_SENTINEL`].
    pub fn block_text(&self, block: &[usize]) -> Option<String> {
        self.doc.block_children(block).map(leaf_text)
    }

    /// Leaf text between two block offsets (clamped to char boundaries).
    pub fn text_between(&self, block: &[usize], from: usize, to: usize) -> String {
        let Some(text) = self.block_text(block) else {
            return String::new();
        };
        let from = clamp_to_char_boundary(&text, from);
        let to = clamp_to_char_boundary(&text, to.max(from));
        text[from..to].to_string()
    }

    /// Text of a block as a reader sees it, with voids rendered by their
    /// registered codec.
    pub fn display_text(&self, block: &[usize]) -> Option<String> {
        let children = self.doc.block_children(block)?;
        let mut out = String::new();
        for child in children {
            match child {
                Node::Text(t) => out.push_str(&t.text),
                Node::Void(v) => out.push_str(&self.registry.void_display_text(v)),
                Node::Element(_) => {}
            }
        }
        Some(out)
    }

    /// Whether the caret sits where literal text is expected: inside a node
    /// whose spec is flagged `code`, or on a leaf carrying the code mark.
    pub fn is_code_context(&self, caret: &Caret) -> bool {
        for depth in 1..=caret.block.len() {
            if let Some(Node::Element(el)) = node_ref(&self.doc, &caret.block[..depth]) {
                if self.registry.is_code_kind(&el.kind) {
                    return true;
                }
            }
        }
        matches!(node_ref(&self.doc, &caret.point.path), Some(Node::Text(t)) if t.marks.code)
    }

    fn evaluate_input_rules(&self, ignore_composing: bool) -> Option<Vec<InputRuleHit>> {
        if self.composing && !ignore_composing {
            return None;
        }
        let caret = self.caret()?;
        if self.is_code_context(&caret) {
            return None;
        }
        let text = self.block_text(&caret.block)?;
        let end = clamp_to_char_boundary(&text, caret.offset);
        let start = clamp_to_char_boundary(&text, end.saturating_sub(self.config.input_rule_lookback));
        let before = &text[start..end];

        let hits = self
            .registry
            .input_rules()
            .iter()
            .filter_map(|rule| rule.evaluate(before, &caret.block, start))
            .collect();
        Some(hits)
    }

    /// Re-runs the input rules at the current caret regardless of an ongoing
    /// composition. Used by deferred composition checks.
    pub fn input_rule_hits_ignoring_composition(&self) -> Option<Vec<InputRuleHit>> {
        self.evaluate_input_rules(true)
    }

    fn normalize_in_place(&mut self) {
        let _ = self.normalize_with_inverse_ops();
        self.normalize_selection_in_place();
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = self
            .registry
            .normalize_selection(&self.doc, &self.selection);
    }

    fn normalize_with_inverse_ops(&mut self) -> Result<Vec<Op>, ApplyError> {
        let mut inverse_ops: Vec<Op> = Vec::new();
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.doc);
            if ops.is_empty() {
                return Ok(inverse_ops);
            }
            for op in ops {
                let inv = self.apply_op(op)?;
                inverse_ops.push(inv);
            }
        }
        Err(ApplyError::NormalizeDidNotConverge)
    }

    fn apply_op(&mut self, op: Op) -> Result<Op, ApplyError> {
        apply_op_to(&mut self.doc, &mut self.selection, op)
    }
}

fn changed_blocks(ops: &[Op]) -> Vec<Path> {
    let mut blocks: Vec<Path> = Vec::new();
    for op in ops {
        let block = op.affected_block();
        if !blocks.contains(&block) {
            blocks.push(block);
        }
    }
    blocks
}

fn apply_op_to(doc: &mut Document, selection: &mut Selection, op: Op) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetTextMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.marks, marks);
            Ok(Op::SetTextMarks { path, marks: old })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("normalization did not converge")]
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PathError(pub String);

pub fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

/// Concatenated leaf text of inline children.
pub fn leaf_text(children: &[Node]) -> String {
    let mut out = String::new();
    for node in children {
        match node {
            Node::Text(t) => out.push_str(&t.text),
            Node::Void(_) => out.push(LEAF_SENTINEL),
            Node::Element(_) => {}
        }
    }
    out
}

/// Block offset of `offset` inside child `child_ix`.
pub fn block_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if ix < child_ix {
                    global += t.text.len();
                    continue;
                }
                if ix == child_ix {
                    global += clamp_to_char_boundary(&t.text, offset);
                }
                break;
            }
            Node::Void(v) => {
                if ix < child_ix {
                    global += v.inline_text_len();
                    continue;
                }
                if ix == child_ix {
                    global += offset.min(v.inline_text_len());
                }
                break;
            }
            Node::Element(_) => {}
        }
    }
    global
}

/// Text point for a block offset. Offsets inside a void snap to the nearest
/// text leaf, since voids cannot hold a caret.
pub fn point_at_block_offset(block_path: &[usize], children: &[Node], global_offset: usize) -> Point {
    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if remaining < t.text.len() {
                    let mut path = block_path.to_vec();
                    path.push(child_ix);
                    return Point::new(path, clamp_to_char_boundary(&t.text, remaining));
                }
                if remaining == t.text.len() {
                    if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                        let mut path = block_path.to_vec();
                        path.push(child_ix + 1);
                        return Point::new(path, 0);
                    }
                    let mut path = block_path.to_vec();
                    path.push(child_ix);
                    return Point::new(path, t.text.len());
                }
                remaining = remaining.saturating_sub(t.text.len());
            }
            Node::Void(v) => {
                let len = v.inline_text_len();
                if remaining <= len {
                    let before = remaining;
                    let after = len - remaining;

                    if remaining == 0 || before <= after {
                        for (ix, prev) in children.iter().enumerate().take(child_ix).rev() {
                            if let Node::Text(t) = prev {
                                let mut path = block_path.to_vec();
                                path.push(ix);
                                return Point::new(path, t.text.len());
                            }
                        }
                    }

                    for (ix, next) in children.iter().enumerate().skip(child_ix + 1) {
                        if matches!(next, Node::Text(_)) {
                            let mut path = block_path.to_vec();
                            path.push(ix);
                            return Point::new(path, 0);
                        }
                    }
                    break;
                }
                remaining = remaining.saturating_sub(len);
            }
            Node::Element(_) => {}
        }
    }

    for (child_ix, node) in children.iter().enumerate().rev() {
        if let Node::Text(t) = node {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
    }

    let mut path = block_path.to_vec();
    path.push(0);
    Point::new(path, 0)
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path {
            continue;
        }
        if point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    if path.is_empty() {
        return;
    }
    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    if path.is_empty() {
        return;
    }
    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match node_ref(doc_after_remove, &left_path) {
                Some(Node::Text(left_text))
                    if left_text.marks == removed_text.marks
                        && left_text.text.ends_with(&removed_text.text) =>
                {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // Point was inside the removed subtree. Map it to a nearby point.
        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

fn node_ref<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    let (&first, rest) = path.split_first()?;
    let mut node = doc.children.get(first)?;
    for &ix in rest {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Void(_) | Node::Text(_) => return None,
        };
    }
    Some(node)
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let (&first, rest) = path
        .split_first()
        .ok_or_else(|| PathError("Empty path".into()))?;

    let len = doc.children.len();
    let mut node = doc
        .children
        .get_mut(first)
        .ok_or_else(|| PathError(format!("Path out of bounds at depth 0: {first} >= {len}")))?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Void(_) | Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }
    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Void(_) | Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}
