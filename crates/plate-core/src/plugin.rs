use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ApplyError, Document, ElementNode, Marks, Node, Point, Selection, TextNode, VoidNode};
use crate::ops::{Op, Path, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        CommandError::Failed(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown query: {0}")]
    UnknownQuery(String),
    #[error("Failed to decode query result: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate node spec kind: {0}")]
    DuplicateNodeKind(String),
    #[error("Duplicate command id: {0}")]
    DuplicateCommand(String),
    #[error("Duplicate query id: {0}")]
    DuplicateQuery(String),
    #[error("Duplicate input rule id: {0}")]
    DuplicateInputRule(String),
    #[error("Duplicate void codec kind: {0}")]
    DuplicateCodec(String),
}

pub type CommandHandler =
    Arc<dyn Fn(&mut crate::core::Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;

pub type QueryHandler =
    Arc<dyn Fn(&crate::core::Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut crate::core::Editor, Option<Value>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&crate::core::Editor, Option<Value>) -> Result<Value, QueryError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
    /// Content is literal: input rules and suggestion triggers stay quiet.
    #[serde(default)]
    pub code: bool,
}

impl NodeSpec {
    pub fn text_block(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
            code: false,
        }
    }

    pub fn inline_void(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            role: NodeRole::Inline,
            is_void: true,
            children: ChildConstraint::None,
            code: false,
        }
    }

    pub fn code(mut self, code: bool) -> Self {
        self.code = code;
        self
    }
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

/// A pattern matched against the text before the caret after direct typing.
#[derive(Clone)]
pub struct InputRule {
    pub id: String,
    pub pattern: Regex,
}

impl InputRule {
    pub fn new(id: impl Into<String>, pattern: Regex) -> Self {
        Self {
            id: id.into(),
            pattern,
        }
    }

    /// `before` is the text preceding the caret; `window_start` its block
    /// offset.
    pub fn evaluate(&self, before: &str, block: &[usize], window_start: usize) -> Option<InputRuleHit> {
        let captures = self.pattern.captures(before)?;
        let whole = captures.get(0)?;
        Some(InputRuleHit {
            rule_id: self.id.clone(),
            block: block.to_vec(),
            range: window_start + whole.start()..window_start + whole.end(),
            groups: captures
                .iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRuleHit {
    pub rule_id: String,
    pub block: Path,
    pub range: Range<usize>,
    /// Capture groups, index 0 being the whole match.
    pub groups: Vec<Option<String>>,
}

impl InputRuleHit {
    pub fn group(&self, ix: usize) -> Option<&str> {
        self.groups.get(ix).and_then(|g| g.as_deref())
    }
}

/// Outcome of decoding a markdown link into an inline void.
#[derive(Debug, Clone, PartialEq)]
pub enum VoidDecode {
    Node(VoidNode),
    /// The destination belongs to the codec but the token is unusable; the
    /// link text is kept as plain text.
    Fallback(String),
}

/// Rendering and interchange rules for one inline void kind.
pub trait VoidCodec: Send + Sync {
    fn kind(&self) -> &'static str;
    fn display_text(&self, node: &VoidNode) -> String;
    fn to_markdown(&self, node: &VoidNode) -> String;
    /// `None` when the link is not one of this codec's tokens.
    fn decode_link(&self, text: &str, destination: &str) -> Option<VoidDecode>;
}

pub trait PlatePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
    fn input_rules(&self) -> Vec<InputRule> {
        Vec::new()
    }
    fn void_codecs(&self) -> Vec<Arc<dyn VoidCodec>> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<String, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
    input_rules: Vec<InputRule>,
    void_codecs: HashMap<String, Arc<dyn VoidCodec>>,
}

impl PluginRegistry {
    pub fn new(
        plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core_plugins() -> Vec<Box<dyn PlatePlugin>> {
        vec![
            Box::new(CoreParagraphPlugin),
            Box::new(CoreDividerPlugin),
            Box::new(CodeBlockPlugin),
            Box::new(CoreNormalizePlugin),
        ]
    }

    pub fn core() -> Self {
        Self::new(Self::core_plugins()).expect("core registry must be valid")
    }

    /// Core plugins followed by `extra`.
    pub fn core_with(
        extra: impl IntoIterator<Item = Box<dyn PlatePlugin>>,
    ) -> Result<Self, RegistryError> {
        Self::new(Self::core_plugins().into_iter().chain(extra))
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn PlatePlugin>) -> Result<(), RegistryError> {
        tracing::debug!(plugin = plugin.id(), "registering plugin");

        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(RegistryError::DuplicateNodeKind(spec.kind));
            }
            self.node_specs.insert(spec.kind.clone(), spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(RegistryError::DuplicateCommand(cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(RegistryError::DuplicateQuery(query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        for rule in plugin.input_rules() {
            if self.input_rules.iter().any(|r| r.id == rule.id) {
                return Err(RegistryError::DuplicateInputRule(rule.id));
            }
            self.input_rules.push(rule);
        }

        for codec in plugin.void_codecs() {
            let kind = codec.kind().to_string();
            if self.void_codecs.contains_key(&kind) {
                return Err(RegistryError::DuplicateCodec(kind));
            }
            self.void_codecs.insert(kind, codec);
        }

        Ok(())
    }

    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        &self.node_specs
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn input_rules(&self) -> &[InputRule] {
        &self.input_rules
    }

    pub fn void_codec(&self, kind: &str) -> Option<&Arc<dyn VoidCodec>> {
        self.void_codecs.get(kind)
    }

    pub fn void_codecs(&self) -> impl Iterator<Item = &Arc<dyn VoidCodec>> {
        self.void_codecs.values()
    }

    pub fn void_display_text(&self, node: &VoidNode) -> String {
        match self.void_codec(&node.kind) {
            Some(codec) => codec.display_text(node),
            None => crate::core::LEAF_SENTINEL.to_string(),
        }
    }

    /// First codec that claims the link.
    pub fn decode_link(&self, text: &str, destination: &str) -> Option<VoidDecode> {
        self.void_codecs
            .values()
            .find_map(|codec| codec.decode_link(text, destination))
    }

    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        let mut ops: Vec<Op> = Vec::new();
        for pass in &self.normalize_passes {
            ops.extend(pass.run(doc, self));
        }
        ops
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        let fallback = first_text_point(doc).unwrap_or(Point {
            path: vec![0],
            offset: 0,
        });

        let anchor =
            normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
                normalize_point_to_existing_text(doc, &selection.focus)
                    .unwrap_or_else(|| fallback.clone())
            });
        let focus = normalize_point_to_existing_text(doc, &selection.focus)
            .unwrap_or_else(|| anchor.clone());

        Selection { anchor, focus }
    }

    pub fn is_code_kind(&self, kind: &str) -> bool {
        self.node_specs.get(kind).is_some_and(|spec| spec.code)
    }

    pub fn is_text_block(&self, el: &ElementNode) -> bool {
        match self.node_specs.get(&el.kind).map(|s| &s.children) {
            Some(ChildConstraint::InlineOnly) => true,
            Some(_) => false,
            None => el
                .children
                .iter()
                .any(|n| matches!(n, Node::Text(_) | Node::Void(_))),
        }
    }
}

fn first_text_point(doc: &Document) -> Option<Point> {
    fn walk(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = walk(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
                Node::Void(_) => {}
            }
            path.pop();
        }
        None
    }

    walk(&doc.children, &mut Vec::new())
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = first_text_descendant(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
                Node::Void(_) => {}
            }
            path.pop();
        }
        None
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: crate::core::clamp_to_char_boundary(&t.text, point.offset),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
            Node::Void(_) => {
                break;
            }
        }
    }

    match doc.node(&resolved_path)? {
        Node::Text(t) => Some(Point {
            offset: crate::core::clamp_to_char_boundary(&t.text, point.offset),
            path: resolved_path,
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
        Node::Void(_) => {
            // Caret on an inline void: step onto the text leaf right after it.
            let (&ix, parent) = resolved_path.split_last()?;
            let siblings = doc.block_children(parent)?;
            let mut path = parent.to_vec();
            path.push(ix + 1);
            match siblings.get(ix + 1) {
                Some(Node::Text(_)) => Some(Point { path, offset: 0 }),
                _ => None,
            }
        }
    }
}

struct CoreParagraphPlugin;

impl PlatePlugin for CoreParagraphPlugin {
    fn id(&self) -> &'static str {
        "core.paragraph"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::text_block("paragraph")]
    }
}

struct CoreDividerPlugin;

impl PlatePlugin for CoreDividerPlugin {
    fn id(&self) -> &'static str {
        "core.divider"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "divider".to_string(),
            role: NodeRole::Block,
            is_void: true,
            children: ChildConstraint::None,
            code: false,
        }]
    }
}

struct CodeBlockPlugin;

impl PlatePlugin for CodeBlockPlugin {
    fn id(&self) -> &'static str {
        "code_block"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::text_block("code_block").code(true)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("code_block.toggle", "Toggle code block", |editor, _args| {
                let tx = toggle_code_block(editor).map_err(CommandError::new)?;
                editor.apply(tx)?;
                Ok(())
            })
            .description("Toggle code block for the active text block.")
            .keywords(["code block", "code", "pre", "monospace"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("code_block.is_active", |editor, _args| {
            Ok(active_is_code_block(editor))
        })]
    }
}

fn active_is_code_block(editor: &crate::core::Editor) -> Value {
    let focus = &editor.selection().focus;
    let Some(block_path) = focus.path.split_last().map(|(_, p)| p) else {
        return Value::Bool(false);
    };
    Value::Bool(editor.block_kind(block_path) == Some("code_block"))
}

fn toggle_code_block(editor: &crate::core::Editor) -> Result<Transaction, String> {
    let focus = editor.selection().focus.clone();
    let block_path = focus.path.split_last().map(|(_, p)| p).unwrap_or(&[]);
    if block_path.is_empty() {
        return Err("No active block".into());
    }
    let Some(Node::Element(el)) = editor.doc().node(block_path).cloned() else {
        return Err("Active block is not a text block".into());
    };
    if !editor.registry().is_text_block(&el) {
        return Err("Active block is not a text block".into());
    }

    let mut attrs = el.attrs.clone();
    let next_kind = if el.kind == "code_block" {
        attrs.remove("language");
        "paragraph"
    } else {
        "code_block"
    };

    // Code is literal: inline voids become their display text, marks drop.
    let mut text = String::new();
    for child in &el.children {
        match child {
            Node::Text(t) => text.push_str(&t.text),
            Node::Void(v) => text.push_str(&editor.registry().void_display_text(v)),
            Node::Element(_) => {}
        }
    }
    let children = if next_kind == "code_block" {
        vec![Node::Text(TextNode {
            text,
            marks: Marks::default(),
        })]
    } else {
        el.children
    };

    let next = Node::Element(ElementNode {
        kind: next_kind.to_string(),
        attrs,
        children,
    });

    let mut caret_path = block_path.to_vec();
    caret_path.push(0);
    Ok(Transaction::new(vec![
        Op::RemoveNode {
            path: block_path.to_vec(),
        },
        Op::InsertNode {
            path: block_path.to_vec(),
            node: next,
        },
    ])
    .selection_after(Selection::collapsed(Point::new(caret_path, 0)))
    .source("command:code_block.toggle"))
}

struct CoreNormalizePlugin;

impl PlatePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureTextBlockHasTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

/// Text blocks always carry a text leaf at the end so a caret can follow a
/// trailing inline void.
struct EnsureTextBlockHasTextLeaf;

impl NormalizePass for EnsureTextBlockHasTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_block_has_text_leaf"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            registry: &PluginRegistry,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if registry.is_text_block(el) || el.children.is_empty() {
                    if !matches!(el.children.last(), Some(Node::Text(_))) {
                        let mut insert_path = path.clone();
                        insert_path.push(el.children.len());
                        ops.push(Op::InsertNode {
                            path: insert_path,
                            node: Node::text(""),
                        });
                    }
                } else {
                    walk(&el.children, path, registry, ops);
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            registry: &PluginRegistry,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if registry.is_text_block(el) {
                    merge_runs(&el.children, path, ops);
                } else {
                    walk(&el.children, path, registry, ops);
                }

                path.pop();
            }
        }

        fn merge_runs(children: &[Node], path: &[usize], ops: &mut Vec<Op>) {
            let mut ix = children.len();
            while ix > 0 {
                ix -= 1;
                let Node::Text(right) = &children[ix] else {
                    continue;
                };

                let mut start = ix;
                while start > 0 {
                    let Some(Node::Text(left)) = children.get(start - 1) else {
                        break;
                    };
                    // Empty leaves merge regardless of marks.
                    if left.marks != right.marks && !left.text.is_empty() && !right.text.is_empty()
                    {
                        break;
                    }
                    start -= 1;
                }

                if start == ix {
                    continue;
                }

                let Some(Node::Text(first)) = children.get(start) else {
                    continue;
                };
                let mut appended = String::new();
                for node in children.iter().take(ix + 1).skip(start + 1) {
                    if let Node::Text(t) = node {
                        appended.push_str(&t.text);
                    }
                }

                let mut first_path = path.to_vec();
                first_path.push(start);
                if first.text.is_empty() {
                    if let Some(Node::Text(donor)) = children.get(start + 1) {
                        if donor.marks != first.marks {
                            ops.push(Op::SetTextMarks {
                                path: first_path.clone(),
                                marks: donor.marks.clone(),
                            });
                        }
                    }
                }
                if !appended.is_empty() {
                    ops.push(Op::InsertText {
                        path: first_path,
                        offset: first.text.len(),
                        text: appended,
                    });
                }

                for remove_ix in (start + 1..=ix).rev() {
                    let mut remove_path = path.to_vec();
                    remove_path.push(remove_ix);
                    ops.push(Op::RemoveNode { path: remove_path });
                }

                ix = start;
            }
        }

        walk(&doc.children, &mut Vec::new(), registry, &mut ops);

        ops
    }
}
