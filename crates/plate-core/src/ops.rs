use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{Marks, Node, Selection};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
}

impl Op {
    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::SetTextMarks { path, .. } => path,
        }
    }

    /// Path of the block whose inline content this op touches.
    ///
    /// Ops on top-level nodes report the node itself.
    pub fn affected_block(&self) -> Path {
        let path = self.path();
        match self {
            Op::InsertText { .. } | Op::RemoveText { .. } | Op::SetTextMarks { .. } => {
                path.split_last().map(|(_, p)| p.to_vec()).unwrap_or_default()
            }
            _ if path.len() > 1 => path[..path.len() - 1].to_vec(),
            _ => path.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    /// A transaction that only moves the selection.
    pub fn select(selection: Selection) -> Self {
        Self::new(Vec::new()).selection_after(selection)
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}

/// What the engine reports back after a transaction has been applied.
///
/// Observers (suggestion tracking, decorations) read this instead of
/// re-deriving the change from the ops.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransaction {
    pub selection_before: Selection,
    pub selection_after: Selection,
    pub changed_blocks: Vec<Path>,
    pub source: Option<String>,
}

impl AppliedTransaction {
    pub fn selection_moved(&self) -> bool {
        self.selection_before != self.selection_after
    }

    pub fn doc_changed(&self) -> bool {
        !self.changed_blocks.is_empty()
    }
}
