use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::Editor;
use crate::ops::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum DecorationTarget {
    /// A block-offset range inside a text block.
    Inline { block: Path, range: Range<usize> },
    /// A whole node.
    Node { path: Path },
}

/// A presentation-only class attached to part of the document. Decorations
/// never enter the document model or its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    #[serde(flatten)]
    pub target: DecorationTarget,
    pub class: String,
}

impl Decoration {
    pub fn inline(block: Path, range: Range<usize>, class: impl Into<String>) -> Self {
        Self {
            target: DecorationTarget::Inline { block, range },
            class: class.into(),
        }
    }

    pub fn node(path: Path, class: impl Into<String>) -> Self {
        Self {
            target: DecorationTarget::Node { path },
            class: class.into(),
        }
    }

    pub fn covers_offset(&self, block: &[usize], offset: usize) -> bool {
        match &self.target {
            DecorationTarget::Inline { block: b, range } => {
                b.as_slice() == block && range.start <= offset && offset < range.end
            }
            DecorationTarget::Node { path } => block.starts_with(path),
        }
    }
}

pub trait DecorationSource {
    fn decorations(&self, editor: &Editor) -> Vec<Decoration>;
}
