use plate_core::markdown::{escape_text, link_destination};
use plate_core::{Attrs, Document, Node, VoidCodec, VoidDecode, VoidNode};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TRIGGER;

pub const MENTION_KIND: &str = "mention";
/// Link scheme of the markdown interchange token.
pub const MENTION_SCHEME: &str = "wl:userMention:";

/// Attributes of a committed mention. Never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MentionAttrs {
    pub id: String,
    pub display: String,
}

impl MentionAttrs {
    pub fn new(id: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display: display.into(),
        }
    }

    pub fn from_void(node: &VoidNode) -> Option<Self> {
        if node.kind != MENTION_KIND {
            return None;
        }
        Some(Self {
            id: node.attr_str("id")?.to_string(),
            display: node.attr_str("display").unwrap_or_default().to_string(),
        })
    }

    pub fn to_void(&self) -> VoidNode {
        let mut attrs = Attrs::new();
        attrs.insert("id".to_string(), self.id.clone().into());
        attrs.insert("display".to_string(), self.display.clone().into());
        VoidNode::new(MENTION_KIND, attrs)
    }

    pub fn to_node(&self) -> Node {
        Node::Void(self.to_void())
    }

    /// Interchange link target. The id is percent-encoded.
    pub fn href(&self) -> String {
        format!("{MENTION_SCHEME}{}", urlencoding::encode(&self.id))
    }
}

/// Every mention in document order.
pub fn collect_mentions(doc: &Document) -> Vec<MentionAttrs> {
    fn walk(children: &[Node], out: &mut Vec<MentionAttrs>) {
        for node in children {
            match node {
                Node::Void(v) => out.extend(MentionAttrs::from_void(v)),
                Node::Element(el) => walk(&el.children, out),
                Node::Text(_) => {}
            }
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut out);
    out
}

pub struct MentionCodec {
    trigger: char,
}

impl Default for MentionCodec {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER)
    }
}

impl MentionCodec {
    pub fn new(trigger: char) -> Self {
        Self { trigger }
    }
}

impl VoidCodec for MentionCodec {
    fn kind(&self) -> &'static str {
        MENTION_KIND
    }

    fn display_text(&self, node: &VoidNode) -> String {
        format!(
            "{}{}",
            self.trigger,
            node.attr_str("display").unwrap_or_default()
        )
    }

    fn to_markdown(&self, node: &VoidNode) -> String {
        let id = node.attr_str("id").unwrap_or_default();
        let href = format!("{MENTION_SCHEME}{}", urlencoding::encode(id));
        let display = node.attr_str("display").unwrap_or_default();
        let trigger = if self.trigger.is_ascii_punctuation() {
            format!("\\{}", self.trigger)
        } else {
            self.trigger.to_string()
        };
        format!(
            "[{trigger}{}]({})",
            escape_text(display, false),
            link_destination(&href)
        )
    }

    fn decode_link(&self, text: &str, destination: &str) -> Option<VoidDecode> {
        let encoded = destination.strip_prefix(MENTION_SCHEME)?;
        let id = match urlencoding::decode(encoded) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%err, destination, "mention id is not valid UTF-8; keeping text");
                return Some(VoidDecode::Fallback(text.to_string()));
            }
        };
        if id.trim().is_empty() {
            tracing::warn!(text, destination, "mention token without id; keeping text");
            return Some(VoidDecode::Fallback(text.to_string()));
        }
        let display = text.strip_prefix(self.trigger).unwrap_or(text);
        Some(VoidDecode::Node(
            MentionAttrs::new(id.into_owned(), display).to_void(),
        ))
    }
}
