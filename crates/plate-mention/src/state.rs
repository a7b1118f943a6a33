use plate_core::{AppliedTransaction, Decoration, DecorationSource, Editor, Node, Path};
use serde::Serialize;

use crate::config::MentionConfig;
use crate::matcher::TriggerMatcher;

/// Block-offset span of the trigger run currently being typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionRange {
    pub block: Path,
    pub from: usize,
    pub to: usize,
}

impl SuggestionRange {
    pub fn contains(&self, block: &[usize], offset: usize) -> bool {
        self.block.as_slice() == block && self.from <= offset && offset <= self.to
    }

    fn same_trigger(&self, other: &SuggestionRange) -> bool {
        self.block == other.block && self.from == other.from
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActivationState {
    #[default]
    Inactive,
    Active {
        range: SuggestionRange,
        query: String,
    },
}

impl ActivationState {
    pub fn is_active(&self) -> bool {
        matches!(self, ActivationState::Active { .. })
    }

    pub fn range(&self) -> Option<&SuggestionRange> {
        match self {
            ActivationState::Active { range, .. } => Some(range),
            ActivationState::Inactive => None,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            ActivationState::Active { query, .. } => Some(query),
            ActivationState::Inactive => None,
        }
    }
}

/// Edges between two activation states. `started` and `stopped` are both set
/// when the caret jumps from one trigger run to another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    pub started: bool,
    pub stopped: bool,
    pub changed: bool,
}

impl Transition {
    pub fn is_quiet(&self) -> bool {
        !self.started && !self.stopped && !self.changed
    }

    pub fn moved(&self) -> bool {
        self.started && self.stopped
    }
}

pub struct SuggestionMachine {
    matcher: TriggerMatcher,
    state: ActivationState,
    query_class: String,
    current_element_class: String,
}

impl SuggestionMachine {
    pub fn new(config: &MentionConfig) -> Self {
        Self {
            matcher: TriggerMatcher::from_config(config),
            state: ActivationState::Inactive,
            query_class: config.query_class.clone(),
            current_element_class: config.current_element_class.clone(),
        }
    }

    pub fn state(&self) -> &ActivationState {
        &self.state
    }

    pub fn matcher(&self) -> &TriggerMatcher {
        &self.matcher
    }

    /// Re-evaluates activation after `applied` went through the engine.
    ///
    /// While a composition is running only a caret leaving the active range
    /// is acted on; matching waits for the scheduled composition check.
    pub fn apply(&mut self, editor: &Editor, applied: &AppliedTransaction) -> Transition {
        if !applied.selection_moved() && !applied.doc_changed() {
            return Transition::default();
        }

        if editor.is_composing() {
            let left_range = match (&self.state, editor.caret()) {
                (ActivationState::Active { range, .. }, Some(caret)) => {
                    !range.contains(&caret.block, caret.offset)
                }
                (ActivationState::Active { .. }, None) => true,
                (ActivationState::Inactive, _) => false,
            };
            if left_range {
                return self.transition_to(ActivationState::Inactive);
            }
            return Transition::default();
        }

        self.resync(editor)
    }

    /// Recomputes activation from the editor's current caret.
    pub fn resync(&mut self, editor: &Editor) -> Transition {
        let next = self.evaluate(editor);
        self.transition_to(next)
    }

    /// Drops any activation, e.g. after the host cancels the suggestion.
    pub fn deactivate(&mut self) -> Transition {
        self.transition_to(ActivationState::Inactive)
    }

    fn evaluate(&self, editor: &Editor) -> ActivationState {
        let Some(caret) = editor.caret() else {
            return ActivationState::Inactive;
        };
        if editor.is_code_context(&caret) {
            return ActivationState::Inactive;
        }
        let Some(text) = editor.block_text(&caret.block) else {
            return ActivationState::Inactive;
        };
        match self.matcher.find(&text, caret.offset) {
            Some(found) => ActivationState::Active {
                range: SuggestionRange {
                    block: caret.block,
                    from: found.range.start,
                    to: found.range.end,
                },
                query: found.query,
            },
            None => ActivationState::Inactive,
        }
    }

    fn transition_to(&mut self, next: ActivationState) -> Transition {
        let prev = std::mem::replace(&mut self.state, next);
        let transition = match (&prev, &self.state) {
            (ActivationState::Inactive, ActivationState::Inactive) => Transition::default(),
            (ActivationState::Inactive, ActivationState::Active { .. }) => Transition {
                started: true,
                ..Transition::default()
            },
            (ActivationState::Active { .. }, ActivationState::Inactive) => Transition {
                stopped: true,
                ..Transition::default()
            },
            (
                ActivationState::Active {
                    range: prev_range,
                    query: prev_query,
                },
                ActivationState::Active { range, query },
            ) => {
                if prev_range.same_trigger(range) {
                    Transition {
                        changed: prev_query != query,
                        ..Transition::default()
                    }
                } else {
                    Transition {
                        started: true,
                        stopped: true,
                        changed: false,
                    }
                }
            }
        };

        if !transition.is_quiet() {
            tracing::debug!(
                started = transition.started,
                stopped = transition.stopped,
                changed = transition.changed,
                query = self.state.query().unwrap_or(""),
                "suggestion transition"
            );
        }
        transition
    }
}

impl DecorationSource for SuggestionMachine {
    fn decorations(&self, editor: &Editor) -> Vec<Decoration> {
        let mut decorations = Vec::new();

        if let ActivationState::Active { range, .. } = &self.state {
            decorations.push(Decoration::inline(
                range.block.clone(),
                range.from..range.to,
                self.query_class.clone(),
            ));
        }

        if let Some(&top) = editor.selection().focus.path.first() {
            if let Some(Node::Element(el)) = editor.doc().children.get(top) {
                if el.kind == "paragraph" {
                    decorations.push(Decoration::node(
                        vec![top],
                        self.current_element_class.clone(),
                    ));
                }
            }
        }

        decorations
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositionTicket(u64);

impl CompositionTicket {
    pub fn seq(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// A later check was scheduled; this one did nothing.
    Superseded,
    Settled(Transition),
}

/// Deferred activation checks for IME composition. Only the most recently
/// scheduled ticket runs.
#[derive(Debug, Default)]
pub struct CompositionScheduler {
    next_seq: u64,
    pending: Option<u64>,
}

impl CompositionScheduler {
    pub fn schedule(&mut self) -> CompositionTicket {
        self.next_seq += 1;
        self.pending = Some(self.next_seq);
        CompositionTicket(self.next_seq)
    }

    pub fn is_pending(&self, ticket: CompositionTicket) -> bool {
        self.pending == Some(ticket.0)
    }

    pub fn settle(
        &mut self,
        ticket: CompositionTicket,
        machine: &mut SuggestionMachine,
        editor: &Editor,
    ) -> Settle {
        if !self.is_pending(ticket) {
            tracing::trace!(seq = ticket.0, "composition check superseded");
            return Settle::Superseded;
        }
        self.pending = None;
        Settle::Settled(machine.resync(editor))
    }
}
