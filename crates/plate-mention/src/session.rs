use plate_core::{
    AppliedTransaction, ApplyError, Decoration, DecorationSource, Editor, InputRuleHit, Point,
    Selection, Transaction, TypedText,
};

use crate::commit::{CommandId, CommitRequest, InsertCommands};
use crate::config::MentionConfig;
use crate::error::CommitError;
use crate::menu::{Candidate, CandidateKind, KeyPress, MenuAction, MenuController, SearchTicket};
use crate::plugin::OPEN_RULE_ID;
use crate::position::{LayoutProbe, MenuAnchor, MenuPosition, PositionResolver};
use crate::state::{
    ActivationState, CompositionScheduler, CompositionTicket, Settle, SuggestionMachine,
    Transition,
};

pub const DEFAULT_MENU_HEIGHT: f64 = 240.0;
pub const LINK_REJECTED_MESSAGE: &str = "Sorry, that link won't work for this embed type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Toast-style message for the host to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MenuOpened { query: String },
    QueryChanged { query: String },
    MenuClosed,
    /// A search is waiting for [`MentionSession::deliver_results`].
    SearchPending(SearchTicket),
    Committed(Candidate),
    Notice(Notice),
    FocusEditor,
}

pub enum SearchReply {
    Ready(Vec<Candidate>),
    /// Results arrive later through [`MentionSession::deliver_results`].
    Pending,
}

pub trait CandidateSource {
    fn search(&mut self, ticket: &SearchTicket) -> SearchReply;
}

/// A fixed candidate list filtered by case-insensitive substring match on
/// the display name.
#[derive(Debug, Clone, Default)]
pub struct StaticCandidates {
    candidates: Vec<Candidate>,
}

impl StaticCandidates {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }
}

impl CandidateSource for StaticCandidates {
    fn search(&mut self, ticket: &SearchTicket) -> SearchReply {
        let needle = ticket.query.trim().to_lowercase();
        if needle.is_empty() {
            return SearchReply::Ready(self.candidates.clone());
        }
        SearchReply::Ready(
            self.candidates
                .iter()
                .filter(|c| {
                    !matches!(c.kind, CandidateKind::Separator)
                        && c.display.to_lowercase().contains(&needle)
                })
                .cloned()
                .collect(),
        )
    }
}

/// An [`Editor`] with the suggestion subsystem attached. Hosts route every
/// edit, key, click, composition event and search result through it and
/// drain [`SessionEvent`]s afterwards.
pub struct MentionSession {
    editor: Editor,
    config: MentionConfig,
    machine: SuggestionMachine,
    menu: MenuController,
    scheduler: CompositionScheduler,
    resolver: PositionResolver,
    probe: Option<Box<dyn LayoutProbe>>,
    source: Box<dyn CandidateSource>,
    commands: InsertCommands,
    menu_height: f64,
    events: Vec<SessionEvent>,
}

impl MentionSession {
    pub fn new(
        editor: Editor,
        config: MentionConfig,
        source: impl CandidateSource + 'static,
    ) -> Self {
        let resolver = PositionResolver::new(config.layout.clone());
        let menu = MenuController::new(MenuPosition::offscreen(resolver.layout()));
        Self {
            machine: SuggestionMachine::new(&config),
            menu,
            scheduler: CompositionScheduler::default(),
            resolver,
            probe: None,
            source: Box::new(source),
            commands: InsertCommands::default(),
            menu_height: DEFAULT_MENU_HEIGHT,
            events: Vec::new(),
            editor,
            config,
        }
    }

    pub fn with_probe(mut self, probe: impl LayoutProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn with_commands(mut self, commands: InsertCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn config(&self) -> &MentionConfig {
        &self.config
    }

    pub fn activation(&self) -> &ActivationState {
        self.machine.state()
    }

    pub fn menu(&self) -> &MenuController {
        &self.menu
    }

    pub fn set_menu_height(&mut self, height: f64) {
        self.menu_height = height;
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn dispatch(&mut self, tx: Transaction) -> Result<AppliedTransaction, ApplyError> {
        let applied = self.editor.apply(tx)?;
        self.observe(&applied);
        Ok(applied)
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<AppliedTransaction, ApplyError> {
        self.dispatch(Transaction::select(selection))
    }

    /// Direct typing: applies the text, then lets the `mention.open` input
    /// rule decide whether the menu shows.
    pub fn type_text(&mut self, text: &str) -> Result<TypedText, ApplyError> {
        let typed = self.editor.type_text(text)?;
        let hits = typed.rules_evaluated.then_some(typed.rule_hits.as_slice());
        let transition = self.machine.apply(&self.editor, &typed.applied);
        let open_rule = self.open_rule_verdict(hits);
        self.react(transition, open_rule);
        Ok(typed)
    }

    pub fn delete_backward(&mut self) -> Result<Option<AppliedTransaction>, ApplyError> {
        let applied = self.editor.delete_backward()?;
        if let Some(applied) = &applied {
            self.observe(applied);
        }
        Ok(applied)
    }

    pub fn undo(&mut self) -> Option<AppliedTransaction> {
        let applied = self.editor.undo()?;
        self.observe(&applied);
        Some(applied)
    }

    pub fn redo(&mut self) -> Option<AppliedTransaction> {
        let applied = self.editor.redo()?;
        self.observe(&applied);
        Some(applied)
    }

    /// Routes a key to the menu. Confirmation commits the candidate; a
    /// rejected link keeps the menu open and raises a notice.
    pub fn handle_key(&mut self, key: KeyPress) -> Result<MenuAction, CommitError> {
        let action = self.menu.handle_key(key);
        self.after_menu_action(&action)?;
        Ok(action)
    }

    pub fn click_candidate(&mut self, index: usize) -> Result<MenuAction, CommitError> {
        let action = self.menu.click(index);
        self.after_menu_action(&action)?;
        Ok(action)
    }

    /// A pointer press inside the document: closes the menu, then moves the
    /// caret when a point is given.
    pub fn click_editor(&mut self, point: Option<Point>) -> Result<(), ApplyError> {
        if self.menu.is_visible() {
            self.menu.hide();
            self.emit_closed();
        }
        if let Some(point) = point {
            self.set_selection(Selection::collapsed(point))?;
        }
        Ok(())
    }

    pub fn composition_start(&mut self) {
        self.editor.set_composing(true);
    }

    /// Applies composed text and schedules the deferred activation check.
    pub fn composition_update(&mut self, text: &str) -> Result<CompositionTicket, ApplyError> {
        if !self.editor.is_composing() {
            self.editor.set_composing(true);
        }
        let typed = self.editor.type_text(text)?;
        self.observe(&typed.applied);
        Ok(self.scheduler.schedule())
    }

    /// Runs the check for `ticket` unless a later one was scheduled.
    pub fn settle_composition(&mut self, ticket: CompositionTicket) -> Settle {
        let settled = self
            .scheduler
            .settle(ticket, &mut self.machine, &self.editor);
        if let Settle::Settled(transition) = settled {
            let hits = self.editor.input_rule_hits_ignoring_composition();
            let open_rule = self.open_rule_verdict(hits.as_deref());
            self.react(transition, open_rule);
        }
        settled
    }

    pub fn composition_end(&mut self) -> Settle {
        self.editor.set_composing(false);
        let ticket = self.scheduler.schedule();
        self.settle_composition(ticket)
    }

    /// Results of an asynchronous search. Returns `false` when they were stale.
    pub fn deliver_results(&mut self, ticket: &SearchTicket, candidates: Vec<Candidate>) -> bool {
        self.menu.receive_results(ticket, candidates)
    }

    /// Recomputes the menu position, e.g. after a scroll or resize.
    pub fn reposition(&mut self) -> MenuPosition {
        let position = self.resolve_position();
        self.menu.set_position(position);
        position
    }

    pub fn decorations(&self) -> Vec<Decoration> {
        self.machine.decorations(&self.editor)
    }

    fn observe(&mut self, applied: &AppliedTransaction) {
        let transition = self.machine.apply(&self.editor, applied);
        self.react(transition, None);
    }

    /// Whether the `mention.open` rule fired in a paragraph. `None` when the
    /// rules were not evaluated or nothing is active.
    fn open_rule_verdict(&self, hits: Option<&[InputRuleHit]>) -> Option<bool> {
        let hits = hits?;
        if !self.machine.state().is_active() {
            return None;
        }
        Some(hits.iter().any(|hit| {
            hit.rule_id == OPEN_RULE_ID && self.editor.block_kind(&hit.block) == Some("paragraph")
        }))
    }

    /// Settles menu state for one transition first, then emits the events
    /// for the net visibility change.
    fn react(&mut self, transition: Transition, open_rule: Option<bool>) {
        let was_visible = self.menu.is_visible();
        if transition.stopped {
            self.menu.on_stopped();
        }

        let query = self.machine.state().query().map(str::to_string);
        let mut ticket = None;
        if let Some(query) = &query {
            if transition.started {
                let position = self.resolve_position();
                ticket = Some(self.menu.on_started(query, position));
            } else if transition.changed {
                ticket = Some(self.menu.on_query_changed(query));
            }
            match open_rule {
                Some(true) => {
                    self.menu.reveal();
                }
                Some(false) => self.menu.hide(),
                None => {}
            }
            let position = self.resolve_position();
            self.menu.set_position(position);
        }

        let visible = self.menu.is_visible();
        if was_visible && (transition.stopped || !visible) {
            self.emit_closed();
        }
        if let (true, Some(query)) = (visible, query) {
            if !was_visible || transition.stopped {
                self.events.push(SessionEvent::MenuOpened {
                    query: query.clone(),
                });
            }
            if transition.changed {
                self.events.push(SessionEvent::QueryChanged { query });
            }
        }

        if let Some(ticket) = ticket {
            self.search(ticket);
        }
    }

    fn search(&mut self, ticket: SearchTicket) {
        match self.source.search(&ticket) {
            SearchReply::Ready(candidates) => {
                self.menu.receive_results(&ticket, candidates);
            }
            SearchReply::Pending => self.events.push(SessionEvent::SearchPending(ticket)),
        }
    }

    fn after_menu_action(&mut self, action: &MenuAction) -> Result<(), CommitError> {
        match action {
            MenuAction::Confirm(candidate) => self.confirm(candidate.clone()),
            MenuAction::Close => {
                self.emit_closed();
                Ok(())
            }
            MenuAction::Handled | MenuAction::Ignored => Ok(()),
        }
    }

    fn confirm(&mut self, candidate: Candidate) -> Result<(), CommitError> {
        let Some(id) = CommandId::for_candidate(&candidate) else {
            self.close_menu();
            return Ok(());
        };
        let activation = self.machine.state().clone();
        let request = CommitRequest {
            activation: &activation,
            candidate: &candidate,
            separator: self.config.separator,
        };

        match self.commands.run(id, &mut self.editor, &request) {
            Ok(Some(applied)) => {
                self.events.push(SessionEvent::Committed(candidate));
                self.observe(&applied);
                if self.menu.is_visible() {
                    self.close_menu();
                }
                Ok(())
            }
            Ok(None) => {
                self.close_menu();
                Ok(())
            }
            Err(CommitError::NotCommittable(id)) => {
                tracing::debug!(%id, "candidate not committable");
                self.close_menu();
                Ok(())
            }
            Err(CommitError::RejectedLink { href }) => {
                tracing::debug!(%href, "link candidate rejected");
                self.events.push(SessionEvent::Notice(Notice {
                    level: NoticeLevel::Error,
                    message: LINK_REJECTED_MESSAGE.to_string(),
                }));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn close_menu(&mut self) {
        self.menu.hide();
        self.emit_closed();
    }

    fn emit_closed(&mut self) {
        self.events.push(SessionEvent::MenuClosed);
        self.events.push(SessionEvent::FocusEditor);
    }

    fn resolve_position(&self) -> MenuPosition {
        let anchor = match (self.machine.state(), self.editor.caret()) {
            (ActivationState::Active { .. }, Some(caret)) => Some(MenuAnchor {
                block: caret.block,
                offset: caret.offset,
            }),
            _ => None,
        };
        self.resolver
            .resolve(anchor.as_ref(), self.menu_height, self.probe.as_deref())
    }
}
