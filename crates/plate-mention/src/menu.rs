use serde::{Deserialize, Serialize};

use crate::position::MenuPosition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateKind {
    Mention,
    Link { href: String },
    Separator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub display: String,
    pub kind: CandidateKind,
}

impl Candidate {
    pub fn mention(id: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display: display.into(),
            kind: CandidateKind::Mention,
        }
    }

    pub fn link(
        id: impl Into<String>,
        display: impl Into<String>,
        href: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display: display.into(),
            kind: CandidateKind::Link { href: href.into() },
        }
    }

    pub fn separator() -> Self {
        Self {
            id: String::new(),
            display: String::new(),
            kind: CandidateKind::Separator,
        }
    }

    pub fn is_selectable(&self) -> bool {
        !matches!(self.kind, CandidateKind::Separator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    ArrowUp,
    ArrowDown,
    Tab,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub ctrl: bool,
}

impl KeyPress {
    pub fn plain(key: Key) -> Self {
        Self { key, ctrl: false }
    }

    pub fn ctrl(ch: char) -> Self {
        Self {
            key: Key::Char(ch),
            ctrl: true,
        }
    }
}

/// What the host should do with a key or click routed to the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Not for the menu; let the editor handle it.
    Ignored,
    /// Consumed by the menu; suppress default editing.
    Handled,
    Confirm(Candidate),
    Close,
}

/// Identifies one search request so late responses can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchTicket {
    pub seq: u64,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MenuViewState {
    pub selected_index: usize,
    pub position: MenuPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Up,
    Down,
}

pub struct MenuController {
    visible: bool,
    view: MenuViewState,
    candidates: Vec<Candidate>,
    query: Option<String>,
    next_seq: u64,
    pending: Option<SearchTicket>,
}

impl MenuController {
    pub fn new(parked: MenuPosition) -> Self {
        Self {
            visible: false,
            view: MenuViewState {
                selected_index: 0,
                position: parked,
            },
            candidates: Vec::new(),
            query: None,
            next_seq: 0,
            pending: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn view(&self) -> &MenuViewState {
        &self.view
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn pending_search(&self) -> Option<&SearchTicket> {
        self.pending.as_ref()
    }

    pub fn selected(&self) -> Option<&Candidate> {
        self.candidates.get(self.view.selected_index)
    }

    pub fn on_started(&mut self, query: &str, position: MenuPosition) -> SearchTicket {
        self.visible = true;
        self.view = MenuViewState {
            selected_index: 0,
            position,
        };
        self.candidates.clear();
        self.request(query)
    }

    /// Also reveals a menu hidden with Escape.
    pub fn on_query_changed(&mut self, query: &str) -> SearchTicket {
        self.visible = true;
        self.view.selected_index = 0;
        self.request(query)
    }

    pub fn on_stopped(&mut self) {
        self.visible = false;
        self.view.selected_index = 0;
        self.candidates.clear();
        self.query = None;
        self.pending = None;
    }

    pub fn set_position(&mut self, position: MenuPosition) {
        self.view.position = position;
    }

    /// Hides the menu but keeps its query; the next query edge shows it
    /// again.
    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn reveal(&mut self) -> bool {
        if self.visible || self.query.is_none() {
            return false;
        }
        self.visible = true;
        true
    }

    fn request(&mut self, query: &str) -> SearchTicket {
        self.next_seq += 1;
        let ticket = SearchTicket {
            seq: self.next_seq,
            query: query.to_string(),
        };
        self.query = Some(query.to_string());
        self.pending = Some(ticket.clone());
        tracing::debug!(seq = ticket.seq, query, "candidate search requested");
        ticket
    }

    /// Accepts results for `ticket` unless a newer search was issued or the
    /// query moved on.
    pub fn receive_results(&mut self, ticket: &SearchTicket, candidates: Vec<Candidate>) -> bool {
        let current = self.pending.as_ref() == Some(ticket)
            && self.query.as_deref() == Some(ticket.query.as_str());
        if !current {
            tracing::debug!(
                seq = ticket.seq,
                query = %ticket.query,
                "discarding stale search results"
            );
            return false;
        }
        self.pending = None;
        self.candidates = candidates;
        self.view.selected_index = self
            .candidates
            .iter()
            .position(Candidate::is_selectable)
            .unwrap_or(0);
        true
    }

    pub fn handle_key(&mut self, key: KeyPress) -> MenuAction {
        if !self.visible {
            return MenuAction::Ignored;
        }
        match (key.key, key.ctrl) {
            (Key::Enter, _) => self.confirm_selected(),
            (Key::ArrowUp, _) | (Key::Char('p'), true) => self.step(Step::Up),
            (Key::ArrowDown, _) | (Key::Tab, _) | (Key::Char('n'), true) => self.step(Step::Down),
            (Key::Escape, _) => {
                self.hide();
                MenuAction::Close
            }
            _ => MenuAction::Ignored,
        }
    }

    /// Pointer selection of row `index`; same outcome as arrowing there and
    /// pressing Enter.
    pub fn click(&mut self, index: usize) -> MenuAction {
        if !self.visible || index >= self.candidates.len() {
            return MenuAction::Ignored;
        }
        self.view.selected_index = index;
        self.confirm_selected()
    }

    fn confirm_selected(&mut self) -> MenuAction {
        match self.selected() {
            Some(candidate) if candidate.is_selectable() => MenuAction::Confirm(candidate.clone()),
            _ => {
                self.hide();
                MenuAction::Close
            }
        }
    }

    fn step(&mut self, step: Step) -> MenuAction {
        if self.candidates.is_empty() {
            self.hide();
            return MenuAction::Close;
        }
        let last = self.candidates.len() - 1;
        let mut ix = self.view.selected_index.min(last);
        loop {
            let next = match step {
                Step::Up if ix > 0 => ix - 1,
                Step::Down if ix < last => ix + 1,
                _ => break,
            };
            ix = next;
            if self.candidates[ix].is_selectable() {
                self.view.selected_index = ix;
                break;
            }
        }
        MenuAction::Handled
    }
}
