//! Inline trigger suggestions ("@mentions") for the plate editor.

mod commit;
mod config;
mod element;
mod error;
mod matcher;
mod menu;
mod plugin;
mod position;
mod session;
mod state;

pub use crate::commit::*;
pub use crate::config::*;
pub use crate::element::*;
pub use crate::error::*;
pub use crate::matcher::*;
pub use crate::menu::*;
pub use crate::plugin::*;
pub use crate::position::*;
pub use crate::session::*;
pub use crate::state::*;

use plate_core::{Document, Editor, EditorConfig, RegistryError, Selection};

/// An editor with the mention plugin registered and its input-rule lookback
/// taken from `config`.
pub fn editor(
    config: &MentionConfig,
    doc: Document,
    selection: Selection,
) -> Result<Editor, RegistryError> {
    let editor_config = EditorConfig {
        input_rule_lookback: config.lookback,
        ..EditorConfig::default()
    };
    Ok(Editor::with_config(
        doc,
        selection,
        registry(config)?,
        editor_config,
    ))
}
