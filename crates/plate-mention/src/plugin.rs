use std::sync::Arc;

use plate_core::{
    CommandError, CommandSpec, Editor, InputRule, NodeSpec, PlatePlugin, PluginRegistry,
    QueryError, QuerySpec, RegistryError, VoidCodec,
};
use regex::Regex;
use serde_json::Value;

use crate::commit::build_mention_transaction;
use crate::config::MentionConfig;
use crate::element::{MENTION_KIND, MentionAttrs, MentionCodec, collect_mentions};
use crate::state::{ActivationState, SuggestionRange};

pub const OPEN_RULE_ID: &str = "mention.open";

/// Pattern the `mention.open` input rule matches against the text before the
/// caret. Group 1 is the trigger run, group 2 the query.
pub fn open_pattern(trigger: char, allow_spaces: bool) -> String {
    let t = regex::escape(&trigger.to_string());
    let excluded = if allow_spaces {
        t.clone()
    } else {
        format!(r"\s{t}")
    };
    format!(r"(?:^|\s)({t}([^{excluded}]*))$")
}

pub struct MentionPlugin {
    trigger: char,
    allow_spaces: bool,
    separator: char,
}

impl Default for MentionPlugin {
    fn default() -> Self {
        Self::new(&MentionConfig::default())
    }
}

impl MentionPlugin {
    pub fn new(config: &MentionConfig) -> Self {
        Self {
            trigger: config.trigger,
            allow_spaces: config.allow_spaces,
            separator: config.separator,
        }
    }
}

impl PlatePlugin for MentionPlugin {
    fn id(&self) -> &'static str {
        "mention"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::inline_void(MENTION_KIND)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let separator = self.separator;
        vec![
            CommandSpec::new("mention.insert", "Insert mention", move |editor, args| {
                insert_at_caret(editor, args, separator)
            })
            .description("Insert a mention at the caret.")
            .keywords(["mention", "user", "at"])
            .args_example(serde_json::json!({ "id": "42", "display": "Alice" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("mention.list", |editor, _args| {
            serde_json::to_value(collect_mentions(editor.doc())).map_err(QueryError::Decode)
        })]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        let pattern = open_pattern(self.trigger, self.allow_spaces);
        match Regex::new(&pattern) {
            Ok(regex) => vec![InputRule::new(OPEN_RULE_ID, regex)],
            Err(err) => {
                tracing::warn!(%err, pattern, "mention open rule not registered");
                Vec::new()
            }
        }
    }

    fn void_codecs(&self) -> Vec<Arc<dyn VoidCodec>> {
        vec![Arc::new(MentionCodec::new(self.trigger))]
    }
}

fn insert_at_caret(
    editor: &mut Editor,
    args: Option<Value>,
    separator: char,
) -> Result<(), CommandError> {
    let Some(args) = args else {
        return Err(CommandError::InvalidArgs("missing args".to_string()));
    };
    let attrs: MentionAttrs = serde_json::from_value(args)
        .map_err(|err| CommandError::InvalidArgs(err.to_string()))?;
    if attrs.id.is_empty() {
        return Err(CommandError::InvalidArgs("id must not be empty".to_string()));
    }

    let Some(caret) = editor.caret() else {
        return Err(CommandError::new("Selection is not collapsed"));
    };
    let at_caret = ActivationState::Active {
        range: SuggestionRange {
            block: caret.block,
            from: caret.offset,
            to: caret.offset,
        },
        query: String::new(),
    };
    let Some(tx) = build_mention_transaction(editor, &at_caret, &attrs, separator) else {
        return Err(CommandError::new("Caret is not in a text block"));
    };
    editor.apply(tx.source("command:mention.insert"))?;
    Ok(())
}

/// Core plugins plus [`MentionPlugin`] configured from `config`.
pub fn registry(config: &MentionConfig) -> Result<PluginRegistry, RegistryError> {
    PluginRegistry::core_with([Box::new(MentionPlugin::new(config)) as Box<dyn PlatePlugin>])
}
