use plate_core::{
    Attrs, Document, Editor, InputRule, Node, PlatePlugin, PluginRegistry, Point, RegistryError,
    Selection, VoidNode,
};
use regex::Regex;

struct HashtagPlugin;

impl PlatePlugin for HashtagPlugin {
    fn id(&self) -> &'static str {
        "test.hashtag"
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![InputRule::new(
            "hashtag",
            Regex::new(r"#(\w+)$").unwrap(),
        )]
    }
}

fn hashtag_editor() -> Editor {
    let registry = PluginRegistry::core_with([Box::new(HashtagPlugin) as Box<dyn PlatePlugin>])
        .unwrap();
    Editor::new(
        Document {
            children: vec![Node::paragraph("")],
        },
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        registry,
    )
}

#[test]
fn typing_evaluates_input_rules_before_the_caret() {
    let mut editor = hashtag_editor();

    let typed = editor.type_text("hi #tag").unwrap();
    assert!(typed.rules_evaluated);
    assert_eq!(typed.rule_hits.len(), 1);
    let hit = &typed.rule_hits[0];
    assert_eq!(hit.rule_id, "hashtag");
    assert_eq!(hit.block, vec![0]);
    assert_eq!(hit.range, 3..7);
    assert_eq!(hit.group(1), Some("tag"));

    let typed = editor.type_text(" ").unwrap();
    assert!(typed.rule_hits.is_empty());
}

#[test]
fn composition_defers_input_rules() {
    let mut editor = hashtag_editor();
    editor.set_composing(true);

    let typed = editor.type_text("#abc").unwrap();
    assert!(!typed.rules_evaluated);
    assert!(typed.rule_hits.is_empty());

    let deferred = editor.input_rule_hits_ignoring_composition().unwrap();
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].group(1), Some("abc"));
}

#[test]
fn code_blocks_suppress_input_rules() {
    let mut editor = hashtag_editor();
    editor.run_command("code_block.toggle", None).unwrap();

    let typed = editor.type_text("#abc").unwrap();
    assert!(!typed.rules_evaluated);
}

#[test]
fn caret_offsets_count_voids_as_one_sentinel() {
    let chip = Node::Void(VoidNode::new("chip", Attrs::new()));
    let doc = Document {
        children: vec![Node::block(
            "paragraph",
            vec![Node::text("ab"), chip, Node::text("cd")],
        )],
    };
    let editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![0, 2], 1)),
        PluginRegistry::core(),
    );

    let caret = editor.caret().unwrap();
    assert_eq!(caret.block, vec![0]);
    assert_eq!(caret.offset, 2 + '\u{FFFC}'.len_utf8() + 1);
    assert_eq!(editor.block_text(&[0]).unwrap(), "ab\u{FFFC}cd");
    assert_eq!(editor.text_between(&[0], 0, 2), "ab");
}

#[test]
fn duplicate_registrations_are_rejected() {
    let result = PluginRegistry::core_with([
        Box::new(HashtagPlugin) as Box<dyn PlatePlugin>,
        Box::new(HashtagPlugin) as Box<dyn PlatePlugin>,
    ]);
    let Err(err) = result else {
        panic!("expected duplicate input rule");
    };
    assert_eq!(err, RegistryError::DuplicateInputRule("hashtag".to_string()));
}
