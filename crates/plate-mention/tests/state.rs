use plate_core::{
    Decoration, DecorationSource, Document, Editor, Marks, Node, Point, Selection, TextNode,
    Transaction,
};
use plate_mention::{
    ActivationState, CompositionScheduler, MentionConfig, Settle, SuggestionMachine,
    SuggestionRange,
};

fn editor_at(blocks: Vec<Node>, path: Vec<usize>, offset: usize) -> Editor {
    plate_mention::editor(
        &MentionConfig::default(),
        Document { children: blocks },
        Selection::collapsed(Point::new(path, offset)),
    )
    .unwrap()
}

fn caret(editor: &mut Editor, offset: usize) -> plate_core::AppliedTransaction {
    editor
        .apply(Transaction::select(Selection::collapsed(Point::new(
            vec![0, 0],
            offset,
        ))))
        .unwrap()
}

#[test]
fn typing_after_a_trigger_activates() {
    let editor = editor_at(vec![Node::paragraph("Hello @al")], vec![0, 0], 9);
    let mut machine = SuggestionMachine::new(&MentionConfig::default());

    let transition = machine.resync(&editor);
    assert!(transition.started);
    assert!(!transition.changed);
    assert_eq!(
        machine.state(),
        &ActivationState::Active {
            range: SuggestionRange {
                block: vec![0],
                from: 6,
                to: 9,
            },
            query: "al".to_string(),
        }
    );
}

#[test]
fn moving_the_caret_out_of_the_range_deactivates() {
    let mut editor = editor_at(vec![Node::paragraph("Hello @al")], vec![0, 0], 9);
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    machine.resync(&editor);

    let applied = caret(&mut editor, 2);
    let transition = machine.apply(&editor, &applied);

    assert!(transition.stopped);
    assert!(!transition.started);
    assert_eq!(machine.state(), &ActivationState::Inactive);
    assert!(machine.state().range().is_none());
    assert!(machine.state().query().is_none());
}

#[test]
fn typing_more_query_reports_changed() {
    let mut editor = editor_at(vec![Node::paragraph("Hello @al")], vec![0, 0], 9);
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    machine.resync(&editor);

    let typed = editor.type_text("i").unwrap();
    let transition = machine.apply(&editor, &typed.applied);

    assert!(transition.changed);
    assert!(!transition.started && !transition.stopped);
    assert_eq!(machine.state().query(), Some("ali"));
    assert_eq!(machine.state().range().map(|r| r.to), Some(10));
}

#[test]
fn jumping_between_triggers_stops_then_starts() {
    let mut editor = editor_at(vec![Node::paragraph("@ab @cd")], vec![0, 0], 3);
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    machine.resync(&editor);
    assert_eq!(machine.state().range().map(|r| r.from), Some(0));

    let applied = caret(&mut editor, 7);
    let transition = machine.apply(&editor, &applied);

    assert!(transition.moved());
    assert!(!transition.changed);
    assert_eq!(machine.state().query(), Some("cd"));
}

#[test]
fn range_selections_are_inactive() {
    let mut editor = editor_at(vec![Node::paragraph("Hello @al")], vec![0, 0], 9);
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    machine.resync(&editor);

    let applied = editor
        .apply(Transaction::select(Selection {
            anchor: Point::new(vec![0, 0], 7),
            focus: Point::new(vec![0, 0], 9),
        }))
        .unwrap();
    let transition = machine.apply(&editor, &applied);

    assert!(transition.stopped);
    assert!(!machine.state().is_active());
}

#[test]
fn code_contexts_never_activate() {
    let editor = editor_at(vec![Node::code_block("@al")], vec![0, 0], 3);
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    assert!(machine.resync(&editor).is_quiet());
    assert!(!machine.state().is_active());

    let code_leaf = Node::Text(TextNode {
        text: "@al".to_string(),
        marks: Marks {
            code: true,
            ..Marks::default()
        },
    });
    let editor = editor_at(
        vec![Node::block("paragraph", vec![code_leaf])],
        vec![0, 0],
        3,
    );
    assert!(machine.resync(&editor).is_quiet());
}

#[test]
fn composition_checks_only_run_for_the_latest_ticket() {
    let mut editor = editor_at(vec![Node::paragraph("")], vec![0, 0], 0);
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    let mut scheduler = CompositionScheduler::default();

    editor.set_composing(true);
    let typed = editor.type_text("@a").unwrap();
    assert!(machine.apply(&editor, &typed.applied).is_quiet());
    let first = scheduler.schedule();

    let typed = editor.type_text("l").unwrap();
    assert!(machine.apply(&editor, &typed.applied).is_quiet());
    let second = scheduler.schedule();
    assert!(second.seq() > first.seq());

    assert_eq!(
        scheduler.settle(first, &mut machine, &editor),
        Settle::Superseded
    );
    assert!(!machine.state().is_active());

    let Settle::Settled(transition) = scheduler.settle(second, &mut machine, &editor) else {
        panic!("latest ticket must settle");
    };
    assert!(transition.started);
    assert_eq!(machine.state().query(), Some("al"));

    assert_eq!(
        scheduler.settle(second, &mut machine, &editor),
        Settle::Superseded
    );
}

#[test]
fn decorations_mark_the_query_and_the_current_paragraph() {
    let editor = editor_at(
        vec![Node::paragraph("first"), Node::paragraph("Hello @al")],
        vec![1, 0],
        9,
    );
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    machine.resync(&editor);

    let decorations = machine.decorations(&editor);
    assert_eq!(
        decorations,
        vec![
            Decoration::inline(vec![1], 6..9, "mention-query"),
            Decoration::node(vec![1], "current-element"),
        ]
    );
    assert!(decorations[0].covers_offset(&[1], 7));
    assert!(!decorations[0].covers_offset(&[0], 7));

    machine.deactivate();
    assert_eq!(
        machine.decorations(&editor),
        vec![Decoration::node(vec![1], "current-element")]
    );
}
