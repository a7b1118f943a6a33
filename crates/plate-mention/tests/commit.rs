use plate_core::markdown::{from_markdown, to_markdown};
use plate_core::{CommandError, Document, Editor, Node, Point, Selection};
use plate_mention::{
    ActivationState, Candidate, CommandId, CommitError, CommitRequest, InsertCommands,
    MentionAttrs, MentionConfig, SuggestionMachine, build_mention_transaction, collect_mentions,
};
use serde_json::json;

fn editor_with(text: &str, offset: usize) -> Editor {
    plate_mention::editor(
        &MentionConfig::default(),
        Document {
            children: vec![Node::paragraph(text)],
        },
        Selection::collapsed(Point::new(vec![0, 0], offset)),
    )
    .unwrap()
}

fn active(editor: &Editor) -> ActivationState {
    let mut machine = SuggestionMachine::new(&MentionConfig::default());
    machine.resync(editor);
    machine.state().clone()
}

#[test]
fn commit_replaces_the_query_with_a_mention_and_separator() {
    let mut editor = editor_with("Hello @al", 9);
    let activation = active(&editor);

    let tx = build_mention_transaction(
        &editor,
        &activation,
        &MentionAttrs::new("42", "Alice"),
        '\u{a0}',
    )
    .unwrap();
    editor.apply(tx).unwrap();

    assert_eq!(editor.display_text(&[0]).unwrap(), "Hello @Alice\u{a0}");
    assert_eq!(
        collect_mentions(editor.doc()),
        vec![MentionAttrs::new("42", "Alice")]
    );
    let caret = editor.caret().unwrap();
    assert_eq!(caret.offset, 6 + '\u{FFFC}'.len_utf8() + '\u{a0}'.len_utf8());
    assert_eq!(caret.point, Point::new(vec![0, 2], 2));
}

#[test]
fn committed_mentions_survive_a_markdown_round_trip() {
    let mut editor = editor_with("Hello @al", 9);
    let activation = active(&editor);
    let tx = build_mention_transaction(
        &editor,
        &activation,
        &MentionAttrs::new("42", "Alice"),
        '\u{a0}',
    )
    .unwrap();
    editor.apply(tx).unwrap();

    let markdown = to_markdown(editor.doc(), editor.registry());
    assert_eq!(markdown, "Hello [\\@Alice](wl:userMention:42)\u{a0}");

    let parsed = from_markdown(&markdown, editor.registry());
    assert_eq!(&parsed, editor.doc());
    assert_eq!(
        collect_mentions(&parsed),
        vec![MentionAttrs::new("42", "Alice")]
    );
}

#[test]
fn malformed_mention_tokens_fall_back_to_text() {
    let registry = plate_mention::registry(&MentionConfig::default()).unwrap();
    let parsed = from_markdown("Hi [\\@Bob](wl:userMention:)\n\nafter", &registry);

    assert_eq!(
        parsed.children,
        vec![Node::paragraph("Hi @Bob"), Node::paragraph("after")]
    );
}

#[test]
fn commit_while_inactive_is_a_no_op() {
    let editor = editor_with("Hello", 5);
    assert!(
        build_mention_transaction(
            &editor,
            &ActivationState::Inactive,
            &MentionAttrs::new("1", "x"),
            '\u{a0}',
        )
        .is_none()
    );
}

#[test]
fn missing_insert_command_is_an_error() {
    let mut editor = editor_with("Hello @al", 9);
    let activation = active(&editor);
    let candidate = Candidate::mention("42", "Alice");
    let request = CommitRequest {
        activation: &activation,
        candidate: &candidate,
        separator: '\u{a0}',
    };

    let err = InsertCommands::empty()
        .run(CommandId::InsertMention, &mut editor, &request)
        .unwrap_err();
    assert_eq!(err, CommitError::MissingCommand(CommandId::InsertMention));
    assert_eq!(editor.doc().children, vec![Node::paragraph("Hello @al")]);
}

#[test]
fn link_candidates_are_validated_before_insertion() {
    let mut editor = editor_with("Hello @ex", 9);
    let activation = active(&editor);
    let commands = InsertCommands::default();

    let rejected = Candidate::link("bad", "Bad", "ftp://example.com");
    let request = CommitRequest {
        activation: &activation,
        candidate: &rejected,
        separator: '\u{a0}',
    };
    assert!(matches!(
        commands.run(CommandId::InsertLink, &mut editor, &request),
        Err(CommitError::RejectedLink { .. })
    ));
    assert_eq!(editor.doc().children, vec![Node::paragraph("Hello @ex")]);

    let accepted = Candidate::link("ok", "Example", "https://example.com/a");
    let request = CommitRequest {
        activation: &activation,
        candidate: &accepted,
        separator: '\u{a0}',
    };
    assert!(
        commands
            .run(CommandId::InsertLink, &mut editor, &request)
            .unwrap()
            .is_some()
    );
    assert_eq!(editor.display_text(&[0]).unwrap(), "Hello Example ");
    assert_eq!(editor.caret().unwrap().offset, 14);
}

#[test]
fn a_commit_undoes_in_one_step() {
    let mut editor = editor_with("Hello @al", 9);
    let activation = active(&editor);
    let candidate = Candidate::mention("42", "Alice");
    let request = CommitRequest {
        activation: &activation,
        candidate: &candidate,
        separator: '\u{a0}',
    };
    InsertCommands::default()
        .run(CommandId::InsertMention, &mut editor, &request)
        .unwrap();

    assert!(editor.undo().is_some());
    assert_eq!(editor.doc().children, vec![Node::paragraph("Hello @al")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 9));
    assert!(!editor.can_undo());
}

#[test]
fn deleting_backward_removes_a_mention_whole() {
    let mut editor = editor_with("Hello @al", 9);
    let activation = active(&editor);
    let tx = build_mention_transaction(
        &editor,
        &activation,
        &MentionAttrs::new("42", "Alice"),
        '\u{a0}',
    )
    .unwrap();
    editor.apply(tx).unwrap();

    editor.delete_backward().unwrap();
    assert_eq!(editor.display_text(&[0]).unwrap(), "Hello @Alice");

    editor.delete_backward().unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("Hello ")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 6));
}

#[test]
fn insert_command_and_list_query() -> anyhow::Result<()> {
    let mut editor = editor_with("Hi ", 3);

    editor.run_command("mention.insert", Some(json!({ "id": "7", "display": "Bo" })))?;
    assert_eq!(editor.display_text(&[0]).unwrap(), "Hi @Bo\u{a0}");

    let listed: Vec<MentionAttrs> = editor.run_query("mention.list", None)?;
    assert_eq!(listed, vec![MentionAttrs::new("7", "Bo")]);

    assert!(matches!(
        editor.run_command("mention.insert", Some(json!({ "display": "Bo" }))),
        Err(CommandError::InvalidArgs(_))
    ));
    Ok(())
}

fn mentions_after_markdown_round_trip(attrs: &MentionAttrs) -> Vec<MentionAttrs> {
    let mut editor = editor_with("Hi @x", 5);
    let activation = active(&editor);
    let tx = build_mention_transaction(&editor, &activation, attrs, '\u{a0}').unwrap();
    editor.apply(tx).unwrap();

    let markdown = to_markdown(editor.doc(), editor.registry());
    collect_mentions(&from_markdown(&markdown, editor.registry()))
}

#[test]
fn ids_with_markdown_syntax_survive_a_round_trip() {
    for id in ["a&amp;b", "a<b", "x\\!y", "a)b", "a b", "50%", "<>", "ünï"] {
        let attrs = MentionAttrs::new(id, "Alice");
        assert_eq!(
            mentions_after_markdown_round_trip(&attrs),
            vec![attrs.clone()],
            "id {id:?}"
        );
    }
}

quickcheck::quickcheck! {
    fn mention_tokens_round_trip(id: String, display: String) -> bool {
        if id.trim().is_empty() {
            return true;
        }
        let display: String = display.chars().filter(|c| !c.is_control()).collect();
        let attrs = MentionAttrs::new(id, display);
        mentions_after_markdown_round_trip(&attrs) == vec![attrs]
    }
}
