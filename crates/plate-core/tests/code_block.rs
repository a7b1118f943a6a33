use plate_core::{CommandError, Editor, Node, QueryError};

#[test]
fn code_block_toggle_updates_block_and_query() {
    let mut editor = Editor::with_core_plugins();

    assert!(
        !editor
            .run_query::<bool>("code_block.is_active", None)
            .unwrap()
    );

    editor.run_command("code_block.toggle", None).unwrap();

    assert!(
        editor
            .run_query::<bool>("code_block.is_active", None)
            .unwrap()
    );
    let Node::Element(block) = &editor.doc().children[0] else {
        panic!("expected element block");
    };
    assert_eq!(block.kind, "code_block");

    editor.run_command("code_block.toggle", None).unwrap();

    assert!(
        !editor
            .run_query::<bool>("code_block.is_active", None)
            .unwrap()
    );
    let Node::Element(block) = &editor.doc().children[0] else {
        panic!("expected element block");
    };
    assert_eq!(block.kind, "paragraph");
}

#[test]
fn code_block_is_a_code_context() {
    let mut editor = Editor::with_core_plugins();
    editor.type_text("x").unwrap();
    let caret = editor.caret().unwrap();
    assert!(!editor.is_code_context(&caret));

    editor.run_command("code_block.toggle", None).unwrap();
    let caret = editor.caret().unwrap();
    assert!(editor.is_code_context(&caret));
}

#[test]
fn unknown_command_and_query_are_reported() {
    let mut editor = Editor::with_core_plugins();

    assert!(matches!(
        editor.run_command("nope.missing", None),
        Err(CommandError::UnknownCommand(id)) if id == "nope.missing"
    ));
    assert!(matches!(
        editor.run_query_json("nope.missing", None),
        Err(QueryError::UnknownQuery(_))
    ));
    assert!(matches!(
        editor.run_query::<u32>("code_block.is_active", None),
        Err(QueryError::Decode(_))
    ));
}
