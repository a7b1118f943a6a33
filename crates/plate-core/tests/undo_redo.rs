use plate_core::{
    Attrs, Document, Editor, Node, Op, PluginRegistry, Point, Selection, Transaction, VoidNode,
};

fn editor_with_text(text: &str) -> Editor {
    let doc = Document {
        children: vec![Node::paragraph(text)],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    Editor::new(doc, selection, PluginRegistry::core())
}

#[test]
fn undo_redo_handles_multi_op_insert_order() {
    let mut editor = editor_with_text("");

    let tx = Transaction::new(vec![
        Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "a".to_string(),
        },
        Op::InsertText {
            path: vec![0, 0],
            offset: 1,
            text: "b".to_string(),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![0, 0], 2)))
    .source("test:multi_insert");

    let applied = editor.apply(tx).unwrap();
    assert_eq!(applied.changed_blocks, vec![vec![0]]);
    assert_eq!(applied.source.as_deref(), Some("test:multi_insert"));
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);

    let undone = editor.undo().unwrap();
    assert_eq!(undone.source.as_deref(), Some("history:undo"));
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection().focus.offset, 0);

    assert!(editor.redo().is_some());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);
    assert!(editor.redo().is_none());
}

#[test]
fn undo_redo_restores_a_replaced_block() {
    let mut editor = editor_with_text("XYZ");
    let selection_before = editor.selection().clone();

    let tx = Transaction::new(vec![
        Op::RemoveText {
            path: vec![0, 0],
            range: 0..3,
        },
        Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "a".to_string(),
        },
        Op::InsertNode {
            path: vec![1],
            node: Node::paragraph("bXYZ"),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![1, 0], 1)))
    .source("test:paste_newline");

    editor.apply(tx).unwrap();
    let doc_after = editor.doc().clone();
    let selection_after = editor.selection().clone();

    assert_eq!(doc_after.children.len(), 2);
    assert_eq!(selection_after.focus.path, vec![1, 0]);
    assert_eq!(selection_after.focus.offset, 1);

    assert!(editor.undo().is_some());
    assert_eq!(editor.doc().children, vec![Node::paragraph("XYZ")]);
    assert_eq!(editor.selection(), &selection_before);

    assert!(editor.redo().is_some());
    assert_eq!(editor.doc(), &doc_after);
    assert_eq!(editor.selection(), &selection_after);
}

#[test]
fn selection_only_transactions_are_not_recorded() {
    let mut editor = editor_with_text("abc");

    let applied = editor
        .apply(Transaction::select(Selection::collapsed(Point::new(
            vec![0, 0],
            2,
        ))))
        .unwrap();

    assert!(applied.selection_moved());
    assert!(!applied.doc_changed());
    assert!(!editor.can_undo());
}

#[test]
fn delete_backward_removes_a_whole_inline_void_and_undo_restores_it() {
    let chip = Node::Void(VoidNode::new("chip", Attrs::new()));
    let original = vec![Node::block(
        "paragraph",
        vec![Node::text("ab"), chip, Node::text("cd")],
    )];
    let doc = Document {
        children: original.clone(),
    };
    let mut editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![0, 2], 0)),
        PluginRegistry::core(),
    );

    assert!(editor.delete_backward().unwrap().is_some());
    assert_eq!(editor.doc().children, vec![Node::paragraph("abcd")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 2));

    assert!(editor.undo().is_some());
    assert_eq!(editor.doc().children, original);
}

#[test]
fn delete_backward_at_block_start_does_nothing() {
    let mut editor = editor_with_text("abc");
    assert!(editor.delete_backward().unwrap().is_none());
    assert_eq!(editor.doc().children, vec![Node::paragraph("abc")]);
}
