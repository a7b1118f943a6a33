use plate_core::markdown::{from_markdown, to_markdown};
use plate_core::{Document, Marks, Node, PlateValue, PluginRegistry, TextNode};

fn leaf(text: &str, marks: Marks) -> Node {
    Node::Text(TextNode {
        text: text.to_string(),
        marks,
    })
}

#[test]
fn blocks_round_trip_through_markdown() {
    let registry = PluginRegistry::core();
    let doc = Document {
        children: vec![
            Node::paragraph("Hello world"),
            Node::code_block("let x = 1;"),
            Node::divider(),
        ],
    };

    let markdown = to_markdown(&doc, &registry);
    assert_eq!(markdown, "Hello world\n\n```\nlet x = 1;\n```\n\n---");
    assert_eq!(from_markdown(&markdown, &registry), doc);
}

#[test]
fn marks_round_trip_through_markdown() {
    let registry = PluginRegistry::core();
    let bold = Marks {
        bold: true,
        ..Marks::default()
    };
    let link = Marks {
        link: Some("https://example.com".to_string()),
        ..Marks::default()
    };
    let doc = Document {
        children: vec![Node::block(
            "paragraph",
            vec![
                Node::text("plain "),
                leaf("strong", bold),
                Node::text(" and "),
                leaf("site", link),
            ],
        )],
    };

    let markdown = to_markdown(&doc, &registry);
    assert_eq!(markdown, "plain **strong** and [site](https://example.com)");
    assert_eq!(from_markdown(&markdown, &registry), doc);
}

#[test]
fn link_destinations_keep_their_syntax_characters() {
    let registry = PluginRegistry::core();
    for href in [
        "https://example.com/a(b)",
        "https://example.com/?q=a&amp;b",
        "https://example.com/a<b>",
        "https://example.com/x\\!y",
        "wl:page:two words",
    ] {
        let doc = Document {
            children: vec![Node::block(
                "paragraph",
                vec![leaf(
                    "site",
                    Marks {
                        link: Some(href.to_string()),
                        ..Marks::default()
                    },
                )],
            )],
        };
        let markdown = to_markdown(&doc, &registry);
        assert_eq!(from_markdown(&markdown, &registry), doc, "{markdown}");
    }
}

#[test]
fn markdown_syntax_in_text_is_escaped() {
    let registry = PluginRegistry::core();
    let doc = Document {
        children: vec![
            Node::paragraph("1. not a list *really*"),
            Node::paragraph("  indented"),
            Node::paragraph("line one\nline two"),
        ],
    };

    let markdown = to_markdown(&doc, &registry);
    assert!(markdown.starts_with("1\\. not a list \\*really\\*"));
    assert_eq!(from_markdown(&markdown, &registry), doc);
}

#[test]
fn empty_markdown_yields_one_empty_paragraph() {
    let registry = PluginRegistry::core();
    assert_eq!(
        from_markdown("", &registry).children,
        vec![Node::paragraph("")]
    );
}

#[test]
fn plate_value_round_trips_through_json() -> anyhow::Result<()> {
    let value = PlateValue::from_document(Document {
        children: vec![Node::paragraph("hi")],
    });
    let json = value.to_json_pretty()?;
    assert!(json.contains("\"schema\": \"plate\""));
    assert_eq!(PlateValue::from_json_str(&json)?, value);
    Ok(())
}
