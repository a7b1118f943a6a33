use plate_mention::{ConfigError, MentionConfig, TriggerMatcher};

#[test]
fn partial_json_keeps_defaults() {
    let config = MentionConfig::from_json_str(
        r##"{ "trigger": "#", "allow_spaces": false, "layout": { "margin": 12.0 } }"##,
    )
    .unwrap();

    assert_eq!(config.trigger, '#');
    assert!(!config.allow_spaces);
    assert_eq!(config.lookback, 50);
    assert_eq!(config.separator, '\u{a0}');
    assert_eq!(config.query_class, "mention-query");
    assert_eq!(config.layout.margin, 12.0);
    assert_eq!(config.layout.narrow_width, 479.0);
    assert!(!config.layout.clamp_to_viewport);

    let matcher = TriggerMatcher::from_config(&config);
    assert_eq!(matcher.trigger(), '#');
    assert!(matcher.find("#a b", 2).is_some());
    assert!(matcher.find("#a b", 4).is_none());
}

#[test]
fn empty_json_is_the_default_config() {
    assert_eq!(
        MentionConfig::from_json_str("{}").unwrap(),
        MentionConfig::default()
    );
}

#[test]
fn invalid_configs_are_rejected() {
    assert!(matches!(
        MentionConfig::from_json_str(r#"{ "trigger": " " }"#),
        Err(ConfigError::InvalidTrigger(' '))
    ));
    assert!(matches!(
        MentionConfig::from_json_str(r#"{ "separator": "@" }"#),
        Err(ConfigError::SeparatorIsTrigger)
    ));
    assert!(matches!(
        MentionConfig::from_json_str(r#"{ "lookback": 0 }"#),
        Err(ConfigError::ZeroLookback)
    ));
    assert!(matches!(
        MentionConfig::from_json_str(r#"{ "query_class": "" }"#),
        Err(ConfigError::EmptyClass("query_class"))
    ));
    assert!(matches!(
        MentionConfig::from_json_str(r#"{ "layout": { "narrow_width": 0.0 } }"#),
        Err(ConfigError::InvalidNarrowWidth(_))
    ));
    assert!(matches!(
        MentionConfig::from_json_str("not json"),
        Err(ConfigError::Parse(_))
    ));
}
