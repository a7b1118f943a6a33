use plate_mention::{
    Candidate, Key, KeyPress, LayoutConfig, MenuAction, MenuController, MenuPosition,
};

fn parked() -> MenuPosition {
    MenuPosition::offscreen(&LayoutConfig::default())
}

fn open_with(candidates: Vec<Candidate>) -> MenuController {
    let mut menu = MenuController::new(parked());
    let ticket = menu.on_started("a", parked());
    assert!(menu.receive_results(&ticket, candidates));
    menu
}

fn three() -> Vec<Candidate> {
    vec![
        Candidate::mention("1", "Ada"),
        Candidate::mention("2", "Alan"),
        Candidate::mention("3", "Alice"),
    ]
}

fn down() -> KeyPress {
    KeyPress::plain(Key::ArrowDown)
}

#[test]
fn next_at_the_end_stays_on_the_last_candidate() {
    let mut menu = open_with(three());

    assert_eq!(menu.handle_key(down()), MenuAction::Handled);
    assert_eq!(menu.handle_key(KeyPress::plain(Key::Tab)), MenuAction::Handled);
    assert_eq!(menu.view().selected_index, 2);

    assert_eq!(menu.handle_key(KeyPress::ctrl('n')), MenuAction::Handled);
    assert_eq!(menu.view().selected_index, 2);

    assert_eq!(
        menu.handle_key(KeyPress::plain(Key::Enter)),
        MenuAction::Confirm(Candidate::mention("3", "Alice"))
    );
}

#[test]
fn previous_at_the_start_stays_on_the_first_candidate() {
    let mut menu = open_with(three());

    assert_eq!(menu.handle_key(KeyPress::plain(Key::ArrowUp)), MenuAction::Handled);
    assert_eq!(menu.view().selected_index, 0);

    menu.handle_key(down());
    assert_eq!(menu.handle_key(KeyPress::ctrl('p')), MenuAction::Handled);
    assert_eq!(menu.view().selected_index, 0);
}

#[test]
fn navigation_skips_separators() {
    let mut menu = open_with(vec![
        Candidate::separator(),
        Candidate::mention("1", "Ada"),
        Candidate::separator(),
        Candidate::link("l", "Docs", "https://example.com/docs"),
        Candidate::separator(),
    ]);
    assert_eq!(menu.view().selected_index, 1);

    menu.handle_key(down());
    assert_eq!(menu.view().selected_index, 3);

    menu.handle_key(down());
    assert_eq!(menu.view().selected_index, 3);

    menu.handle_key(KeyPress::plain(Key::ArrowUp));
    assert_eq!(menu.view().selected_index, 1);

    menu.handle_key(KeyPress::plain(Key::ArrowUp));
    assert_eq!(menu.view().selected_index, 1);
}

#[test]
fn navigating_an_empty_list_closes_the_menu() {
    let mut menu = open_with(Vec::new());

    assert_eq!(menu.handle_key(down()), MenuAction::Close);
    assert!(!menu.is_visible());
    assert_eq!(menu.handle_key(down()), MenuAction::Ignored);
}

#[test]
fn enter_without_a_selectable_candidate_closes() {
    let mut menu = open_with(Vec::new());
    assert_eq!(menu.handle_key(KeyPress::plain(Key::Enter)), MenuAction::Close);
    assert!(!menu.is_visible());

    let mut menu = open_with(vec![Candidate::separator()]);
    assert_eq!(menu.handle_key(KeyPress::plain(Key::Enter)), MenuAction::Close);
}

#[test]
fn escape_hides_until_the_query_changes() {
    let mut menu = open_with(three());

    assert_eq!(menu.handle_key(KeyPress::plain(Key::Escape)), MenuAction::Close);
    assert!(!menu.is_visible());
    assert_eq!(menu.query(), Some("a"));
    assert_eq!(menu.handle_key(KeyPress::plain(Key::Enter)), MenuAction::Ignored);

    menu.on_query_changed("al");
    assert!(menu.is_visible());
}

#[test]
fn other_keys_are_left_to_the_editor() {
    let mut menu = open_with(three());
    assert_eq!(menu.handle_key(KeyPress::plain(Key::Char('x'))), MenuAction::Ignored);
    assert_eq!(menu.handle_key(KeyPress::ctrl('x')), MenuAction::Ignored);
    assert!(menu.is_visible());
}

#[test]
fn query_change_resets_selection() {
    let mut menu = open_with(three());
    menu.handle_key(down());
    menu.handle_key(down());
    assert_eq!(menu.view().selected_index, 2);

    let ticket = menu.on_query_changed("al");
    assert_eq!(menu.view().selected_index, 0);
    assert!(menu.receive_results(
        &ticket,
        vec![Candidate::mention("2", "Alan"), Candidate::mention("3", "Alice")]
    ));
    assert_eq!(menu.selected(), Some(&Candidate::mention("2", "Alan")));
}

#[test]
fn stale_results_are_discarded() {
    let mut menu = MenuController::new(parked());
    let first = menu.on_started("a", parked());
    let second = menu.on_query_changed("al");

    assert!(!menu.receive_results(&first, three()));
    assert!(menu.candidates().is_empty());
    assert_eq!(menu.pending_search(), Some(&second));

    assert!(menu.receive_results(&second, vec![Candidate::mention("2", "Alan")]));
    assert_eq!(menu.candidates().len(), 1);
    assert!(menu.pending_search().is_none());

    menu.on_stopped();
    assert!(!menu.receive_results(&second, three()));
    assert!(menu.candidates().is_empty());
}

#[test]
fn click_matches_arrowing_and_enter() {
    let mut clicked = open_with(three());
    let mut keyed = open_with(three());

    keyed.handle_key(down());
    let by_key = keyed.handle_key(KeyPress::plain(Key::Enter));

    assert_eq!(clicked.click(1), by_key);
    assert_eq!(clicked.view().selected_index, 1);
    assert_eq!(clicked.click(9), MenuAction::Ignored);
}
