//! End-to-end scenarios for the dock registry: removal reselection,
//! region-driven splits, collapse policy, linked-item activation, and
//! cross-panel moves, exercised through the public API only.

use std::cell::RefCell;
use std::rc::Rc;

use tabdock_core::{
    AddItemOptions, Direction, DockState, ItemInit, MoveItemOptions, NodeKey, Panel, PanelInit,
    Region, TransactionError,
};

fn seeded(panel: &str, items: &[&str]) -> DockState {
    let mut state = DockState::new();
    let key = state
        .create_root_panel(PanelInit {
            key: Some(NodeKey::from(panel)),
            direction: None,
        })
        .expect("root panel");
    for item in items {
        let _ = state
            .create_item(&key, ItemInit::new(*item), AddItemOptions::default())
            .expect("seed item");
    }
    state
}

fn child_keys(panel: &Panel) -> Vec<String> {
    panel
        .ordered_children()
        .iter()
        .map(|assoc| assoc.key.to_string())
        .collect()
}

#[test]
fn removing_the_selected_middle_item_reselects_and_reindexes() {
    let mut state = seeded("p", &["a", "b", "c"]);
    state
        .select_item(&NodeKey::from("p"), &NodeKey::from("b"))
        .expect("select b");

    state
        .remove_item(&NodeKey::from("b"), Some(&NodeKey::from("p")))
        .expect("remove b");

    let panel = state.panel(&NodeKey::from("p")).expect("panel");
    let order: Vec<(String, u32)> = panel
        .ordered_children()
        .iter()
        .map(|assoc| (assoc.key.to_string(), assoc.index))
        .collect();
    assert_eq!(order, vec![("a".to_string(), 0), ("c".to_string(), 1)]);
    assert_eq!(panel.selected, Some(NodeKey::from("c")));
    state.validate().expect("registry stays valid");
}

#[test]
fn east_insert_splits_horizontally_and_keeps_existing_order() {
    let mut state = seeded("p", &["a", "b"]);
    let before: Vec<String> =
        child_keys(state.panel(&NodeKey::from("p")).expect("panel before split"));

    let outcome = state
        .create_item(
            &NodeKey::from("p"),
            ItemInit::new("d"),
            AddItemOptions {
                region: Region::East,
                ..AddItemOptions::default()
            },
        )
        .expect("east insert");
    assert!(outcome.created);

    let panel = state.panel(&NodeKey::from("p")).expect("panel");
    assert_eq!(panel.direction, Direction::Horizontal);
    assert!(panel.has_panel_children());

    let halves = panel.ordered_children();
    let first = state.panel(&halves[0].key).expect("first half");
    let second = state.panel(&halves[1].key).expect("second half");
    assert_eq!(child_keys(first), before, "existing order and indices survive");
    assert_eq!(child_keys(second), vec!["d"]);
    assert_eq!(second.selected, Some(NodeKey::from("d")));
    state.validate().expect("registry stays valid");
}

#[test]
fn emptying_a_nested_chain_collapses_it_away() {
    // root -> p1 -> p2 -> item x, built through one transaction.
    let mut state = DockState::new();
    let mut tx = state.transaction();
    let root = tx
        .add_root_panel(PanelInit {
            key: Some(NodeKey::from("root")),
            direction: None,
        })
        .expect("root");
    let p1 = tx
        .panel_mut(&root)
        .expect("root handle")
        .add_panel(PanelInit {
            key: Some(NodeKey::from("p1")),
            direction: None,
        })
        .expect("p1");
    let p2 = tx
        .panel_mut(&p1)
        .expect("p1 handle")
        .add_panel(PanelInit {
            key: Some(NodeKey::from("p2")),
            direction: None,
        })
        .expect("p2");
    let _ = tx
        .panel_mut(&p2)
        .expect("p2 handle")
        .add_item(ItemInit::new("x"), AddItemOptions::default())
        .expect("x");
    tx.commit().expect("commit");

    state
        .remove_item(&NodeKey::from("x"), None)
        .expect("remove x");

    // The whole chain emptied, so every panel collapsed away.
    assert!(state.panel(&NodeKey::from("p2")).is_none());
    assert!(state.panel(&NodeKey::from("p1")).is_none());
    assert!(state.panel(&NodeKey::from("root")).is_none());
    assert!(state.root_panels().is_empty());
    state.validate().expect("empty registry is valid");
}

#[test]
fn emptying_one_branch_flattens_the_surviving_sibling() {
    let mut state = seeded("p", &["x"]);
    let _ = state
        .create_item(
            &NodeKey::from("p"),
            ItemInit::new("y"),
            AddItemOptions {
                region: Region::East,
                ..AddItemOptions::default()
            },
        )
        .expect("split into two halves");

    state
        .remove_item(&NodeKey::from("x"), None)
        .expect("empty the first half");

    // The x half is deleted and the single surviving branch un-splits,
    // leaving p holding y directly.
    let panel = state.panel(&NodeKey::from("p")).expect("panel");
    assert!(panel.has_item_children());
    assert_eq!(child_keys(panel), vec!["y"]);
    assert_eq!(state.panels().count(), 1);
    state.validate().expect("registry stays valid");
}

#[test]
fn re_adding_a_linked_key_activates_without_duplicating() {
    let mut state = seeded("p", &["i1", "i2"]);

    let outcome = state
        .create_item(&NodeKey::from("p"), ItemInit::new("i1"), AddItemOptions::default())
        .expect("re-add i1");
    assert!(!outcome.created);

    let panel = state.panel(&NodeKey::from("p")).expect("panel");
    assert_eq!(
        panel
            .children
            .iter()
            .filter(|assoc| assoc.key == NodeKey::from("i1"))
            .count(),
        1
    );
    assert_eq!(panel.selected, Some(NodeKey::from("i1")));
}

#[test]
fn cross_panel_move_appends_at_next_index() {
    let mut state = seeded("p1", &["i1", "i2"]);
    let p2 = state
        .create_root_panel(PanelInit {
            key: Some(NodeKey::from("p2")),
            direction: None,
        })
        .expect("p2");
    let _ = state
        .create_item(&p2, ItemInit::new("x"), AddItemOptions::default())
        .expect("seed p2");

    state
        .move_item(
            &NodeKey::from("p1"),
            &NodeKey::from("p2"),
            &NodeKey::from("i1"),
            MoveItemOptions::default(),
        )
        .expect("move i1");

    assert_eq!(
        child_keys(state.panel(&NodeKey::from("p1")).expect("p1")),
        vec!["i2"]
    );
    assert_eq!(
        child_keys(state.panel(&NodeKey::from("p2")).expect("p2")),
        vec!["x", "i1"]
    );
}

#[test]
fn cross_panel_move_of_the_only_item_removes_the_source_panel() {
    let mut state = seeded("p1", &["i1"]);
    let _ = state
        .create_root_panel(PanelInit {
            key: Some(NodeKey::from("p2")),
            direction: None,
        })
        .expect("p2");

    state
        .move_item(
            &NodeKey::from("p1"),
            &NodeKey::from("p2"),
            &NodeKey::from("i1"),
            MoveItemOptions::default(),
        )
        .expect("move i1");

    assert!(state.panel(&NodeKey::from("p1")).is_none());
    assert_eq!(
        child_keys(state.panel(&NodeKey::from("p2")).expect("p2")),
        vec!["i1"]
    );
}

#[test]
fn snapshot_round_trip_preserves_structure() {
    let mut state = seeded("p", &["a", "b"]);
    let _ = state
        .create_item(
            &NodeKey::from("p"),
            ItemInit::new("c").label("C side"),
            AddItemOptions {
                region: Region::South,
                ..AddItemOptions::default()
            },
        )
        .expect("south insert");
    state.validate().expect("source registry valid");

    let json = serde_json::to_string(&state.to_snapshot()).expect("serialize");
    let snapshot = serde_json::from_str(&json).expect("deserialize");
    let reloaded = DockState::from_snapshot(snapshot).expect("reload");

    assert_eq!(reloaded.state_hash(), state.state_hash());
    assert_eq!(reloaded.to_snapshot(), state.to_snapshot());
    assert_eq!(
        reloaded.item(&NodeKey::from("c")).expect("item c").label,
        "C side"
    );
}

#[test]
fn empty_commit_still_fires_one_change_and_one_render() {
    let mut state = seeded("p", &["a"]);
    let log = Rc::new(RefCell::new(Vec::new()));
    let change = {
        let log = Rc::clone(&log);
        state.on_change(move |event| log.borrow_mut().push(("change", event.revision)))
    };
    let render = {
        let log = Rc::clone(&log);
        state.on_render(move |event| log.borrow_mut().push(("render", event.revision)))
    };

    let mut tx = state.transaction();
    tx.commit().expect("commit without mutations");

    let revision = state.revision();
    assert_eq!(
        *log.borrow(),
        vec![("change", revision), ("render", revision)]
    );
    drop((change, render));
}

#[test]
fn structural_violation_leaves_the_transaction_usable() {
    let mut state = seeded("p", &["a", "b"]);
    let mut tx = state.transaction();
    let _ = tx
        .panel_mut(&NodeKey::from("p"))
        .expect("panel")
        .add_item(
            ItemInit::new("z"),
            AddItemOptions {
                region: Region::East,
                ..AddItemOptions::default()
            },
        )
        .expect("east insert");

    let err = tx
        .panel_mut(&NodeKey::from("p"))
        .expect("panel")
        .add_item(ItemInit::new("w"), AddItemOptions::default())
        .expect_err("panel now holds panels");
    assert!(matches!(err, TransactionError::StructuralViolation { .. }));

    // The failed call mutated nothing; the earlier insert commits cleanly.
    tx.commit().expect("commit");
    assert!(state.item(&NodeKey::from("z")).is_some());
    assert!(state.item(&NodeKey::from("w")).is_none());
    state.validate().expect("registry stays valid");
}
