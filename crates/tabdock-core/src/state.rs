//! Canonical dock registry and structural validation.
//!
//! The registry is an arena: a key→node definition map plus a root-level
//! list of panel associations. Strict validation rejects malformed trees:
//!
//! - Association targets must exist and variant-match their record.
//! - Panel children are homogeneous (all panels or all items).
//! - Panels have exactly one parent and are reachable from the root list.
//! - Item definitions exist iff at least one association references them.
//! - Sibling indices are unique within one panel.

use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashSet;

use crate::events::DockObservers;
use crate::node::{AssociationRecord, Item, Node, NodeKey, NodeVariant, Panel};

/// Structural fault found in a registry or snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockModelError {
    UnsupportedSchemaVersion {
        version: u16,
    },
    DuplicateNodeKey {
        key: NodeKey,
    },
    RootAssociationNotPanel {
        key: NodeKey,
    },
    DanglingAssociation {
        parent: Option<NodeKey>,
        child: NodeKey,
    },
    AssociationVariantMismatch {
        parent: Option<NodeKey>,
        child: NodeKey,
        recorded: NodeVariant,
        actual: NodeVariant,
    },
    MixedChildren {
        panel: NodeKey,
    },
    DuplicateAssociation {
        parent: Option<NodeKey>,
        child: NodeKey,
    },
    DuplicateChildIndex {
        parent: Option<NodeKey>,
        index: u32,
    },
    MultipleParents {
        child: NodeKey,
    },
    SelectedNotChild {
        panel: NodeKey,
        selected: NodeKey,
    },
    OrphanDefinition {
        key: NodeKey,
        variant: NodeVariant,
    },
}

impl fmt::Display for DockModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn parent_label(parent: &Option<NodeKey>) -> &str {
            parent.as_ref().map_or("<root>", NodeKey::as_str)
        }

        match self {
            Self::UnsupportedSchemaVersion { version } => {
                write!(f, "unsupported dock schema version {version}")
            }
            Self::DuplicateNodeKey { key } => {
                write!(f, "duplicate node key {key}")
            }
            Self::RootAssociationNotPanel { key } => {
                write!(f, "root association {key} is not a panel")
            }
            Self::DanglingAssociation { parent, child } => {
                write!(
                    f,
                    "association {} -> {child} references a missing definition",
                    parent_label(parent)
                )
            }
            Self::AssociationVariantMismatch {
                parent,
                child,
                recorded,
                actual,
            } => write!(
                f,
                "association {} -> {child} records variant {recorded} but the definition is {actual}",
                parent_label(parent)
            ),
            Self::MixedChildren { panel } => {
                write!(f, "panel {panel} mixes item and panel children")
            }
            Self::DuplicateAssociation { parent, child } => {
                write!(
                    f,
                    "panel {} references child {child} more than once",
                    parent_label(parent)
                )
            }
            Self::DuplicateChildIndex { parent, index } => {
                write!(
                    f,
                    "panel {} has two children at sibling index {index}",
                    parent_label(parent)
                )
            }
            Self::MultipleParents { child } => {
                write!(f, "panel {child} is referenced by more than one parent")
            }
            Self::SelectedNotChild { panel, selected } => {
                write!(
                    f,
                    "panel {panel} selects {selected}, which is not one of its item children"
                )
            }
            Self::OrphanDefinition { key, variant } => {
                write!(f, "{variant} definition {key} is referenced by no association")
            }
        }
    }
}

impl std::error::Error for DockModelError {}

/// Pure registry content, shared between the canonical state and the
/// working copy inside a transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StateData {
    pub(crate) definitions: BTreeMap<NodeKey, Node>,
    pub(crate) roots: Vec<AssociationRecord>,
    pub(crate) current_panel: Option<NodeKey>,
}

impl StateData {
    pub(crate) fn panel(&self, key: &NodeKey) -> Option<&Panel> {
        self.definitions.get(key).and_then(Node::as_panel)
    }

    pub(crate) fn panel_mut(&mut self, key: &NodeKey) -> Option<&mut Panel> {
        match self.definitions.get_mut(key) {
            Some(Node::Panel(panel)) => Some(panel),
            _ => None,
        }
    }

    pub(crate) fn item(&self, key: &NodeKey) -> Option<&Item> {
        self.definitions.get(key).and_then(Node::as_item)
    }

    pub(crate) fn item_mut(&mut self, key: &NodeKey) -> Option<&mut Item> {
        match self.definitions.get_mut(key) {
            Some(Node::Item(item)) => Some(item),
            _ => None,
        }
    }

    /// Panel that owns an association for `child`, if any. Root-level
    /// associations have no parent.
    pub(crate) fn parent_of(&self, child: &NodeKey) -> Option<NodeKey> {
        self.definitions.values().find_map(|node| match node {
            Node::Panel(panel) if panel.child(child).is_some() => Some(panel.key.clone()),
            _ => None,
        })
    }

    /// Number of associations anywhere (root list included) referencing `key`.
    pub(crate) fn reference_count(&self, key: &NodeKey) -> usize {
        let in_roots = self.roots.iter().filter(|assoc| assoc.key == *key).count();
        let in_panels = self
            .definitions
            .values()
            .filter_map(Node::as_panel)
            .flat_map(|panel| panel.children.iter())
            .filter(|assoc| assoc.key == *key)
            .count();
        in_roots + in_panels
    }

    /// Deterministically allocate an unused panel key.
    pub(crate) fn allocate_panel_key(&self) -> NodeKey {
        let mut counter = 1u64;
        loop {
            let candidate = format!("panel-{counter}");
            if !self.definitions.contains_key(candidate.as_str()) {
                return NodeKey::new(candidate);
            }
            counter += 1;
        }
    }

    /// Root panel keys in sibling index order.
    pub(crate) fn root_keys(&self) -> Vec<&NodeKey> {
        let mut ordered: Vec<&AssociationRecord> = self.roots.iter().collect();
        ordered.sort_by_key(|assoc| assoc.index);
        ordered.iter().map(|assoc| &assoc.key).collect()
    }

    /// Validate all structural invariants.
    pub(crate) fn validate(&self) -> Result<(), DockModelError> {
        validate_children(None, &self.roots)?;
        for assoc in &self.roots {
            if assoc.variant != NodeVariant::Panel {
                return Err(DockModelError::RootAssociationNotPanel {
                    key: assoc.key.clone(),
                });
            }
        }

        let mut panel_parents: BTreeMap<&NodeKey, Option<&NodeKey>> = BTreeMap::new();
        let mut referenced_items: FxHashSet<&NodeKey> = FxHashSet::default();

        for assoc in &self.roots {
            check_association(self, None, assoc)?;
            if panel_parents.insert(&assoc.key, None).is_some() {
                return Err(DockModelError::MultipleParents {
                    child: assoc.key.clone(),
                });
            }
        }

        for node in self.definitions.values() {
            let Node::Panel(panel) = node else { continue };
            validate_children(Some(&panel.key), &panel.children)?;

            if panel.has_item_children() && panel.has_panel_children() {
                return Err(DockModelError::MixedChildren {
                    panel: panel.key.clone(),
                });
            }

            for assoc in &panel.children {
                check_association(self, Some(&panel.key), assoc)?;
                match assoc.variant {
                    NodeVariant::Panel => {
                        if panel_parents.insert(&assoc.key, Some(&panel.key)).is_some() {
                            return Err(DockModelError::MultipleParents {
                                child: assoc.key.clone(),
                            });
                        }
                    }
                    NodeVariant::Item => {
                        let _ = referenced_items.insert(&assoc.key);
                    }
                }
            }

            if let Some(selected) = &panel.selected {
                let selects_item_child = panel
                    .children
                    .iter()
                    .any(|assoc| assoc.variant == NodeVariant::Item && assoc.key == *selected);
                if !selects_item_child {
                    return Err(DockModelError::SelectedNotChild {
                        panel: panel.key.clone(),
                        selected: selected.clone(),
                    });
                }
            }
        }

        // Reachability: every panel definition must be visited from the root
        // list; with the single-parent check above this also excludes cycles.
        let mut visited: FxHashSet<&NodeKey> = FxHashSet::default();
        let mut stack: Vec<&NodeKey> = self.roots.iter().map(|assoc| &assoc.key).collect();
        while let Some(key) = stack.pop() {
            if !visited.insert(key) {
                continue;
            }
            if let Some(panel) = self.panel(key) {
                for assoc in &panel.children {
                    if assoc.variant == NodeVariant::Panel {
                        stack.push(&assoc.key);
                    }
                }
            }
        }

        for node in self.definitions.values() {
            match node {
                Node::Panel(panel) => {
                    if !visited.contains(&panel.key) {
                        return Err(DockModelError::OrphanDefinition {
                            key: panel.key.clone(),
                            variant: NodeVariant::Panel,
                        });
                    }
                }
                Node::Item(item) => {
                    if !referenced_items.contains(&item.key) {
                        return Err(DockModelError::OrphanDefinition {
                            key: item.key.clone(),
                            variant: NodeVariant::Item,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Deterministic FNV-style hash over the full registry content.
    pub(crate) fn state_hash(&self) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0001_0000_01b3;

        fn mix(hash: &mut u64, byte: u8) {
            *hash ^= u64::from(byte);
            *hash = hash.wrapping_mul(PRIME);
        }

        fn mix_bytes(hash: &mut u64, bytes: &[u8]) {
            for byte in bytes {
                mix(hash, *byte);
            }
        }

        fn mix_u32(hash: &mut u64, value: u32) {
            mix_bytes(hash, &value.to_le_bytes());
        }

        fn mix_u64(hash: &mut u64, value: u64) {
            mix_bytes(hash, &value.to_le_bytes());
        }

        fn mix_bool(hash: &mut u64, value: bool) {
            mix(hash, u8::from(value));
        }

        fn mix_str(hash: &mut u64, value: &str) {
            mix_u64(hash, value.len() as u64);
            mix_bytes(hash, value.as_bytes());
        }

        fn mix_opt_str(hash: &mut u64, value: Option<&str>) {
            match value {
                Some(value) => {
                    mix(hash, 1);
                    mix_str(hash, value);
                }
                None => mix(hash, 0),
            }
        }

        fn mix_assoc(hash: &mut u64, assoc: &AssociationRecord) {
            mix(
                hash,
                match assoc.variant {
                    NodeVariant::Panel => 1,
                    NodeVariant::Item => 2,
                },
            );
            mix_str(hash, assoc.key.as_str());
            mix_u32(hash, assoc.index);
            mix_bool(hash, assoc.pinned);
        }

        let mut hash = OFFSET_BASIS;
        mix_u64(&mut hash, self.definitions.len() as u64);
        for node in self.definitions.values() {
            match node {
                Node::Panel(panel) => {
                    mix(&mut hash, 1);
                    mix_str(&mut hash, panel.key.as_str());
                    mix(
                        &mut hash,
                        match panel.direction {
                            crate::node::Direction::Horizontal => 1,
                            crate::node::Direction::Vertical => 2,
                        },
                    );
                    mix_opt_str(&mut hash, panel.selected.as_ref().map(NodeKey::as_str));
                    mix(
                        &mut hash,
                        match panel.state {
                            crate::node::PanelState::Idle => 1,
                            crate::node::PanelState::Busy => 2,
                        },
                    );
                    mix_u64(&mut hash, panel.children.len() as u64);
                    for assoc in &panel.children {
                        mix_assoc(&mut hash, assoc);
                    }
                }
                Node::Item(item) => {
                    mix(&mut hash, 2);
                    mix_str(&mut hash, item.key.as_str());
                    mix_str(&mut hash, &item.label);
                    mix_u64(&mut hash, item.custom.len() as u64);
                    for (key, value) in &item.custom {
                        mix_str(&mut hash, key);
                        mix_str(&mut hash, value);
                    }
                    mix_opt_str(&mut hash, item.icon.as_deref());
                    mix_bool(&mut hash, item.loading);
                    mix_bool(&mut hash, item.is_dirty);
                }
            }
        }
        mix_u64(&mut hash, self.roots.len() as u64);
        for assoc in &self.roots {
            mix_assoc(&mut hash, assoc);
        }
        mix_opt_str(&mut hash, self.current_panel.as_ref().map(NodeKey::as_str));
        hash
    }
}

fn validate_children(
    parent: Option<&NodeKey>,
    children: &[AssociationRecord],
) -> Result<(), DockModelError> {
    let mut seen_keys: FxHashSet<&NodeKey> = FxHashSet::default();
    let mut seen_indices: FxHashSet<u32> = FxHashSet::default();
    for assoc in children {
        if !seen_keys.insert(&assoc.key) {
            return Err(DockModelError::DuplicateAssociation {
                parent: parent.cloned(),
                child: assoc.key.clone(),
            });
        }
        if !seen_indices.insert(assoc.index) {
            return Err(DockModelError::DuplicateChildIndex {
                parent: parent.cloned(),
                index: assoc.index,
            });
        }
    }
    Ok(())
}

fn check_association(
    data: &StateData,
    parent: Option<&NodeKey>,
    assoc: &AssociationRecord,
) -> Result<(), DockModelError> {
    let Some(node) = data.definitions.get(&assoc.key) else {
        return Err(DockModelError::DanglingAssociation {
            parent: parent.cloned(),
            child: assoc.key.clone(),
        });
    };
    if node.variant() != assoc.variant {
        return Err(DockModelError::AssociationVariantMismatch {
            parent: parent.cloned(),
            child: assoc.key.clone(),
            recorded: assoc.variant,
            actual: node.variant(),
        });
    }
    Ok(())
}

/// The canonical dock registry: key→node definitions, root-level panel
/// list, last-active-panel pointer, and the observer surface.
///
/// All mutation goes through [`crate::Transaction`]; the registry itself
/// only exposes read contracts and subscription.
#[derive(Debug)]
pub struct DockState {
    pub(crate) data: StateData,
    pub(crate) revision: u64,
    pub(crate) observers: DockObservers,
}

impl Default for DockState {
    fn default() -> Self {
        Self::new()
    }
}

impl DockState {
    /// Empty registry: no definitions, no root panels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: StateData::default(),
            revision: 0,
            observers: DockObservers::default(),
        }
    }

    /// Typed panel lookup; `None` on absent key or variant mismatch.
    #[must_use]
    pub fn panel(&self, key: &NodeKey) -> Option<&Panel> {
        self.data.panel(key)
    }

    /// Typed item lookup; `None` on absent key or variant mismatch.
    #[must_use]
    pub fn item(&self, key: &NodeKey) -> Option<&Item> {
        self.data.item(key)
    }

    /// True if any definition uses `key`.
    #[must_use]
    pub fn contains(&self, key: &NodeKey) -> bool {
        self.data.definitions.contains_key(key)
    }

    /// Root-level panel associations in storage order.
    #[must_use]
    pub fn root_panels(&self) -> &[AssociationRecord] {
        &self.data.roots
    }

    /// Key of the last active panel, unresolved.
    #[must_use]
    pub fn current_panel_key(&self) -> Option<&NodeKey> {
        self.data.current_panel.as_ref()
    }

    /// Panel that owns an association for `child`, if any.
    #[must_use]
    pub fn parent_of(&self, child: &NodeKey) -> Option<NodeKey> {
        self.data.parent_of(child)
    }

    /// Lazy depth-first pre-order traversal over all panels, restartable by
    /// calling again.
    #[must_use]
    pub fn panels(&self) -> Panels<'_> {
        Panels::from_roots(&self.data)
    }

    /// Depth-first pre-order panel traversal rooted at `panel`.
    #[must_use]
    pub fn panels_under(&self, panel: &NodeKey) -> Panels<'_> {
        Panels::from_panel(&self.data, panel)
    }

    /// Lazy depth-first pre-order traversal over displayed items.
    ///
    /// An item linked into several panels is yielded once per association.
    #[must_use]
    pub fn items(&self) -> Items<'_> {
        Items::new(self.panels())
    }

    /// Item traversal rooted at `panel`.
    #[must_use]
    pub fn items_under(&self, panel: &NodeKey) -> Items<'_> {
        Items::new(self.panels_under(panel))
    }

    /// True iff no panel in the tree carries item children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.panels().any(Panel::has_item_children)
    }

    /// Resolve the panel mutations should target when none is specified.
    ///
    /// The last active panel wins if it still resolves; otherwise the first
    /// panel in traversal order that already has items or cannot hold
    /// panels; `None` when the tree has no panels.
    #[must_use]
    pub fn active_panel(&self) -> Option<&Panel> {
        if let Some(current) = &self.data.current_panel
            && let Some(panel) = self.data.panel(current)
        {
            return Some(panel);
        }
        self.panels()
            .find(|panel| panel.has_item_children() || !panel.has_panel_children())
    }

    /// Monotonic commit counter; bumped once per committed transaction.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Deterministic structural hash for diagnostics and replay checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.data.state_hash()
    }

    /// Validate all structural invariants of the current content.
    pub fn validate(&self) -> Result<(), DockModelError> {
        self.data.validate()
    }

    /// Subscribe to `change` notifications (content replaced; persist).
    pub fn on_change(
        &self,
        callback: impl Fn(&crate::events::ChangeEvent) + 'static,
    ) -> crate::events::Subscription {
        self.observers.on_change(callback)
    }

    /// Subscribe to `render` notifications (content replaced; redraw).
    pub fn on_render(
        &self,
        callback: impl Fn(&crate::events::RenderEvent) + 'static,
    ) -> crate::events::Subscription {
        self.observers.on_render(callback)
    }

    /// Subscribe to cancelable `created` notifications.
    pub fn on_created(
        &self,
        callback: impl Fn(&mut crate::events::ItemCreated) + 'static,
    ) -> crate::events::Subscription {
        self.observers.on_created(callback)
    }
}

/// Depth-first pre-order panel traversal.
pub struct Panels<'a> {
    data: &'a StateData,
    stack: Vec<&'a NodeKey>,
}

impl<'a> Panels<'a> {
    fn from_roots(data: &'a StateData) -> Self {
        let mut stack = data.root_keys();
        stack.reverse();
        Self { data, stack }
    }

    fn from_panel(data: &'a StateData, panel: &NodeKey) -> Self {
        let stack = match data.definitions.get(panel) {
            Some(Node::Panel(panel)) => vec![&panel.key],
            _ => Vec::new(),
        };
        Self { data, stack }
    }
}

impl<'a> Iterator for Panels<'a> {
    type Item = &'a Panel;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = self.stack.pop()?;
            let Some(panel) = self.data.panel(key) else {
                continue;
            };
            let mut child_panels: Vec<&AssociationRecord> = panel
                .children
                .iter()
                .filter(|assoc| assoc.variant == NodeVariant::Panel)
                .collect();
            child_panels.sort_by_key(|assoc| assoc.index);
            for assoc in child_panels.iter().rev() {
                self.stack.push(&assoc.key);
            }
            return Some(panel);
        }
    }
}

/// Depth-first pre-order item traversal, yielding one entry per
/// association.
pub struct Items<'a> {
    panels: Panels<'a>,
    pending: Vec<&'a Item>,
}

impl<'a> Items<'a> {
    fn new(panels: Panels<'a>) -> Self {
        Self {
            panels,
            pending: Vec::new(),
        }
    }
}

impl<'a> Iterator for Items<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop() {
                return Some(item);
            }
            let panel = self.panels.next()?;
            let data = self.panels.data;
            let mut items: Vec<(&AssociationRecord, &'a Item)> = panel
                .children
                .iter()
                .filter(|assoc| assoc.variant == NodeVariant::Item)
                .filter_map(|assoc| data.item(&assoc.key).map(|item| (assoc, item)))
                .collect();
            items.sort_by_key(|(assoc, _)| assoc.index);
            // Reversed so pop() yields in index order.
            self.pending = items.into_iter().rev().map(|(_, item)| item).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Direction, Node};

    fn two_panel_data() -> StateData {
        let mut data = StateData::default();

        let mut left = Panel::new("left");
        left.children = vec![
            AssociationRecord::item(NodeKey::from("a"), 0),
            AssociationRecord::item(NodeKey::from("b"), 1),
        ];
        left.selected = Some(NodeKey::from("b"));

        let mut right = Panel::new("right");
        right.children = vec![AssociationRecord::item(NodeKey::from("c"), 0)];

        let mut root = Panel::new("root");
        root.direction = Direction::Horizontal;
        root.children = vec![
            AssociationRecord::panel(NodeKey::from("left"), 0),
            AssociationRecord::panel(NodeKey::from("right"), 1),
        ];

        for node in [
            Node::Panel(root),
            Node::Panel(left),
            Node::Panel(right),
            Node::Item(Item::new("a")),
            Node::Item(Item::new("b")),
            Node::Item(Item::new("c")),
        ] {
            let _ = data.definitions.insert(node.key().clone(), node);
        }
        data.roots = vec![AssociationRecord::panel(NodeKey::from("root"), 0)];
        data
    }

    fn state_of(data: StateData) -> DockState {
        DockState {
            data,
            revision: 0,
            observers: DockObservers::default(),
        }
    }

    #[test]
    fn valid_fixture_passes_validation() {
        two_panel_data().validate().expect("fixture should be valid");
    }

    #[test]
    fn panels_iterate_depth_first_pre_order() {
        let state = state_of(two_panel_data());
        let order: Vec<&str> = state.panels().map(|panel| panel.key.as_str()).collect();
        assert_eq!(order, vec!["root", "left", "right"]);

        // Restartable: a second call starts over.
        let again: Vec<&str> = state.panels().map(|panel| panel.key.as_str()).collect();
        assert_eq!(again, order);
    }

    #[test]
    fn items_follow_association_index_order() {
        let state = state_of(two_panel_data());
        let order: Vec<&str> = state.items().map(|item| item.key.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn panels_under_iterates_only_the_subtree() {
        let state = state_of(two_panel_data());
        let full: Vec<&str> = state
            .panels_under(&NodeKey::from("root"))
            .map(|panel| panel.key.as_str())
            .collect();
        assert_eq!(full, vec!["root", "left", "right"]);

        let subtree: Vec<&str> = state
            .panels_under(&NodeKey::from("left"))
            .map(|panel| panel.key.as_str())
            .collect();
        assert_eq!(subtree, vec!["left"]);
    }

    #[test]
    fn items_under_follow_subtree_association_order() {
        let state = state_of(two_panel_data());
        let order: Vec<&str> = state
            .items_under(&NodeKey::from("left"))
            .map(|item| item.key.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b"]);

        let order: Vec<&str> = state
            .items_under(&NodeKey::from("right"))
            .map(|item| item.key.as_str())
            .collect();
        assert_eq!(order, vec!["c"]);
    }

    #[test]
    fn subtree_traversal_from_a_non_panel_key_is_empty() {
        let state = state_of(two_panel_data());
        assert_eq!(state.panels_under(&NodeKey::from("a")).count(), 0);
        assert_eq!(state.panels_under(&NodeKey::from("ghost")).count(), 0);
        assert_eq!(state.items_under(&NodeKey::from("a")).count(), 0);
    }

    #[test]
    fn active_panel_prefers_resolvable_current_panel() {
        let mut data = two_panel_data();
        data.current_panel = Some(NodeKey::from("right"));
        let state = state_of(data);
        assert_eq!(state.active_panel().map(|p| p.key.as_str()), Some("right"));
    }

    #[test]
    fn active_panel_falls_back_to_first_item_holding_panel() {
        let mut data = two_panel_data();
        data.current_panel = Some(NodeKey::from("gone"));
        let state = state_of(data);
        assert_eq!(state.active_panel().map(|p| p.key.as_str()), Some("left"));
    }

    #[test]
    fn active_panel_is_none_without_panels() {
        let state = state_of(StateData::default());
        assert!(state.active_panel().is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn mixed_children_are_rejected() {
        let mut data = two_panel_data();
        if let Some(Node::Panel(root)) = data.definitions.get_mut("root") {
            root.children.push(AssociationRecord::item(NodeKey::from("a"), 2));
        }
        let err = data.validate().expect_err("mixed children should fail");
        assert_eq!(
            err,
            DockModelError::MixedChildren {
                panel: NodeKey::from("root"),
            }
        );
    }

    #[test]
    fn dangling_association_is_rejected() {
        let mut data = two_panel_data();
        if let Some(Node::Panel(left)) = data.definitions.get_mut("left") {
            left.children.push(AssociationRecord::item(NodeKey::from("ghost"), 2));
        }
        let err = data.validate().expect_err("dangling child should fail");
        assert_eq!(
            err,
            DockModelError::DanglingAssociation {
                parent: Some(NodeKey::from("left")),
                child: NodeKey::from("ghost"),
            }
        );
    }

    #[test]
    fn orphan_item_definition_is_rejected() {
        let mut data = two_panel_data();
        let _ = data
            .definitions
            .insert(NodeKey::from("lonely"), Node::Item(Item::new("lonely")));
        let err = data.validate().expect_err("orphan item should fail");
        assert_eq!(
            err,
            DockModelError::OrphanDefinition {
                key: NodeKey::from("lonely"),
                variant: NodeVariant::Item,
            }
        );
    }

    #[test]
    fn multi_parent_panel_is_rejected() {
        let mut data = two_panel_data();
        if let Some(Node::Panel(left)) = data.definitions.get_mut("left") {
            left.children = vec![AssociationRecord::panel(NodeKey::from("right"), 0)];
            left.selected = None;
        }
        let err = data.validate().expect_err("multi-parent should fail");
        assert_eq!(
            err,
            DockModelError::MultipleParents {
                child: NodeKey::from("right"),
            }
        );
    }

    #[test]
    fn selected_must_be_an_item_child() {
        let mut data = two_panel_data();
        if let Some(Node::Panel(left)) = data.definitions.get_mut("left") {
            left.selected = Some(NodeKey::from("c"));
        }
        let err = data.validate().expect_err("foreign selection should fail");
        assert_eq!(
            err,
            DockModelError::SelectedNotChild {
                panel: NodeKey::from("left"),
                selected: NodeKey::from("c"),
            }
        );
    }

    #[test]
    fn duplicate_sibling_index_is_rejected() {
        let mut data = two_panel_data();
        if let Some(Node::Panel(left)) = data.definitions.get_mut("left") {
            left.child_mut(&NodeKey::from("b")).expect("b exists").index = 0;
        }
        let err = data.validate().expect_err("duplicate index should fail");
        assert_eq!(
            err,
            DockModelError::DuplicateChildIndex {
                parent: Some(NodeKey::from("left")),
                index: 0,
            }
        );
    }

    #[test]
    fn allocated_panel_keys_skip_existing_definitions() {
        let mut data = StateData::default();
        let _ = data.definitions.insert(
            NodeKey::from("panel-1"),
            Node::Panel(Panel::new("panel-1")),
        );
        assert_eq!(data.allocate_panel_key(), NodeKey::from("panel-2"));
    }

    #[test]
    fn state_hash_tracks_content_changes() {
        let data = two_panel_data();
        let base = data.state_hash();
        assert_eq!(base, two_panel_data().state_hash());

        let mut changed = two_panel_data();
        changed.current_panel = Some(NodeKey::from("left"));
        assert_ne!(base, changed.state_hash());
    }
}
