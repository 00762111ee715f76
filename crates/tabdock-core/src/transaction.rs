//! Transactional mutation engine for the dock registry.
//!
//! A [`Transaction`] stages mutations on a working copy taken from the
//! registry via a serialization round trip. Mutation primitives live on
//! transaction-scoped [`PanelMut`]/[`ItemMut`] handles; plain [`Panel`] and
//! [`Item`] values outside a transaction are read-only.
//!
//! Every primitive is internally atomic: it runs against a clone of the
//! working copy, the result is validated against all structural invariants,
//! and only then replaces the working copy. A failed call leaves the
//! transaction open and untouched. A sequence of primitives is *not*
//! auto-rolled-back on a later failure; callers discard the transaction or
//! call [`Transaction::reset`].
//!
//! [`Transaction::commit`] publishes the working copy atomically: the
//! registry content is replaced wholesale, then one `change` and one
//! `render` notification fire, in that order.

use std::fmt;

use crate::events::{ChangeEvent, CreateReason, DockObservers, ItemCreated, RenderEvent};
use crate::node::{
    AssociationRecord, Direction, Item, ItemInit, ItemPatch, Node, NodeKey, NodeVariant, Panel,
    Region,
};
use crate::state::{DockModelError, DockState, StateData};

/// Precondition failure surfaced by a mutation primitive or by commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Inserting an item into a panel that holds panels, or a panel into
    /// one that holds items, or otherwise breaking the child-mode rules.
    StructuralViolation {
        panel: NodeKey,
        detail: &'static str,
    },
    /// Operating on a key absent from the working registry.
    ReferenceNotFound { key: NodeKey },
    /// Committing a transaction whose status is already done.
    InvalidRepeatCommit,
    /// Internal consistency guard: a primitive produced a working copy that
    /// failed structural validation. Indicates a bug in the engine.
    Validation(DockModelError),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StructuralViolation { panel, detail } => {
                write!(f, "structural violation on panel {panel}: {detail}")
            }
            Self::ReferenceNotFound { key } => {
                write!(f, "no node {key} in the working registry")
            }
            Self::InvalidRepeatCommit => {
                write!(f, "transaction was already committed")
            }
            Self::Validation(err) => write!(f, "post-mutation validation failed: {err}"),
        }
    }
}

impl std::error::Error for TransactionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Validation(err) = self {
            return Some(err);
        }
        None
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Running,
    Done,
}

/// Which of the two sub-panels created by a split keeps the existing
/// children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitHalf {
    First,
    Second,
}

/// Sibling subset addressed by [`PanelMut::close_relative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDirection {
    Left,
    Right,
    Both,
}

/// The three mutually exclusive move modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveTarget {
    /// Relocate to an explicit sibling index, shifting colliders up.
    Index(u32),
    /// Split-driven relocation into a directional region.
    Region(Region),
    /// Close the vacated gap, then append via the next-index algorithm.
    #[default]
    End,
}

/// Options for [`PanelMut::add_item`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddItemOptions {
    pub region: Region,
    /// Explicit insertion index; wins over the initializer's hint.
    pub index: Option<u32>,
    pub reason: CreateReason,
}

/// Result of one [`PanelMut::add_item`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItemOutcome {
    pub key: NodeKey,
    /// True if a brand-new item definition was registered.
    pub created: bool,
    /// True if an observer canceled the `created` notification. The
    /// definition exists in the working copy regardless; the caller decides
    /// how to unwind the triggering gesture.
    pub canceled: bool,
}

/// Options for cross-panel item moves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveItemOptions {
    pub index: Option<u32>,
    pub region: Region,
}

/// Result of one [`ItemMut::move_to`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveToOutcome {
    /// True if the source panel became childless and was removed.
    pub source_removed: bool,
    /// Parent of the source panel at the time of removal, if any.
    pub source_parent: Option<NodeKey>,
}

/// Initializer for panel creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelInit {
    /// Explicit key; allocated deterministically when omitted.
    pub key: Option<NodeKey>,
    pub direction: Option<Direction>,
}

/// An isolated working copy of the registry plus mutation primitives.
///
/// Obtained from [`DockState::transaction`]; the exclusive registry borrow
/// enforces the single-caller model. Publishing happens via [`commit`];
/// dropping an uncommitted transaction has zero effect on the registry.
///
/// [`commit`]: Transaction::commit
#[derive(Debug)]
pub struct Transaction<'a> {
    registry: &'a mut DockState,
    working: StateData,
    status: TransactionStatus,
    observers: DockObservers,
}

impl DockState {
    /// Open a transaction over a structural snapshot of this registry.
    #[must_use]
    pub fn transaction(&mut self) -> Transaction<'_> {
        let working = round_trip_copy(&self.data);
        let observers = self.observers.clone();
        Transaction {
            registry: self,
            working,
            status: TransactionStatus::Running,
            observers,
        }
    }
}

/// Structural snapshot of the registry content, taken the same way the
/// persistence boundary would: out through the snapshot form and back.
fn round_trip_copy(data: &StateData) -> StateData {
    let snapshot = data.to_snapshot();
    let mut definitions = std::collections::BTreeMap::new();
    for node in snapshot.definitions {
        let _ = definitions.insert(node.key().clone(), node);
    }
    StateData {
        definitions,
        roots: snapshot.items,
        current_panel: snapshot.current_panel,
    }
}

impl<'a> Transaction<'a> {
    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Read a panel from the working copy.
    #[must_use]
    pub fn panel(&self, key: &NodeKey) -> Option<&Panel> {
        self.working.panel(key)
    }

    /// Read an item from the working copy.
    #[must_use]
    pub fn item(&self, key: &NodeKey) -> Option<&Item> {
        self.working.item(key)
    }

    /// True if the working copy defines `key`.
    #[must_use]
    pub fn contains(&self, key: &NodeKey) -> bool {
        self.working.definitions.contains_key(key)
    }

    /// Panels of the working copy holding an association for `item`.
    #[must_use]
    pub fn item_parents(&self, item: &NodeKey) -> Vec<NodeKey> {
        parents_of_item(&self.working, item)
    }

    /// Transaction-scoped mutable handle for a panel.
    pub fn panel_mut<'t>(&'t mut self, key: &NodeKey) -> Result<PanelMut<'t, 'a>, TransactionError> {
        if self.working.panel(key).is_none() {
            return Err(TransactionError::ReferenceNotFound { key: key.clone() });
        }
        Ok(PanelMut {
            tx: self,
            key: key.clone(),
        })
    }

    /// Transaction-scoped mutable handle for an item.
    pub fn item_mut<'t>(&'t mut self, key: &NodeKey) -> Result<ItemMut<'t, 'a>, TransactionError> {
        if self.working.item(key).is_none() {
            return Err(TransactionError::ReferenceNotFound { key: key.clone() });
        }
        Ok(ItemMut {
            tx: self,
            key: key.clone(),
        })
    }

    /// Create a top-level panel and append it to the root list.
    pub fn add_root_panel(&mut self, init: PanelInit) -> Result<NodeKey, TransactionError> {
        self.apply(move |data, _| {
            let key = init
                .key
                .clone()
                .unwrap_or_else(|| data.allocate_panel_key());
            if data.definitions.contains_key(&key) {
                return Err(TransactionError::StructuralViolation {
                    panel: key,
                    detail: "key is already defined",
                });
            }
            let mut panel = Panel::new(key.clone());
            if let Some(direction) = init.direction {
                panel.direction = direction;
            }
            let _ = data.definitions.insert(key.clone(), Node::Panel(panel));
            let mut index = 0u32;
            while data.roots.iter().any(|assoc| assoc.index == index) {
                index += 1;
            }
            data.roots.push(AssociationRecord::panel(key.clone(), index));
            tracing::trace!(key = %key, index, "add_root_panel");
            Ok(key)
        })
    }

    /// Point the registry's last-active-panel marker at `key`.
    pub fn set_current_panel(&mut self, key: &NodeKey) -> Result<(), TransactionError> {
        let key = key.clone();
        self.apply(move |data, _| {
            if data.panel(&key).is_none() {
                return Err(TransactionError::ReferenceNotFound { key });
            }
            data.current_panel = Some(key);
            Ok(())
        })
    }

    /// Apply the collapse policy upward from `panel`: childless panels are
    /// removed, panels left with exactly one child-panel branch are
    /// flattened, and the check repeats at each parent until an ancestor
    /// keeps more than one child or the root list is reached.
    pub fn collapse_upward(&mut self, panel: &NodeKey) -> Result<(), TransactionError> {
        let panel = panel.clone();
        self.apply(move |data, _| collapse_upward_in(data, panel))
    }

    /// Publish the working copy: replace the registry content wholesale,
    /// bump the revision, fire one `change` then one `render` notification,
    /// and mark the transaction done. At most one commit per transaction.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        if self.status == TransactionStatus::Done {
            return Err(TransactionError::InvalidRepeatCommit);
        }
        self.registry.data = std::mem::take(&mut self.working);
        self.registry.revision += 1;
        let revision = self.registry.revision;
        tracing::debug!(
            revision,
            definitions = self.registry.data.definitions.len(),
            roots = self.registry.data.roots.len(),
            "transaction committed"
        );
        self.status = TransactionStatus::Done;
        self.observers.notify_change(&ChangeEvent { revision });
        self.observers.notify_render(&RenderEvent { revision });
        Ok(())
    }

    /// Discard the working copy and start from a fresh empty one. The
    /// transaction status is untouched.
    pub fn reset(&mut self) {
        self.working = StateData::default();
    }

    /// Run one primitive atomically: mutate a clone of the working copy,
    /// validate it, and only then swap it in.
    fn apply<T>(
        &mut self,
        f: impl FnOnce(&mut StateData, &DockObservers) -> Result<T, TransactionError>,
    ) -> Result<T, TransactionError> {
        let mut staged = self.working.clone();
        let out = f(&mut staged, &self.observers)?;
        staged.validate().map_err(TransactionError::Validation)?;
        self.working = staged;
        Ok(out)
    }
}

/// Transaction-scoped mutable panel handle.
#[derive(Debug)]
pub struct PanelMut<'t, 'a> {
    tx: &'t mut Transaction<'a>,
    key: NodeKey,
}

impl PanelMut<'_, '_> {
    /// Key of the wrapped panel.
    #[must_use]
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// Insert or activate an item on this panel.
    ///
    /// Center region on an already-linked key activates it; an edge region
    /// on a non-empty panel splits first and inserts into the empty half;
    /// otherwise the item lands at the explicit index, the initializer's
    /// hint, or the next free index. Brand-new definitions fire a
    /// cancelable `created` notification before this returns.
    pub fn add_item(
        &mut self,
        init: ItemInit,
        opts: AddItemOptions,
    ) -> Result<AddItemOutcome, TransactionError> {
        let key = self.key.clone();
        self.tx
            .apply(move |data, observers| add_item_in(data, observers, &key, &init, &opts))
    }

    /// Append a new empty child panel. Fails on item-holding panels.
    pub fn add_panel(&mut self, init: PanelInit) -> Result<NodeKey, TransactionError> {
        let key = self.key.clone();
        self.tx.apply(move |data, _| add_panel_in(data, &key, init))
    }

    /// Remove this panel's association for `item`, reselecting and garbage
    /// collecting the definition when its last association disappears.
    pub fn remove_item(&mut self, item: &NodeKey) -> Result<(), TransactionError> {
        let key = self.key.clone();
        let item = item.clone();
        self.tx.apply(move |data, _| remove_item_in(data, &key, &item))
    }

    /// Move an item within this panel. No-op when the panel has fewer than
    /// two children or the target is the center region.
    pub fn move_item(&mut self, item: &NodeKey, target: MoveTarget) -> Result<(), TransactionError> {
        let key = self.key.clone();
        let item = item.clone();
        self.tx
            .apply(move |data, _| move_item_in(data, &key, &item, target))
    }

    /// Convert this item-holding panel into a panel-holding one: two new
    /// empty child panels, all current item associations moved intact into
    /// the designated half.
    pub fn split(
        &mut self,
        direction: Direction,
        keep: SplitHalf,
    ) -> Result<(NodeKey, NodeKey), TransactionError> {
        let key = self.key.clone();
        self.tx
            .apply(move |data, _| split_in(data, &key, direction, keep))
    }

    /// Inverse collapse: flatten all descendant panels' item associations
    /// back into this panel in pre-order and delete the intervening panel
    /// definitions. The last flattened item becomes the selection.
    pub fn un_split(&mut self) -> Result<(), TransactionError> {
        let key = self.key.clone();
        self.tx.apply(move |data, _| un_split_in(data, &key))
    }

    /// Delete this panel with every descendant definition and detach it
    /// from its parent (or the root list).
    pub fn remove(self) -> Result<(), TransactionError> {
        let key = self.key.clone();
        self.tx.apply(move |data, _| remove_panel_in(data, &key))
    }

    /// Batch-remove the item siblings strictly left of, strictly right of,
    /// or on both sides of `item`. The anchor association is preserved.
    pub fn close_relative(
        &mut self,
        item: &NodeKey,
        direction: CloseDirection,
    ) -> Result<(), TransactionError> {
        let key = self.key.clone();
        let item = item.clone();
        self.tx
            .apply(move |data, _| close_relative_in(data, &key, &item, direction))
    }

    /// Select an already-associated item and mark this panel active.
    pub fn select(&mut self, item: &NodeKey) -> Result<(), TransactionError> {
        let key = self.key.clone();
        let item = item.clone();
        self.tx.apply(move |data, _| {
            let panel = panel_ref(data, &key)?;
            if panel
                .children
                .iter()
                .all(|assoc| assoc.variant != NodeVariant::Item || assoc.key != item)
            {
                return Err(TransactionError::ReferenceNotFound { key: item });
            }
            if let Some(panel) = data.panel_mut(&key) {
                panel.selected = Some(item);
            }
            data.current_panel = Some(key);
            Ok(())
        })
    }

    /// Set the advisory activity state.
    pub fn set_state(&mut self, state: crate::node::PanelState) -> Result<(), TransactionError> {
        let key = self.key.clone();
        self.tx.apply(move |data, _| {
            let panel = panel_ref_mut(data, &key)?;
            panel.state = state;
            Ok(())
        })
    }
}

/// Transaction-scoped mutable item handle.
#[derive(Debug)]
pub struct ItemMut<'t, 'a> {
    tx: &'t mut Transaction<'a>,
    key: NodeKey,
}

impl ItemMut<'_, '_> {
    /// Key of the wrapped item.
    #[must_use]
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// Whitelist update: apply the patch fields whose values differ from
    /// the current ones. Key and variant are not expressible in the patch.
    pub fn update(&mut self, patch: ItemPatch) -> Result<(), TransactionError> {
        let key = self.key.clone();
        self.tx.apply(move |data, _| {
            let Some(item) = data.item_mut(&key) else {
                return Err(TransactionError::ReferenceNotFound { key });
            };
            if let Some(label) = patch.label
                && label != item.label
            {
                item.label = label;
            }
            if let Some(custom) = patch.custom
                && custom != item.custom
            {
                item.custom = custom;
            }
            if let Some(icon) = patch.icon
                && icon != item.icon
            {
                item.icon = icon;
            }
            if let Some(loading) = patch.loading {
                item.loading = loading;
            }
            if let Some(is_dirty) = patch.is_dirty {
                item.is_dirty = is_dirty;
            }
            Ok(())
        })
    }

    /// Detach this item from every parent panel; the definition is garbage
    /// collected with the last association.
    pub fn remove(self) -> Result<(), TransactionError> {
        let key = self.key.clone();
        self.tx.apply(move |data, _| {
            let parents = parents_of_item(data, &key);
            if parents.is_empty() {
                return Err(TransactionError::ReferenceNotFound { key });
            }
            for parent in parents {
                remove_item_in(data, &parent, &key)?;
            }
            Ok(())
        })
    }

    /// Move within one panel; delegates to [`PanelMut::move_item`].
    pub fn move_in_panel(
        &mut self,
        panel: &NodeKey,
        target: MoveTarget,
    ) -> Result<(), TransactionError> {
        let panel = panel.clone();
        let key = self.key.clone();
        self.tx
            .apply(move |data, _| move_item_in(data, &panel, &key, target))
    }

    /// Cross-panel move. Reselects the source panel per the next/previous
    /// rule, removes the source panel if it becomes childless, and avoids
    /// duplicate associations when the item is already linked into the
    /// destination (only the destination selection is updated then).
    pub fn move_to(
        &mut self,
        from: &NodeKey,
        to: &NodeKey,
        opts: MoveItemOptions,
    ) -> Result<MoveToOutcome, TransactionError> {
        let from = from.clone();
        let to = to.clone();
        let key = self.key.clone();
        self.tx
            .apply(move |data, observers| move_to_in(data, observers, &from, &to, &key, &opts))
    }
}

// ---------------------------------------------------------------------
// Mutation algorithms, run against a staged clone of the working copy.
// ---------------------------------------------------------------------

fn panel_ref<'d>(data: &'d StateData, key: &NodeKey) -> Result<&'d Panel, TransactionError> {
    data.panel(key)
        .ok_or_else(|| TransactionError::ReferenceNotFound { key: key.clone() })
}

fn panel_ref_mut<'d>(
    data: &'d mut StateData,
    key: &NodeKey,
) -> Result<&'d mut Panel, TransactionError> {
    if data.panel(key).is_none() {
        return Err(TransactionError::ReferenceNotFound { key: key.clone() });
    }
    match data.panel_mut(key) {
        Some(panel) => Ok(panel),
        None => Err(TransactionError::ReferenceNotFound { key: key.clone() }),
    }
}

fn parents_of_item(data: &StateData, item: &NodeKey) -> Vec<NodeKey> {
    data.definitions
        .values()
        .filter_map(|node| match node {
            Node::Panel(panel)
                if panel
                    .children
                    .iter()
                    .any(|assoc| assoc.variant == NodeVariant::Item && assoc.key == *item) =>
            {
                Some(panel.key.clone())
            }
            _ => None,
        })
        .collect()
}

fn add_item_in(
    data: &mut StateData,
    observers: &DockObservers,
    panel_key: &NodeKey,
    init: &ItemInit,
    opts: &AddItemOptions,
) -> Result<AddItemOutcome, TransactionError> {
    let panel = panel_ref(data, panel_key)?;
    if panel.has_panel_children() {
        return Err(TransactionError::StructuralViolation {
            panel: panel_key.clone(),
            detail: "panel already holds child panels",
        });
    }

    // Re-link activation: the association exists and center was requested.
    if panel.child(&init.key).is_some() && opts.region == Region::Center {
        let panel = panel_ref_mut(data, panel_key)?;
        panel.selected = Some(init.key.clone());
        tracing::trace!(panel = %panel_key, item = %init.key, "add_item: activated existing link");
        return Ok(AddItemOutcome {
            key: init.key.clone(),
            created: false,
            canceled: false,
        });
    }

    // Directional insert: split, then recurse into the empty half.
    if let Some(direction) = opts.region.axis()
        && !panel.children.is_empty()
    {
        let keep = if opts.region.keeps_existing_first() {
            SplitHalf::First
        } else {
            SplitHalf::Second
        };
        let (first, second) = split_in(data, panel_key, direction, keep)?;
        let target = if opts.region.keeps_existing_first() {
            second
        } else {
            first
        };
        let nested = AddItemOptions {
            region: Region::Center,
            index: Some(0),
            reason: opts.reason,
        };
        return add_item_in(data, observers, &target, init, &nested);
    }

    let created = !data.definitions.contains_key(&init.key);
    if !created && data.item(&init.key).is_none() {
        return Err(TransactionError::StructuralViolation {
            panel: panel_key.clone(),
            detail: "key is already used by a panel definition",
        });
    }

    let panel = panel_ref_mut(data, panel_key)?;
    let index = match opts.index.or(init.index) {
        Some(explicit) => {
            if panel.children.iter().any(|assoc| assoc.index == explicit) {
                for assoc in &mut panel.children {
                    if assoc.index >= explicit {
                        assoc.index += 1;
                    }
                }
            }
            explicit
        }
        None => panel.next_index(),
    };
    let mut assoc = AssociationRecord::item(init.key.clone(), index);
    assoc.pinned = init.pinned;
    panel.children.push(assoc);
    panel.selected = Some(init.key.clone());
    tracing::trace!(panel = %panel_key, item = %init.key, index, created, "add_item");

    let mut canceled = false;
    if created {
        let item = init.build();
        let _ = data
            .definitions
            .insert(item.key.clone(), Node::Item(item.clone()));

        let mut event = ItemCreated::new(item, opts.reason);
        observers.notify_created(&mut event);
        canceled = event.is_canceled();
        if event.item.key != init.key {
            tracing::warn!(
                key = %init.key,
                "created observer attempted to change the item key; rejected"
            );
        }
        if let Some(stored) = data.item_mut(&init.key) {
            stored.label = event.item.label;
            stored.custom = event.item.custom;
            stored.icon = event.item.icon;
            stored.loading = event.item.loading;
            stored.is_dirty = event.item.is_dirty;
        }
    }

    Ok(AddItemOutcome {
        key: init.key.clone(),
        created,
        canceled,
    })
}

fn add_panel_in(
    data: &mut StateData,
    panel_key: &NodeKey,
    init: PanelInit,
) -> Result<NodeKey, TransactionError> {
    let panel = panel_ref(data, panel_key)?;
    if panel.has_item_children() {
        return Err(TransactionError::StructuralViolation {
            panel: panel_key.clone(),
            detail: "panel already holds child items",
        });
    }

    let key = init.key.unwrap_or_else(|| data.allocate_panel_key());
    if data.definitions.contains_key(&key) {
        return Err(TransactionError::StructuralViolation {
            panel: key,
            detail: "key is already defined",
        });
    }
    let mut child = Panel::new(key.clone());
    if let Some(direction) = init.direction {
        child.direction = direction;
    }
    let _ = data.definitions.insert(key.clone(), Node::Panel(child));

    let panel = panel_ref_mut(data, panel_key)?;
    let index = panel.next_index();
    panel.children.push(AssociationRecord::panel(key.clone(), index));
    tracing::trace!(panel = %panel_key, child = %key, index, "add_panel");
    Ok(key)
}

fn remove_item_in(
    data: &mut StateData,
    panel_key: &NodeKey,
    item_key: &NodeKey,
) -> Result<(), TransactionError> {
    let panel = panel_ref_mut(data, panel_key)?;
    let Some(position) = panel
        .children
        .iter()
        .position(|assoc| assoc.variant == NodeVariant::Item && assoc.key == *item_key)
    else {
        return Err(TransactionError::ReferenceNotFound {
            key: item_key.clone(),
        });
    };

    let removed_index = panel.children[position].index;
    let _ = panel.children.remove(position);
    for assoc in &mut panel.children {
        if assoc.index >= removed_index {
            assoc.index -= 1;
        }
    }

    if panel.selected.as_ref() == Some(item_key) {
        // Prefer the item now occupying the vacated slot, else the previous
        // sibling, else leave unselected.
        let replacement = panel
            .children
            .iter()
            .find(|assoc| assoc.index == removed_index)
            .or_else(|| {
                panel
                    .children
                    .iter()
                    .filter(|assoc| assoc.index < removed_index)
                    .max_by_key(|assoc| assoc.index)
            })
            .map(|assoc| assoc.key.clone());
        panel.selected = replacement;
    }

    if data.reference_count(item_key) == 0 {
        let _ = data.definitions.remove(item_key);
        tracing::trace!(item = %item_key, "item definition garbage collected");
    }
    tracing::trace!(panel = %panel_key, item = %item_key, "remove_item");
    Ok(())
}

fn move_item_in(
    data: &mut StateData,
    panel_key: &NodeKey,
    item_key: &NodeKey,
    target: MoveTarget,
) -> Result<(), TransactionError> {
    let panel = panel_ref(data, panel_key)?;
    let Some(assoc) = panel
        .children
        .iter()
        .find(|assoc| assoc.variant == NodeVariant::Item && assoc.key == *item_key)
    else {
        return Err(TransactionError::ReferenceNotFound {
            key: item_key.clone(),
        });
    };
    let old_index = assoc.index;

    if panel.children.len() < 2 {
        return Ok(());
    }

    match target {
        MoveTarget::Region(Region::Center) => Ok(()),
        MoveTarget::Index(new_index) => {
            if old_index == new_index {
                return Ok(());
            }
            let panel = panel_ref_mut(data, panel_key)?;
            for assoc in &mut panel.children {
                if assoc.key == *item_key {
                    continue;
                }
                if assoc.index > old_index {
                    assoc.index -= 1;
                }
            }
            for assoc in &mut panel.children {
                if assoc.key == *item_key {
                    continue;
                }
                if assoc.index >= new_index {
                    assoc.index += 1;
                }
            }
            if let Some(moved) = panel.child_mut(item_key) {
                moved.index = new_index;
            }
            tracing::trace!(panel = %panel_key, item = %item_key, old_index, new_index, "move_item to index");
            Ok(())
        }
        MoveTarget::Region(region) => {
            let Some(direction) = region.axis() else {
                return Ok(());
            };

            // Detach the association without garbage collecting the item.
            let panel = panel_ref_mut(data, panel_key)?;
            let Some(position) = panel
                .children
                .iter()
                .position(|assoc| assoc.key == *item_key)
            else {
                return Err(TransactionError::ReferenceNotFound {
                    key: item_key.clone(),
                });
            };
            let mut moved = panel.children.remove(position);
            for assoc in &mut panel.children {
                if assoc.index >= old_index {
                    assoc.index -= 1;
                }
            }
            if panel.selected.as_ref() == Some(item_key) {
                let replacement = panel
                    .children
                    .iter()
                    .find(|assoc| assoc.index == old_index)
                    .or_else(|| {
                        panel
                            .children
                            .iter()
                            .filter(|assoc| assoc.index < old_index)
                            .max_by_key(|assoc| assoc.index)
                    })
                    .map(|assoc| assoc.key.clone());
                panel.selected = replacement;
            }

            let keep = if region.keeps_existing_first() {
                SplitHalf::First
            } else {
                SplitHalf::Second
            };
            let (first, second) = split_in(data, panel_key, direction, keep)?;
            let target_half = if region.keeps_existing_first() {
                second
            } else {
                first
            };
            moved.index = 0;
            let half = panel_ref_mut(data, &target_half)?;
            half.children.push(moved);
            half.selected = Some(item_key.clone());
            tracing::trace!(panel = %panel_key, item = %item_key, ?region, "move_item to region");
            Ok(())
        }
        MoveTarget::End => {
            let panel = panel_ref_mut(data, panel_key)?;
            for assoc in &mut panel.children {
                if assoc.key == *item_key {
                    continue;
                }
                if assoc.index > old_index {
                    assoc.index -= 1;
                }
            }
            let mut candidate = 0u32;
            while panel
                .children
                .iter()
                .any(|assoc| assoc.key != *item_key && assoc.index == candidate)
            {
                candidate += 1;
            }
            if let Some(moved) = panel.child_mut(item_key) {
                moved.index = candidate;
            }
            tracing::trace!(panel = %panel_key, item = %item_key, old_index, new_index = candidate, "move_item to end");
            Ok(())
        }
    }
}

fn split_in(
    data: &mut StateData,
    panel_key: &NodeKey,
    direction: Direction,
    keep: SplitHalf,
) -> Result<(NodeKey, NodeKey), TransactionError> {
    let panel = panel_ref(data, panel_key)?;
    if panel.has_panel_children() {
        return Err(TransactionError::StructuralViolation {
            panel: panel_key.clone(),
            detail: "panel already holds child panels",
        });
    }
    let moved_children = panel.children.clone();
    let moved_selected = panel.selected.clone();

    let first_key = data.allocate_panel_key();
    let _ = data
        .definitions
        .insert(first_key.clone(), Node::Panel(Panel::new(first_key.clone())));
    let second_key = data.allocate_panel_key();
    let _ = data
        .definitions
        .insert(second_key.clone(), Node::Panel(Panel::new(second_key.clone())));

    let kept_key = match keep {
        SplitHalf::First => &first_key,
        SplitHalf::Second => &second_key,
    };
    let kept = panel_ref_mut(data, kept_key)?;
    kept.children = moved_children;
    kept.selected = moved_selected;

    let panel = panel_ref_mut(data, panel_key)?;
    panel.direction = direction;
    panel.selected = None;
    panel.children = vec![
        AssociationRecord::panel(first_key.clone(), 0),
        AssociationRecord::panel(second_key.clone(), 1),
    ];
    tracing::trace!(panel = %panel_key, first = %first_key, second = %second_key, ?direction, "split");
    Ok((first_key, second_key))
}

fn un_split_in(data: &mut StateData, panel_key: &NodeKey) -> Result<(), TransactionError> {
    let panel = panel_ref(data, panel_key)?;
    if !panel.has_panel_children() {
        return Ok(());
    }

    let descendants = descendant_panels(data, panel_key)?;
    let mut flattened: Vec<AssociationRecord> = Vec::new();
    let mut seen: rustc_hash::FxHashSet<NodeKey> = rustc_hash::FxHashSet::default();
    for key in &descendants {
        let descendant = panel_ref(data, key)?;
        let mut items: Vec<&AssociationRecord> = descendant
            .children
            .iter()
            .filter(|assoc| assoc.variant == NodeVariant::Item)
            .collect();
        items.sort_by_key(|assoc| assoc.index);
        for assoc in items {
            // An item linked into two flattened branches keeps one edge.
            if seen.insert(assoc.key.clone()) {
                flattened.push(assoc.clone());
            }
        }
    }

    for key in &descendants {
        let _ = data.definitions.remove(key);
    }
    for (position, assoc) in flattened.iter_mut().enumerate() {
        assoc.index = position as u32;
    }
    let last = flattened.last().map(|assoc| assoc.key.clone());

    let panel = panel_ref_mut(data, panel_key)?;
    panel.children = flattened;
    panel.selected = last;

    if let Some(current) = &data.current_panel
        && descendants.contains(current)
    {
        data.current_panel = Some(panel_key.clone());
    }
    tracing::trace!(panel = %panel_key, flattened = descendants.len(), "un_split");
    Ok(())
}

fn remove_panel_in(data: &mut StateData, panel_key: &NodeKey) -> Result<(), TransactionError> {
    let _ = panel_ref(data, panel_key)?;
    let mut subtree = vec![panel_key.clone()];
    subtree.extend(descendant_panels(data, panel_key)?);

    let mut subtree_items: Vec<NodeKey> = Vec::new();
    for key in &subtree {
        let panel = panel_ref(data, key)?;
        for assoc in &panel.children {
            if assoc.variant == NodeVariant::Item {
                subtree_items.push(assoc.key.clone());
            }
        }
    }

    // Detach from the parent panel, or from the root list.
    if let Some(parent_key) = data.parent_of(panel_key) {
        let parent = panel_ref_mut(data, &parent_key)?;
        if let Some(position) = parent
            .children
            .iter()
            .position(|assoc| assoc.key == *panel_key)
        {
            let removed_index = parent.children[position].index;
            let _ = parent.children.remove(position);
            for assoc in &mut parent.children {
                if assoc.index >= removed_index {
                    assoc.index -= 1;
                }
            }
        }
    } else if let Some(position) = data.roots.iter().position(|assoc| assoc.key == *panel_key) {
        let removed_index = data.roots[position].index;
        let _ = data.roots.remove(position);
        for assoc in &mut data.roots {
            if assoc.index >= removed_index {
                assoc.index -= 1;
            }
        }
    }

    for key in &subtree {
        let _ = data.definitions.remove(key);
    }
    for item_key in subtree_items {
        if data.item(&item_key).is_some() && data.reference_count(&item_key) == 0 {
            let _ = data.definitions.remove(&item_key);
        }
    }
    if let Some(current) = &data.current_panel
        && subtree.contains(current)
    {
        data.current_panel = None;
    }
    tracing::trace!(panel = %panel_key, removed = subtree.len(), "remove_panel");
    Ok(())
}

fn close_relative_in(
    data: &mut StateData,
    panel_key: &NodeKey,
    item_key: &NodeKey,
    direction: CloseDirection,
) -> Result<(), TransactionError> {
    let panel = panel_ref(data, panel_key)?;
    let Some(anchor) = panel
        .children
        .iter()
        .find(|assoc| assoc.variant == NodeVariant::Item && assoc.key == *item_key)
    else {
        return Err(TransactionError::ReferenceNotFound {
            key: item_key.clone(),
        });
    };
    let anchor_index = anchor.index;

    let mut targets: Vec<(u32, NodeKey)> = panel
        .children
        .iter()
        .filter(|assoc| assoc.variant == NodeVariant::Item && assoc.key != *item_key)
        .filter(|assoc| match direction {
            CloseDirection::Left => assoc.index < anchor_index,
            CloseDirection::Right => assoc.index > anchor_index,
            CloseDirection::Both => true,
        })
        .map(|assoc| (assoc.index, assoc.key.clone()))
        .collect();
    targets.sort_by_key(|(index, _)| *index);

    for (_, key) in targets {
        remove_item_in(data, panel_key, &key)?;
    }
    Ok(())
}

fn move_to_in(
    data: &mut StateData,
    observers: &DockObservers,
    from: &NodeKey,
    to: &NodeKey,
    item_key: &NodeKey,
    opts: &MoveItemOptions,
) -> Result<MoveToOutcome, TransactionError> {
    let from_panel = panel_ref(data, from)?;
    let Some(source_assoc) = from_panel
        .children
        .iter()
        .find(|assoc| assoc.variant == NodeVariant::Item && assoc.key == *item_key)
        .cloned()
    else {
        return Err(TransactionError::ReferenceNotFound {
            key: item_key.clone(),
        });
    };
    let to_panel = panel_ref(data, to)?;

    // Already linked into the destination: only update the selection.
    if to_panel.child(item_key).is_some() {
        let to_panel = panel_ref_mut(data, to)?;
        to_panel.selected = Some(item_key.clone());
        return Ok(MoveToOutcome {
            source_removed: false,
            source_parent: None,
        });
    }

    // Link into the destination first so the definition never loses its
    // last reference mid-move.
    let init = ItemInit {
        key: item_key.clone(),
        pinned: source_assoc.pinned,
        ..ItemInit::default()
    };
    let nested = AddItemOptions {
        region: opts.region,
        index: opts.index,
        reason: CreateReason::Api,
    };
    let _ = add_item_in(data, observers, to, &init, &nested)?;

    remove_item_in(data, from, item_key)?;

    let mut source_removed = false;
    let mut source_parent = None;
    let from_panel = panel_ref(data, from)?;
    if from_panel.children.is_empty() {
        source_parent = data.parent_of(from);
        remove_panel_in(data, from)?;
        source_removed = true;
    }
    Ok(MoveToOutcome {
        source_removed,
        source_parent,
    })
}

fn collapse_upward_in(data: &mut StateData, start: NodeKey) -> Result<(), TransactionError> {
    let mut cursor = Some(start);
    while let Some(key) = cursor {
        let Some(panel) = data.panel(&key) else {
            break;
        };
        let parent = data.parent_of(&key);
        if panel.children.is_empty() {
            remove_panel_in(data, &key)?;
            cursor = parent;
        } else if panel.is_splittable_back() {
            un_split_in(data, &key)?;
            // The flattened branch may have been empty; re-examine.
            cursor = Some(key);
        } else {
            break;
        }
    }
    Ok(())
}

/// Descendant panel keys of `panel_key` in depth-first pre-order,
/// excluding the panel itself.
fn descendant_panels(
    data: &StateData,
    panel_key: &NodeKey,
) -> Result<Vec<NodeKey>, TransactionError> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeKey> = vec![panel_key.clone()];
    let mut first = true;
    while let Some(key) = stack.pop() {
        let panel = panel_ref(data, &key)?;
        if !first {
            out.push(key.clone());
        }
        first = false;
        let mut child_panels: Vec<&AssociationRecord> = panel
            .children
            .iter()
            .filter(|assoc| assoc.variant == NodeVariant::Panel)
            .collect();
        child_panels.sort_by_key(|assoc| assoc.index);
        for assoc in child_panels.iter().rev() {
            stack.push(assoc.key.clone());
        }
    }
    Ok(out)
}
