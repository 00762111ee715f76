//! One-shot registry operations: open a transaction, run the primitives,
//! apply the collapse policy, commit.
//!
//! These are the entry points an editor shell calls for single user
//! gestures. Callers composing several mutations atomically use
//! [`DockState::transaction`] directly.

use crate::node::{ItemInit, NodeKey, Region};
use crate::state::DockState;
use crate::transaction::{
    AddItemOptions, AddItemOutcome, MoveItemOptions, MoveTarget, PanelInit, TransactionError,
};

impl DockState {
    /// Create a top-level panel and commit.
    pub fn create_root_panel(&mut self, init: PanelInit) -> Result<NodeKey, TransactionError> {
        let mut tx = self.transaction();
        let key = tx.add_root_panel(init)?;
        tx.commit()?;
        Ok(key)
    }

    /// Insert or activate an item on `panel` and commit.
    pub fn create_item(
        &mut self,
        panel: &NodeKey,
        init: ItemInit,
        opts: AddItemOptions,
    ) -> Result<AddItemOutcome, TransactionError> {
        let mut tx = self.transaction();
        let outcome = tx.panel_mut(panel)?.add_item(init, opts)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Remove an item association and commit.
    ///
    /// With `panel` given, only that panel's association is removed; without
    /// it, the item disappears from every panel. Either way panels emptied
    /// by the removal collapse upward: childless panels are deleted and
    /// single-branch splits flatten, repeating at each parent.
    pub fn remove_item(
        &mut self,
        item: &NodeKey,
        panel: Option<&NodeKey>,
    ) -> Result<(), TransactionError> {
        let mut tx = self.transaction();
        match panel {
            Some(panel) => {
                tx.panel_mut(panel)?.remove_item(item)?;
                tx.collapse_upward(panel)?;
            }
            None => {
                if tx.item(item).is_none() {
                    return Err(TransactionError::ReferenceNotFound { key: item.clone() });
                }
                // Unlinking may flatten or delete sibling parents, so the
                // parent set is recomputed after every pass.
                while let Some(parent) = tx.item_parents(item).into_iter().next() {
                    tx.panel_mut(&parent)?.remove_item(item)?;
                    tx.collapse_upward(&parent)?;
                }
            }
        }
        tx.commit()
    }

    /// Move an item between panels (or within one) and commit.
    ///
    /// Same source and destination dispatch to the in-panel move: an
    /// explicit index wins, then a non-center region, then move-to-end.
    /// Across panels the item is re-linked into the destination first, the
    /// source association is removed with reselection, and a source panel
    /// left childless is deleted with the collapse policy applied upward.
    pub fn move_item(
        &mut self,
        from: &NodeKey,
        to: &NodeKey,
        item: &NodeKey,
        opts: MoveItemOptions,
    ) -> Result<(), TransactionError> {
        let mut tx = self.transaction();
        if from == to {
            let target = if let Some(index) = opts.index {
                MoveTarget::Index(index)
            } else if opts.region != Region::Center {
                MoveTarget::Region(opts.region)
            } else {
                MoveTarget::End
            };
            tx.panel_mut(from)?.move_item(item, target)?;
        } else {
            let outcome = tx.item_mut(item)?.move_to(from, to, opts)?;
            if outcome.source_removed
                && let Some(parent) = outcome.source_parent
            {
                tx.collapse_upward(&parent)?;
            }
        }
        tx.commit()
    }

    /// Select an item on its panel, mark the panel active, and commit.
    ///
    /// Selecting the already-selected item fails so callers can skip the
    /// redundant notification cycle.
    pub fn select_item(&mut self, panel: &NodeKey, item: &NodeKey) -> Result<(), TransactionError> {
        let mut tx = self.transaction();
        {
            let Some(state) = tx.panel(panel) else {
                return Err(TransactionError::ReferenceNotFound { key: panel.clone() });
            };
            if state.selected.as_ref() == Some(item) {
                return Err(TransactionError::StructuralViolation {
                    panel: panel.clone(),
                    detail: "item is already selected",
                });
            }
        }
        tx.panel_mut(panel)?.select(item)?;
        tx.commit()
    }
}
