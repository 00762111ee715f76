//! Dock layout core: a tree of split panels hosting tabbed items, mutated
//! through transactions.
//!
//! The registry ([`DockState`]) is an arena of [`Node`] definitions plus a
//! root-level panel list. Parent panels reference children through
//! [`AssociationRecord`] edges carrying the per-relationship sibling index
//! and pinned flag, which lets one item appear in several panels at once.
//! A panel holds either child panels or child items, never both.
//!
//! All mutation goes through [`Transaction`]: primitives stage changes on
//! an isolated working copy, each primitive is validated atomically, and
//! [`Transaction::commit`] publishes the result in one step before firing
//! the `change` and `render` notifications. High-level single-gesture
//! operations (create, remove, move, select) live on [`DockState`]
//! directly and wrap one transaction each.
//!
//! ```
//! use tabdock_core::{AddItemOptions, DockState, ItemInit, PanelInit, Region};
//!
//! let mut dock = DockState::new();
//! let panel = dock.create_root_panel(PanelInit::default())?;
//! dock.create_item(&panel, ItemInit::new("notes.md"), AddItemOptions::default())?;
//! dock.create_item(
//!     &panel,
//!     ItemInit::new("todo.md"),
//!     AddItemOptions { region: Region::East, ..AddItemOptions::default() },
//! )?;
//! assert!(dock.panel(&panel).expect("root panel").has_panel_children());
//! # Ok::<(), tabdock_core::TransactionError>(())
//! ```

#![forbid(unsafe_code)]

mod events;
mod facade;
mod node;
mod snapshot;
mod state;
mod transaction;

pub use events::{
    ChangeEvent, CreateReason, DockObservers, ItemCreated, RenderEvent, Subscription,
};
pub use node::{
    AssociationRecord, Direction, Item, ItemInit, ItemPatch, Node, NodeKey, NodeVariant, Panel,
    PanelState, Region,
};
pub use snapshot::{DOCK_SCHEMA_VERSION, DockSnapshot};
pub use state::{DockModelError, DockState, Items, Panels};
pub use transaction::{
    AddItemOptions, AddItemOutcome, CloseDirection, ItemMut, MoveItemOptions, MoveTarget,
    MoveToOutcome, PanelInit, PanelMut, SplitHalf, Transaction, TransactionError,
    TransactionStatus,
};
