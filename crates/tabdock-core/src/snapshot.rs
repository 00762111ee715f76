//! Canonical serialized registry form for the persistence boundary.
//!
//! # Schema Versioning Policy
//!
//! - Additive fields use `#[serde(default)]` so older payloads keep loading.
//! - Breaking field/semantic changes must bump [`DOCK_SCHEMA_VERSION`];
//!   loaders reject unknown versions with an actionable error.
//!
//! Round-trip contract: `DockState::from_snapshot(state.to_snapshot())`
//! yields a registry with identical keys, variants, directions, selections,
//! and per-association indices and pinned flags.

use serde::{Deserialize, Serialize};

use crate::node::{AssociationRecord, Node, NodeKey};
use crate::state::{DockModelError, DockState, StateData};

/// Current dock snapshot schema version.
pub const DOCK_SCHEMA_VERSION: u16 = 1;

fn default_schema_version() -> u16 {
    DOCK_SCHEMA_VERSION
}

/// Serialized registry: definition list plus the root-level panel
/// association list and the last-active-panel pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub definitions: Vec<Node>,
    #[serde(default)]
    pub items: Vec<AssociationRecord>,
    #[serde(default)]
    pub current_panel: Option<NodeKey>,
}

impl DockSnapshot {
    /// Canonicalize definition ordering by key for deterministic output.
    pub fn canonicalize(&mut self) {
        self.definitions.sort_by(|a, b| a.key().cmp(b.key()));
    }
}

impl StateData {
    pub(crate) fn to_snapshot(&self) -> DockSnapshot {
        let mut snapshot = DockSnapshot {
            schema_version: DOCK_SCHEMA_VERSION,
            definitions: self.definitions.values().cloned().collect(),
            items: self.roots.clone(),
            current_panel: self.current_panel.clone(),
        };
        snapshot.canonicalize();
        snapshot
    }

    pub(crate) fn from_snapshot(mut snapshot: DockSnapshot) -> Result<Self, DockModelError> {
        if snapshot.schema_version != DOCK_SCHEMA_VERSION {
            return Err(DockModelError::UnsupportedSchemaVersion {
                version: snapshot.schema_version,
            });
        }
        snapshot.canonicalize();
        let mut definitions = std::collections::BTreeMap::new();
        for node in snapshot.definitions {
            let key = node.key().clone();
            if definitions.insert(key.clone(), node).is_some() {
                return Err(DockModelError::DuplicateNodeKey { key });
            }
        }
        let data = Self {
            definitions,
            roots: snapshot.items,
            current_panel: snapshot.current_panel,
        };
        data.validate()?;
        Ok(data)
    }
}

impl DockState {
    /// Export the registry to its canonical snapshot form.
    #[must_use]
    pub fn to_snapshot(&self) -> DockSnapshot {
        self.data.to_snapshot()
    }

    /// Construct and validate a registry from a snapshot.
    ///
    /// The loaded registry starts at revision 0 with a fresh observer list.
    pub fn from_snapshot(snapshot: DockSnapshot) -> Result<Self, DockModelError> {
        let data = StateData::from_snapshot(snapshot)?;
        Ok(Self {
            data,
            revision: 0,
            observers: crate::events::DockObservers::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{AssociationRecord, Direction, Item, NodeVariant, Panel};

    fn sample_snapshot() -> DockSnapshot {
        let mut panel = Panel::new("root");
        panel.direction = Direction::Vertical;
        panel.children = vec![
            AssociationRecord::item(NodeKey::from("b"), 1),
            AssociationRecord {
                variant: NodeVariant::Item,
                key: NodeKey::from("a"),
                index: 0,
                pinned: true,
            },
        ];
        panel.selected = Some(NodeKey::from("a"));

        DockSnapshot {
            schema_version: DOCK_SCHEMA_VERSION,
            definitions: vec![
                Node::Item(Item::new("b")),
                Node::Panel(panel),
                Node::Item(Item::new("a")),
            ],
            items: vec![AssociationRecord::panel(NodeKey::from("root"), 0)],
            current_panel: Some(NodeKey::from("root")),
        }
    }

    #[test]
    fn round_trip_preserves_structure() {
        let state = DockState::from_snapshot(sample_snapshot()).expect("snapshot should load");
        let round = state.to_snapshot();
        let reloaded = DockState::from_snapshot(round.clone()).expect("round trip should load");

        assert_eq!(round, reloaded.to_snapshot());
        assert_eq!(state.state_hash(), reloaded.state_hash());

        let panel = reloaded.panel(&NodeKey::from("root")).expect("root panel");
        assert_eq!(panel.direction, Direction::Vertical);
        assert_eq!(panel.selected, Some(NodeKey::from("a")));
        let pinned = panel.child(&NodeKey::from("a")).expect("association for a");
        assert!(pinned.pinned);
        assert_eq!(pinned.index, 0);
    }

    #[test]
    fn canonicalize_sorts_definitions_by_key() {
        let mut snapshot = sample_snapshot();
        snapshot.canonicalize();
        let keys: Vec<&str> = snapshot
            .definitions
            .iter()
            .map(|node| node.key().as_str())
            .collect();
        assert_eq!(keys, vec!["a", "b", "root"]);
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.schema_version = 99;
        let err = DockState::from_snapshot(snapshot).expect_err("unknown version should fail");
        assert_eq!(err, DockModelError::UnsupportedSchemaVersion { version: 99 });
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.definitions.push(Node::Item(Item::new("a")));
        let err = DockState::from_snapshot(snapshot).expect_err("duplicate key should fail");
        assert_eq!(
            err,
            DockModelError::DuplicateNodeKey {
                key: NodeKey::from("a"),
            }
        );
    }

    #[test]
    fn snapshot_json_shape_is_variant_tagged() {
        let json =
            serde_json::to_value(sample_snapshot()).expect("snapshot should serialize");
        assert_eq!(json["schema_version"], serde_json::json!(1));
        let definitions = json["definitions"]
            .as_array()
            .expect("definitions should serialize as array");
        assert!(definitions
            .iter()
            .any(|node| node["variant"] == serde_json::json!("panel")));
        assert!(definitions
            .iter()
            .any(|node| node["variant"] == serde_json::json!("item")));
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let parsed: DockSnapshot = serde_json::from_str(
            r#"{"definitions":[{"variant":"panel","key":"solo"}]}"#,
        )
        .expect("minimal payload should parse");
        assert_eq!(parsed.schema_version, DOCK_SCHEMA_VERSION);
        assert!(parsed.items.is_empty());
        assert!(parsed.current_panel.is_none());
    }
}
