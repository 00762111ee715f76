//! Node identity model shared by the two node kinds.
//!
//! A dock tree is stored as an arena: the registry maps [`NodeKey`]s to
//! [`Node`] definitions, and parent panels reference children through
//! lightweight [`AssociationRecord`]s. The association is the edge, not the
//! node: it carries relationship-local metadata (sibling index, pinned
//! state), which is what lets one item appear under several panels at once
//! with a different position in each.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for dock nodes, unique within one registry.
///
/// Keys are caller-supplied strings (editor surfaces typically use document
/// paths or widget ids). Re-using a key for a different node is rejected at
/// validation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    /// Wrap a caller-supplied key string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl Borrow<str> for NodeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Default for NodeKey {
    fn default() -> Self {
        Self(String::new())
    }
}

/// Variant tag distinguishing the two node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeVariant {
    Panel,
    Item,
}

impl fmt::Display for NodeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panel => f.write_str("panel"),
            Self::Item => f.write_str("item"),
        }
    }
}

/// Orientation of a split panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Horizontal,
    Vertical,
}

/// Drop/insert region relative to a panel.
///
/// `Center` means in-place activation or plain insertion; the four edge
/// regions request a directional split-and-insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    #[default]
    Center,
    North,
    South,
    East,
    West,
}

impl Region {
    /// Split direction implied by an edge region, `None` for center.
    #[must_use]
    pub fn axis(self) -> Option<Direction> {
        match self {
            Self::Center => None,
            Self::East | Self::West => Some(Direction::Horizontal),
            Self::North | Self::South => Some(Direction::Vertical),
        }
    }

    /// True if the pre-existing children stay in the first sub-panel.
    ///
    /// East/south push existing children first and the incoming item second;
    /// west/north reverse this.
    #[must_use]
    pub fn keeps_existing_first(self) -> bool {
        matches!(self, Self::East | Self::South)
    }
}

/// Advisory activity state of a panel. Never interpreted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelState {
    #[default]
    Idle,
    Busy,
}

/// Edge from a parent panel to a child node.
///
/// Holds only the child key plus relationship-local metadata. The sibling
/// `index` orders children without requiring contiguous global renumbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub variant: NodeVariant,
    pub key: NodeKey,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub pinned: bool,
}

impl AssociationRecord {
    /// Build an item association at a given sibling index.
    #[must_use]
    pub fn item(key: NodeKey, index: u32) -> Self {
        Self {
            variant: NodeVariant::Item,
            key,
            index,
            pinned: false,
        }
    }

    /// Build a panel association at a given sibling index.
    #[must_use]
    pub fn panel(key: NodeKey, index: u32) -> Self {
        Self {
            variant: NodeVariant::Panel,
            key,
            index,
            pinned: false,
        }
    }
}

/// Leaf node: one tab's identity and metadata.
///
/// An item's identity is independent of where it is displayed; the same key
/// may be associated with more than one panel simultaneously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: NodeKey,
    pub label: String,
    /// Opaque payload bag, round-tripped untouched.
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub is_dirty: bool,
}

impl Item {
    /// Build an item whose label defaults to its key string.
    #[must_use]
    pub fn new(key: impl Into<NodeKey>) -> Self {
        let key = key.into();
        let label = key.to_string();
        Self {
            key,
            label,
            custom: BTreeMap::new(),
            icon: None,
            loading: false,
            is_dirty: false,
        }
    }
}

/// Container node: holds either child panels or child items, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Panel {
    pub key: NodeKey,
    #[serde(default)]
    pub direction: Direction,
    /// Key of the currently visible child item, if any.
    #[serde(default)]
    pub selected: Option<NodeKey>,
    #[serde(default)]
    pub state: PanelState,
    #[serde(default)]
    pub children: Vec<AssociationRecord>,
}

impl Panel {
    /// Build an empty panel. Its child mode is decided by first insertion.
    #[must_use]
    pub fn new(key: impl Into<NodeKey>) -> Self {
        Self {
            key: key.into(),
            direction: Direction::default(),
            selected: None,
            state: PanelState::default(),
            children: Vec::new(),
        }
    }

    /// True if any child association points at an item.
    #[must_use]
    pub fn has_item_children(&self) -> bool {
        self.children
            .iter()
            .any(|assoc| assoc.variant == NodeVariant::Item)
    }

    /// True if any child association points at a panel.
    #[must_use]
    pub fn has_panel_children(&self) -> bool {
        self.children
            .iter()
            .any(|assoc| assoc.variant == NodeVariant::Panel)
    }

    /// Association for a specific child key, if present.
    #[must_use]
    pub fn child(&self, key: &NodeKey) -> Option<&AssociationRecord> {
        self.children.iter().find(|assoc| assoc.key == *key)
    }

    pub(crate) fn child_mut(&mut self, key: &NodeKey) -> Option<&mut AssociationRecord> {
        self.children.iter_mut().find(|assoc| assoc.key == *key)
    }

    /// Children ordered by sibling index.
    #[must_use]
    pub fn ordered_children(&self) -> Vec<&AssociationRecord> {
        let mut ordered: Vec<&AssociationRecord> = self.children.iter().collect();
        ordered.sort_by_key(|assoc| assoc.index);
        ordered
    }

    /// Smallest non-negative sibling index not used by any child, or one
    /// past the current maximum when the index space is dense.
    #[must_use]
    pub fn next_index(&self) -> u32 {
        let mut candidate = 0u32;
        loop {
            if !self.children.iter().any(|assoc| assoc.index == candidate) {
                return candidate;
            }
            candidate += 1;
        }
    }

    /// A panel with exactly one child-panel branch is a collapse candidate.
    #[must_use]
    pub fn is_splittable_back(&self) -> bool {
        self.children.len() == 1 && self.has_panel_children()
    }
}

/// Registry node: a panel or an item, tagged by `variant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Node {
    Panel(Panel),
    Item(Item),
}

impl Node {
    /// Key of the underlying node.
    #[must_use]
    pub fn key(&self) -> &NodeKey {
        match self {
            Self::Panel(panel) => &panel.key,
            Self::Item(item) => &item.key,
        }
    }

    /// Variant tag of the underlying node.
    #[must_use]
    pub fn variant(&self) -> NodeVariant {
        match self {
            Self::Panel(_) => NodeVariant::Panel,
            Self::Item(_) => NodeVariant::Item,
        }
    }

    /// Borrow as a panel, `None` on variant mismatch.
    #[must_use]
    pub fn as_panel(&self) -> Option<&Panel> {
        match self {
            Self::Panel(panel) => Some(panel),
            Self::Item(_) => None,
        }
    }

    /// Borrow as an item, `None` on variant mismatch.
    #[must_use]
    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Self::Panel(_) => None,
            Self::Item(item) => Some(item),
        }
    }
}

/// Initializer for item insertion.
///
/// `index` is the insertion hint consulted when the caller passes no
/// explicit index; `pinned` seeds the association metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInit {
    pub key: NodeKey,
    pub label: Option<String>,
    pub custom: Option<BTreeMap<String, String>>,
    pub icon: Option<String>,
    pub loading: bool,
    pub is_dirty: bool,
    pub index: Option<u32>,
    pub pinned: bool,
}

impl ItemInit {
    /// Initializer with only a key; remaining fields take their defaults.
    #[must_use]
    pub fn new(key: impl Into<NodeKey>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set the display label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the insertion index hint.
    #[must_use]
    pub fn index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub(crate) fn build(&self) -> Item {
        Item {
            key: self.key.clone(),
            label: self
                .label
                .clone()
                .unwrap_or_else(|| self.key.to_string()),
            custom: self.custom.clone().unwrap_or_default(),
            icon: self.icon.clone(),
            loading: self.loading,
            is_dirty: self.is_dirty,
        }
    }
}

/// Whitelist patch for [`Item`] mutation.
///
/// Key and variant are not expressible here; identity is immutable through
/// the update path. The outer `Option` on `icon` means "field specified";
/// the inner value is what the icon becomes, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub label: Option<String>,
    pub custom: Option<BTreeMap<String, String>>,
    pub icon: Option<Option<String>>,
    pub loading: Option<bool>,
    pub is_dirty: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_index_fills_smallest_gap() {
        let mut panel = Panel::new("p");
        panel.children = vec![
            AssociationRecord::item(NodeKey::from("a"), 0),
            AssociationRecord::item(NodeKey::from("b"), 2),
        ];
        assert_eq!(panel.next_index(), 1);

        panel.children.push(AssociationRecord::item(NodeKey::from("c"), 1));
        assert_eq!(panel.next_index(), 3);
    }

    #[test]
    fn empty_panel_has_neither_child_mode() {
        let panel = Panel::new("p");
        assert!(!panel.has_item_children());
        assert!(!panel.has_panel_children());
        assert!(!panel.is_splittable_back());
    }

    #[test]
    fn region_axis_mapping() {
        assert_eq!(Region::East.axis(), Some(Direction::Horizontal));
        assert_eq!(Region::West.axis(), Some(Direction::Horizontal));
        assert_eq!(Region::North.axis(), Some(Direction::Vertical));
        assert_eq!(Region::South.axis(), Some(Direction::Vertical));
        assert_eq!(Region::Center.axis(), None);

        assert!(Region::East.keeps_existing_first());
        assert!(Region::South.keeps_existing_first());
        assert!(!Region::West.keeps_existing_first());
        assert!(!Region::North.keeps_existing_first());
    }

    #[test]
    fn item_label_defaults_to_key() {
        let item = Item::new("notes.md");
        assert_eq!(item.label, "notes.md");
        assert!(item.custom.is_empty());
    }

    #[test]
    fn node_variant_accessors() {
        let node = Node::Item(Item::new("i"));
        assert_eq!(node.variant(), NodeVariant::Item);
        assert!(node.as_item().is_some());
        assert!(node.as_panel().is_none());
    }

    #[test]
    fn association_serde_defaults() {
        let assoc: AssociationRecord =
            serde_json::from_str(r#"{"variant":"item","key":"a"}"#).expect("assoc should parse");
        assert_eq!(assoc.index, 0);
        assert!(!assoc.pinned);
    }
}
