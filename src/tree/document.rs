//! Addressable restricted-tree document
//!
//! A [`ConfigTree`] owns a validated root [`Node`]. Every mutation keeps the
//! restricted-tree invariants: no mixed content, and colliding sibling tags
//! carry unique ids.

use crate::error::TreeError;
use crate::tree::node::{Node, ID_ATTRIBUTE};
use crate::tree::path::{PathAddress, Segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Where to place a node among its siblings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Before every existing sibling
    First,
    /// Directly after the sibling at this address
    After(PathAddress),
}

/// Result of resolving an address against a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Element(&'a Node),
    Attribute(&'a str),
}

impl<'a> Resolved<'a> {
    /// Comparable value: text for elements, the value for attributes.
    pub fn value(&self) -> &'a str {
        match self {
            Resolved::Element(node) => node.value(),
            Resolved::Attribute(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTree {
    root: Node,
}

impl ConfigTree {
    pub fn new(root: Node) -> Result<Self, TreeError> {
        root.validate("")?;
        Ok(Self { root })
    }

    /// A root element with no content.
    pub fn empty(root_tag: &str) -> Result<Self, TreeError> {
        Self::new(Node::new(root_tag))
    }

    pub fn from_json(document: &str) -> Result<Self, TreeError> {
        let root: Node = serde_json::from_str(document)?;
        Self::new(root)
    }

    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_address(&self) -> PathAddress {
        PathAddress::root().join(self.root.segment())
    }

    pub fn validate(&self) -> Result<(), TreeError> {
        self.root.validate("")
    }

    fn node(&self, address: &PathAddress) -> Option<&Node> {
        let (first, rest) = address.segments().split_first()?;
        if !self.root.matches(first) {
            return None;
        }
        rest.iter()
            .try_fold(&self.root, |node, segment| node.child(segment))
    }

    fn node_mut(&mut self, address: &PathAddress) -> Option<&mut Node> {
        let (first, rest) = address.segments().split_first()?;
        if !self.root.matches(first) {
            return None;
        }
        rest.iter()
            .try_fold(&mut self.root, |node, segment| node.child_mut(segment))
    }

    fn element(&self, address: &PathAddress) -> Result<&Node, TreeError> {
        self.node(address)
            .ok_or_else(|| TreeError::NotFound(address.to_string()))
    }

    fn element_mut(&mut self, address: &PathAddress) -> Result<&mut Node, TreeError> {
        self.node_mut(address)
            .ok_or_else(|| TreeError::NotFound(address.to_string()))
    }

    /// Resolve an element or attribute address.
    pub fn resolve(&self, address: &PathAddress) -> Result<Resolved<'_>, TreeError> {
        let element = self
            .node(address)
            .ok_or_else(|| TreeError::NotFound(address.to_string()))?;
        match address.attribute_name() {
            None => Ok(Resolved::Element(element)),
            Some(name) => element
                .attributes
                .get(name)
                .map(|v| Resolved::Attribute(v.as_str()))
                .ok_or_else(|| TreeError::NotFound(address.to_string())),
        }
    }

    pub fn contains(&self, address: &PathAddress) -> bool {
        self.resolve(address).is_ok()
    }

    /// Detached deep copy of the element at `address`.
    pub fn subtree(&self, address: &PathAddress) -> Result<Node, TreeError> {
        self.element(address).cloned()
    }

    /// Every element and attribute address in the tree. The `id` attribute is
    /// part of the element's own address and is not listed separately.
    pub fn all_addresses(&self) -> BTreeSet<PathAddress> {
        let mut out = BTreeSet::new();
        collect_addresses(&self.root, &PathAddress::root(), &mut out);
        out
    }

    /// Element addresses in document (pre-)order.
    pub fn element_addresses(&self) -> Vec<PathAddress> {
        let mut out = Vec::new();
        let mut stack = vec![(PathAddress::root(), &self.root)];
        while let Some((parent, node)) = stack.pop() {
            let address = parent.join(node.segment());
            for child in node.children.iter().rev() {
                stack.push((address.clone(), child));
            }
            out.push(address);
        }
        out
    }

    /// Segments of the element's children, in order.
    pub fn child_segments(&self, address: &PathAddress) -> Result<Vec<Segment>, TreeError> {
        Ok(self
            .element(address)?
            .children
            .iter()
            .map(Node::segment)
            .collect())
    }

    /// Append `node` as the last child of `parent`.
    pub fn append(&mut self, parent: &PathAddress, node: Node) -> Result<PathAddress, TreeError> {
        let index = self.element(parent)?.children.len();
        self.insert_index(parent, index, node)
    }

    /// Insert `node` under `parent` at `position`.
    pub fn insert_at(
        &mut self,
        parent: &PathAddress,
        position: &Position,
        node: Node,
    ) -> Result<PathAddress, TreeError> {
        let index = self.index_for(parent, position)?;
        self.insert_index(parent, index, node)
    }

    fn index_for(&self, parent: &PathAddress, position: &Position) -> Result<usize, TreeError> {
        match position {
            Position::First => Ok(0),
            Position::After(sibling) => {
                let segment = sibling
                    .segments()
                    .last()
                    .filter(|_| sibling.parent().as_ref() == Some(parent))
                    .ok_or_else(|| TreeError::NotFound(sibling.to_string()))?;
                self.element(parent)?
                    .child_index(segment)
                    .map(|i| i + 1)
                    .ok_or_else(|| TreeError::NotFound(sibling.to_string()))
            }
        }
    }

    fn insert_index(
        &mut self,
        parent: &PathAddress,
        index: usize,
        node: Node,
    ) -> Result<PathAddress, TreeError> {
        node.validate(&parent.to_string())?;
        let segment = node.segment();
        let target = self.element_mut(parent)?;
        if target.text.is_some() {
            return Err(TreeError::MixedContent(parent.to_string()));
        }
        check_sibling_slot(target, &node, parent)?;
        let index = index.min(target.children.len());
        target.children.insert(index, node);
        Ok(parent.join(segment))
    }

    /// Detach and return the element at `address`. The root cannot be removed.
    pub fn remove(&mut self, address: &PathAddress) -> Result<Node, TreeError> {
        let (parent, segment) = split_element(address)?;
        let parent_node = self.element_mut(&parent)?;
        let index = parent_node
            .child_index(segment)
            .ok_or_else(|| TreeError::NotFound(address.to_string()))?;
        Ok(parent_node.children.remove(index))
    }

    /// Replace the element at `address` in place. `node` must carry the same tag and id.
    pub fn replace(&mut self, address: &PathAddress, node: Node) -> Result<(), TreeError> {
        let segment = address
            .segments()
            .last()
            .filter(|_| address.is_element())
            .ok_or_else(|| TreeError::NotFound(address.to_string()))?;
        if !node.matches(segment) {
            return Err(TreeError::Malformed(format!(
                "replacement <{}> does not match {}",
                node.tag, address
            )));
        }
        node.validate(&address.parent().map(|p| p.to_string()).unwrap_or_default())?;
        *self.element_mut(address)? = node;
        Ok(())
    }

    /// Set an attribute value. `id` cannot be changed through this call since
    /// it is part of the element's address.
    pub fn set_attribute(
        &mut self,
        address: &PathAddress,
        name: &str,
        value: &str,
    ) -> Result<(), TreeError> {
        crate::tree::path::validate_name(name, name)?;
        if name == ID_ATTRIBUTE {
            return Err(TreeError::Malformed(format!(
                "cannot rewrite the id of {} in place",
                address
            )));
        }
        self.element_mut(address)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn set_text(&mut self, address: &PathAddress, text: &str) -> Result<(), TreeError> {
        let node = self.element_mut(address)?;
        if !node.children.is_empty() {
            return Err(TreeError::MixedContent(address.to_string()));
        }
        node.text = Some(text.to_string());
        Ok(())
    }

    /// Move an existing element to `position` among its siblings.
    pub fn move_to(&mut self, address: &PathAddress, position: &Position) -> Result<(), TreeError> {
        if matches!(position, Position::After(anchor) if anchor == address) {
            return Err(TreeError::Malformed(format!(
                "cannot position {} after itself",
                address
            )));
        }
        let (parent, _) = split_element(address)?;
        // Resolve the anchor before detaching so a bad anchor leaves the tree intact.
        self.index_for(&parent, position)?;
        let node = self.remove(address)?;
        let index = self.index_for(&parent, position)?;
        self.insert_index(&parent, index, node)?;
        Ok(())
    }

    /// Reorder the children of `within` so those listed in `template` follow
    /// its relative order; the rest keep their order and go last.
    pub fn reorder_children_like(
        &mut self,
        template: &[Segment],
        within: &PathAddress,
    ) -> Result<(), TreeError> {
        let rank: HashMap<&Segment, usize> =
            template.iter().enumerate().map(|(i, s)| (s, i)).collect();
        let node = self.element_mut(within)?;
        let children = std::mem::take(&mut node.children);
        let (mut listed, unlisted): (Vec<Node>, Vec<Node>) = children
            .into_iter()
            .partition(|child| rank.contains_key(&child.segment()));
        listed.sort_by_key(|child| rank[&child.segment()]);
        listed.extend(unlisted);
        node.children = listed;
        Ok(())
    }

    /// Make the element at `address` match `other`: copy it over, content and
    /// sibling position, when `other` has it; drop it when `other` does not.
    pub fn restore_from(&mut self, other: &ConfigTree, address: &PathAddress) -> Result<(), TreeError> {
        match other.node(address) {
            Some(original) if self.node(address).is_some() => {
                self.replace(address, original.clone())?;
                let position = self.position_in(other, address)?;
                self.move_to(address, &position)
            }
            Some(original) => {
                let (parent, _) = split_element(address)?;
                let position = self.position_in(other, address)?;
                self.insert_at(&parent, &position, original.clone())?;
                Ok(())
            }
            None => {
                if self.node(address).is_some() {
                    self.remove(address)?;
                }
                Ok(())
            }
        }
    }
}

impl ConfigTree {
    /// Where `address` sits in `other`, anchored on the closest preceding
    /// sibling that also exists here.
    fn position_in(&self, other: &ConfigTree, address: &PathAddress) -> Result<Position, TreeError> {
        let (parent, segment) = split_element(address)?;
        let siblings = other.child_segments(&parent)?;
        let index = siblings.iter().position(|s| s == segment).unwrap_or(0);
        Ok(siblings[..index]
            .iter()
            .rev()
            .map(|s| parent.join(s.clone()))
            .find(|a| self.node(a).is_some())
            .map(Position::After)
            .unwrap_or(Position::First))
    }
}

fn collect_addresses(node: &Node, parent: &PathAddress, out: &mut BTreeSet<PathAddress>) {
    let address = parent.join(node.segment());
    for name in node.attributes.keys() {
        if name != ID_ATTRIBUTE {
            out.insert(address.attribute_unchecked(name));
        }
    }
    for child in &node.children {
        collect_addresses(child, &address, out);
    }
    out.insert(address);
}

fn split_element(address: &PathAddress) -> Result<(PathAddress, &Segment), TreeError> {
    if address.is_attribute() {
        return Err(TreeError::NotFound(address.to_string()));
    }
    match (address.parent(), address.segments().last()) {
        (Some(parent), Some(segment)) => Ok((parent, segment)),
        _ => Err(TreeError::Malformed(format!(
            "{} has no parent element",
            address
        ))),
    }
}

fn check_sibling_slot(parent: &Node, node: &Node, at: &PathAddress) -> Result<(), TreeError> {
    let same_tag: Vec<&Node> = parent
        .children
        .iter()
        .filter(|c| c.tag == node.tag)
        .collect();
    if same_tag.is_empty() {
        return Ok(());
    }
    let id = node.id().ok_or_else(|| {
        TreeError::Malformed(format!(
            "<{}> under {} collides with a sibling and carries no id",
            node.tag, at
        ))
    })?;
    for sibling in same_tag {
        match sibling.id() {
            None => {
                return Err(TreeError::Malformed(format!(
                    "existing <{}> under {} carries no id",
                    node.tag, at
                )))
            }
            Some(existing) if existing == id => {
                return Err(TreeError::Malformed(format!(
                    "duplicate id '{}' among <{}> siblings under {}",
                    id, node.tag, at
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}
