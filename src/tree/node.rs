//! Restricted-tree node type

use crate::error::TreeError;
use crate::tree::path::{validate_name, Segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Reserved attribute carrying the sibling-unique identity of a node
pub const ID_ATTRIBUTE: &str = "id";

/// A named node holding either text or child nodes, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub tag: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.attributes.insert(ID_ATTRIBUTE.to_string(), id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get(ID_ATTRIBUTE).map(String::as_str)
    }

    /// Address segment identifying this node among its siblings.
    pub fn segment(&self) -> Segment {
        Segment::new_unchecked(&self.tag, self.id())
    }

    /// Leaf value used for comparison: the text content, empty for containers.
    pub fn value(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn matches(&self, segment: &Segment) -> bool {
        self.tag == segment.tag() && self.id() == segment.id()
    }

    pub fn child(&self, segment: &Segment) -> Option<&Node> {
        self.children.iter().find(|c| c.matches(segment))
    }

    pub fn child_mut(&mut self, segment: &Segment) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.matches(segment))
    }

    pub fn child_index(&self, segment: &Segment) -> Option<usize> {
        self.children.iter().position(|c| c.matches(segment))
    }

    /// Minimal stub carrying only the tag and id.
    pub fn stub(&self) -> Node {
        let mut stub = Node::new(self.tag.clone());
        if let Some(id) = self.id() {
            stub = stub.with_id(id);
        }
        stub
    }

    /// Check the restricted-tree invariants for this node and its descendants.
    pub fn validate(&self, location: &str) -> Result<(), TreeError> {
        let here = format!("{}/{}", location, self.tag);
        validate_name(&self.tag, &here)?;
        for name in self.attributes.keys() {
            validate_name(name, &here)?;
        }
        if self.text.is_some() && !self.children.is_empty() {
            return Err(TreeError::MixedContent(here));
        }

        let mut tag_counts: HashMap<&str, usize> = HashMap::new();
        for child in &self.children {
            *tag_counts.entry(child.tag.as_str()).or_insert(0) += 1;
        }
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for child in &self.children {
            if tag_counts[child.tag.as_str()] > 1 {
                let id = child.id().ok_or_else(|| {
                    TreeError::Malformed(format!(
                        "siblings <{}> under {} share a tag but one carries no id",
                        child.tag, here
                    ))
                })?;
                if !seen.insert((child.tag.as_str(), id)) {
                    return Err(TreeError::Malformed(format!(
                        "duplicate id '{}' among <{}> siblings under {}",
                        id, child.tag, here
                    )));
                }
            }
            child.validate(&here)?;
        }
        Ok(())
    }
}
