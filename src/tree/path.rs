//! Canonical addressing of nodes and attributes in a restricted tree
//!
//! An address is a sequence of segments, each `tag` or `tag` plus `id`,
//! optionally terminated by an attribute marker:
//!
//! - full form: `/status/worker[@id='pkg']/item[@id='1']/@version`
//! - abbreviated form: `/status/worker['pkg']/item['1']/@version`
//!
//! Id values are quoted with `'` or `"`; a backslash escapes the next
//! character, so any string (including another address) can be an id.

use crate::error::AddressError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Rendering style for [`PathAddress::render`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressForm {
    /// `/tag[@id='value']`
    Full,
    /// `/tag['value']`
    Abbreviated,
}

/// One step of an address: a tag and, when siblings collide, an id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    tag: String,
    id: Option<String>,
}

impl Segment {
    pub fn new(tag: impl Into<String>, id: Option<String>) -> Result<Self, AddressError> {
        let tag = tag.into();
        validate_name(&tag, &tag)?;
        Ok(Self { tag, id })
    }

    /// Segment from parts already checked by tree validation.
    pub(crate) fn new_unchecked(tag: &str, id: Option<&str>) -> Self {
        Self {
            tag: tag.to_string(),
            id: id.map(str::to_string),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Location of an element or attribute within a [`crate::tree::ConfigTree`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathAddress {
    segments: Vec<Segment>,
    attribute: Option<String>,
}

impl PathAddress {
    /// The document root (no segments). Renders as `/`.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            attribute: None,
        }
    }

    /// Parse either the full or the abbreviated string form.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        Parser::new(input).parse()
    }

    /// Build an element address from an explicit segment list.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            attribute: None,
        }
    }

    /// Address of a child element below this one.
    pub fn child(&self, tag: &str, id: Option<&str>) -> Result<Self, AddressError> {
        if self.is_attribute() {
            return Err(AddressError::malformed(
                &self.to_string(),
                "attribute addresses have no children",
            ));
        }
        let mut segments = self.segments.clone();
        segments.push(Segment::new(tag, id.map(str::to_string))?);
        Ok(Self {
            segments,
            attribute: None,
        })
    }

    /// Address of an attribute on this element.
    pub fn attribute(&self, name: &str) -> Result<Self, AddressError> {
        if self.is_attribute() || self.segments.is_empty() {
            return Err(AddressError::malformed(
                &self.to_string(),
                "attribute marker must follow an element segment",
            ));
        }
        validate_name(name, name)?;
        Ok(Self {
            segments: self.segments.clone(),
            attribute: Some(name.to_string()),
        })
    }

    /// Element address extended by one segment.
    pub fn join(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self {
            segments,
            attribute: None,
        }
    }

    pub(crate) fn attribute_unchecked(&self, name: &str) -> Self {
        Self {
            segments: self.segments.clone(),
            attribute: Some(name.to_string()),
        }
    }

    pub fn render(&self, form: AddressForm) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(&segment.tag);
            if let Some(id) = &segment.id {
                match form {
                    AddressForm::Full => out.push_str("[@id='"),
                    AddressForm::Abbreviated => out.push_str("['"),
                }
                for c in id.chars() {
                    if c == '\\' || c == '\'' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push_str("']");
            }
        }
        if let Some(name) = &self.attribute {
            out.push_str("/@");
            out.push_str(name);
        }
        out
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_attribute(&self) -> bool {
        self.attribute.is_some()
    }

    pub fn is_element(&self) -> bool {
        self.attribute.is_none()
    }

    /// Attribute name when this is an attribute address.
    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Tag of the last segment.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(Segment::tag)
    }

    /// Id of the last segment.
    pub fn id(&self) -> Result<&str, AddressError> {
        self.segments
            .last()
            .and_then(Segment::id)
            .ok_or_else(|| AddressError::MissingId(self.to_string()))
    }

    /// Tags from the root down to this address, ignoring ids.
    pub fn tag_path(&self) -> Vec<&str> {
        self.segments.iter().map(Segment::tag).collect()
    }

    /// Owning element for an attribute, enclosing element otherwise.
    /// `None` for single-segment elements and the root.
    pub fn parent(&self) -> Option<Self> {
        if self.attribute.is_some() {
            return Some(Self::from_segments(self.segments.clone()));
        }
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self::from_segments(
            self.segments[..self.segments.len() - 1].to_vec(),
        ))
    }

    /// Ancestor elements ordered root to parent, excluding self.
    pub fn ancestors(&self) -> Vec<Self> {
        let end = if self.attribute.is_some() {
            self.segments.len()
        } else {
            self.segments.len().saturating_sub(1)
        };
        (1..=end)
            .map(|len| Self::from_segments(self.segments[..len].to_vec()))
            .collect()
    }

    /// Segments in `range`, optionally re-rooted under `root`. The attribute
    /// marker is kept only when the range reaches the last segment.
    pub fn slice(&self, range: Range<usize>, root: Option<&Self>) -> Result<Self, AddressError> {
        if range.start > range.end || range.end > self.segments.len() {
            return Err(AddressError::malformed(
                &self.to_string(),
                format!(
                    "slice {}..{} out of bounds for {} segments",
                    range.start,
                    range.end,
                    self.segments.len()
                ),
            ));
        }
        let mut segments = match root {
            Some(root) if root.is_attribute() => {
                return Err(AddressError::malformed(
                    &root.to_string(),
                    "cannot re-root under an attribute",
                ))
            }
            Some(root) => root.segments.clone(),
            None => Vec::new(),
        };
        let keeps_tail = range.end == self.segments.len();
        segments.extend_from_slice(&self.segments[range]);
        let attribute = if keeps_tail {
            self.attribute.clone()
        } else {
            None
        };
        if attribute.is_some() && segments.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self {
            segments,
            attribute,
        })
    }

    /// True when `prefix` is an element address whose segments lead this one.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        prefix.is_element()
            && prefix.segments.len() <= self.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// True when this element is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.starts_with(self) && other != self
    }

    /// Remove `prefix` from the front of this address.
    pub fn strip_prefix(&self, prefix: &Self) -> Result<Self, AddressError> {
        if !self.starts_with(prefix) {
            return Err(AddressError::NotAPrefix {
                address: self.to_string(),
                prefix: prefix.to_string(),
            });
        }
        Ok(Self {
            segments: self.segments[prefix.segments.len()..].to_vec(),
            attribute: self.attribute.clone(),
        })
    }

    /// Id of the segment directly below `prefix`, i.e. the worker owning this location.
    pub fn worker_name(&self, prefix: &Self) -> Result<&str, AddressError> {
        if !self.starts_with(prefix) || self.segments.len() <= prefix.segments.len() {
            return Err(AddressError::NotUnderPrefix {
                address: self.to_string(),
                prefix: prefix.to_string(),
            });
        }
        let depth = prefix.segments.len();
        self.segments[depth].id().ok_or_else(|| {
            AddressError::MissingId(Self::from_segments(self.segments[..=depth].to_vec()).to_string())
        })
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(AddressForm::Full))
    }
}

impl FromStr for PathAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PathAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PathAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn validate_name(name: &str, input: &str) -> Result<(), AddressError> {
    if name.is_empty() {
        return Err(AddressError::malformed(input, "empty name"));
    }
    if let Some(c) = name.chars().find(|c| is_reserved(*c)) {
        return Err(AddressError::malformed(
            input,
            format!("invalid character {:?} in name {:?}", c, name),
        ));
    }
    Ok(())
}

fn is_reserved(c: char) -> bool {
    matches!(c, '/' | '[' | ']' | '@' | '=' | '\'' | '"' | '\\') || c.is_whitespace()
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn error(&self, reason: impl Into<String>) -> AddressError {
        AddressError::malformed(self.input, reason)
    }

    fn expect(&mut self, expected: char) -> Result<(), AddressError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!(
                "expected {:?} at position {}, found {:?}",
                expected,
                self.pos - 1,
                c
            ))),
            None => Err(self.error(format!("expected {:?}, found end of input", expected))),
        }
    }

    fn parse(mut self) -> Result<PathAddress, AddressError> {
        if self.chars.is_empty() {
            return Err(AddressError::Empty);
        }
        if self.input == "/" {
            return Ok(PathAddress::root());
        }

        let mut segments = Vec::new();
        let mut attribute = None;
        while self.peek().is_some() {
            if attribute.is_some() {
                return Err(self.error("attribute marker must be the final segment"));
            }
            self.expect('/')?;
            if self.peek() == Some('@') {
                self.bump();
                let name = self.name()?;
                if segments.is_empty() {
                    return Err(self.error("attribute marker must follow an element segment"));
                }
                attribute = Some(name);
                continue;
            }
            let tag = self.name()?;
            let id = if self.peek() == Some('[') {
                Some(self.predicate()?)
            } else {
                None
            };
            segments.push(Segment { tag, id });
        }

        Ok(PathAddress {
            segments,
            attribute,
        })
    }

    fn name(&mut self) -> Result<String, AddressError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '/' || c == '[' {
                break;
            }
            if is_reserved(c) {
                return Err(self.error(format!(
                    "invalid character {:?} at position {}",
                    c, self.pos
                )));
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(format!("empty name at position {}", start)));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// `[@id='v']` or `['v']`
    fn predicate(&mut self) -> Result<String, AddressError> {
        self.expect('[')?;
        if self.peek() == Some('@') {
            self.bump();
            let key = self.name_until('=')?;
            if key != "id" {
                return Err(self.error(format!("unsupported predicate attribute {:?}", key)));
            }
            self.expect('=')?;
        }
        let value = self.quoted()?;
        match self.bump() {
            Some(']') => Ok(value),
            Some(c) => Err(self.error(format!(
                "unbalanced bracket or unescaped quote: found {:?} after id value",
                c
            ))),
            None => Err(self.error("unbalanced bracket: missing ']'")),
        }
    }

    fn name_until(&mut self, stop: char) -> Result<String, AddressError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == stop {
                break;
            }
            if is_reserved(c) {
                return Err(self.error(format!(
                    "invalid character {:?} at position {}",
                    c, self.pos
                )));
            }
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn quoted(&mut self) -> Result<String, AddressError> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            Some(c) => return Err(self.error(format!("expected quote, found {:?}", c))),
            None => return Err(self.error("expected quote, found end of input")),
        };
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c) => value.push(c),
                    None => return Err(self.error("dangling escape in id value")),
                },
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated id value")),
            }
        }
    }
}
