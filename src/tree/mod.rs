//! Restricted configuration trees
//!
//! Desired and observed machine configuration are both held as restricted
//! trees: named nodes with either text or children, addressed by
//! [`PathAddress`].

pub mod document;
pub mod node;
pub mod path;

pub use document::{ConfigTree, Position, Resolved};
pub use node::{Node, ID_ATTRIBUTE};
pub use path::{AddressForm, PathAddress, Segment};
