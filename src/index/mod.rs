//! Paged Index Module
//!
//! A B+-tree whose nodes are individually stored as backing-cache entries
//! under generated addresses.
//!
//! ## Responsibilities
//! - Keyed insert, with one key fanning out to many pointers
//! - Split-on-overflow propagated toward the root
//! - Descent-based search and ordered traversal of the leaf chain
//!
//! ## Layout
//! ```text
//! {key}              IndexHeader { root, order }
//! {key}_{hex id}     Node (leaf or internal), one per page
//! ```
//!
//! Deletion and the underflow handling that would decide when to merge
//! are not implemented; `merge` exists on nodes but nothing calls it yet.

mod node;
mod tree;

pub use node::{find_index, minimum_keys, InternalNode, LeafNode, Node};
pub use tree::{IndexHeader, Leaves, PagedIndex, Search};
