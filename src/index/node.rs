//! Index nodes
//!
//! A node is one page. Leaves map each key to a list of pointers and are
//! chained left to right through `next`; internal nodes route a key to the
//! child covering it.
//!
//! ```text
//! internal:   keys      [ k0 | k1 | k2 ]
//!             children  [ c0 | c1 | c2 | c3 ]
//!             c0 < k0 <= c1 < k1 <= c2 < k2 <= c3
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::address::PageAddress;
use crate::codec::Record;
use crate::config::MIN_INDEX_ORDER;
use crate::error::{PageKvError, Result};

/// Position of the first key strictly greater than `key`, or `keys.len()`
///
/// In an internal node this is the child to descend into; in a leaf it is
/// where a new key would be inserted.
pub fn find_index<K: Ord>(keys: &[K], key: &K) -> usize {
    keys.partition_point(|existing| existing <= key)
}

/// Fewest keys a non-root node may hold after a split or merge
pub fn minimum_keys(order: u32) -> usize {
    (order.max(1) as usize - 1) / 2
}

fn check_order(order: u32) -> Result<()> {
    if order < MIN_INDEX_ORDER {
        return Err(PageKvError::InvalidArgument(format!(
            "index order must be at least {}, got {}",
            MIN_INDEX_ORDER, order
        )));
    }
    Ok(())
}

// =============================================================================
// Leaf Node
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafNode<K, P> {
    pub address: PageAddress,
    pub order: u32,
    /// Ascending, no duplicates
    pub keys: Vec<K>,
    /// `pointers[i]` belongs to `keys[i]`; never empty
    pub pointers: Vec<Vec<P>>,
    /// Right sibling in the leaf chain
    pub next: Option<PageAddress>,
}

impl<K: Ord + Clone, P: PartialEq> LeafNode<K, P> {
    pub fn new(address: PageAddress, order: u32) -> Result<Self> {
        check_order(order)?;
        Ok(Self {
            address,
            order,
            keys: Vec::new(),
            pointers: Vec::new(),
            next: None,
        })
    }

    pub fn is_full(&self) -> bool {
        self.keys.len() == self.order as usize
    }

    /// Record `pointer` under `key`; false if it was already there
    pub fn insert(&mut self, key: K, pointer: P) -> bool {
        match self.keys.binary_search(&key) {
            Ok(i) => {
                if self.pointers[i].contains(&pointer) {
                    return false;
                }
                self.pointers[i].push(pointer);
                true
            }
            Err(i) => {
                self.keys.insert(i, key);
                self.pointers.insert(i, vec![pointer]);
                true
            }
        }
    }

    /// Pointers stored under `key`
    pub fn pointers_for(&self, key: &K) -> Option<&[P]> {
        self.keys
            .binary_search(key)
            .ok()
            .map(|i| self.pointers[i].as_slice())
    }

    /// Move the upper half into a new leaf at `sibling_address`
    ///
    /// Returns the separator (the sibling's first key) and the sibling, or
    /// `None` without touching `self` if the leaf is not full or a half would
    /// fall below the minimum. The sibling is linked in right after `self`.
    pub fn split(&mut self, sibling_address: PageAddress) -> Option<(K, LeafNode<K, P>)> {
        if !self.is_full() || self.keys.len() < 2 {
            return None;
        }

        let midpoint = self.keys.len() / 2;
        let minimum = minimum_keys(self.order);
        if midpoint < minimum || self.keys.len() - midpoint < minimum {
            return None;
        }

        let keys = self.keys.split_off(midpoint);
        let pointers = self.pointers.split_off(midpoint);
        let separator = keys[0].clone();

        let sibling = LeafNode {
            address: sibling_address.clone(),
            order: self.order,
            keys,
            pointers,
            next: self.next.take(),
        };
        self.next = Some(sibling_address);

        Some((separator, sibling))
    }

    /// Absorb the right sibling `other`
    ///
    /// Refused (false, nothing moved) if the result would exceed
    /// `order - 1` keys or if `other` does not sort after `self`.
    pub fn merge(&mut self, other: &mut LeafNode<K, P>) -> bool {
        if self.keys.len() + other.keys.len() > (self.order as usize).saturating_sub(1) {
            return false;
        }
        if let (Some(last), Some(first)) = (self.keys.last(), other.keys.first()) {
            if first <= last {
                return false;
            }
        }

        self.keys.append(&mut other.keys);
        self.pointers.append(&mut other.pointers);
        self.next = other.next.take();
        true
    }
}

// =============================================================================
// Internal Node
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalNode<K> {
    pub address: PageAddress,
    pub order: u32,
    /// Ascending separators
    pub keys: Vec<K>,
    /// Always `keys.len() + 1` entries
    pub children: Vec<PageAddress>,
}

impl<K: Ord + Clone> InternalNode<K> {
    /// New root over two children split apart at `separator`
    pub fn new_root(
        address: PageAddress,
        order: u32,
        left: PageAddress,
        separator: K,
        right: PageAddress,
    ) -> Result<Self> {
        check_order(order)?;
        Ok(Self {
            address,
            order,
            keys: vec![separator],
            children: vec![left, right],
        })
    }

    pub fn is_full(&self) -> bool {
        self.keys.len() == self.order as usize
    }

    /// Child covering `key`
    pub fn child_for(&self, key: &K) -> Option<&PageAddress> {
        self.children.get(find_index(&self.keys, key))
    }

    /// Register `child` as the right neighbour of `children[index]`
    pub fn insert_child(&mut self, index: usize, separator: K, child: PageAddress) {
        self.keys.insert(index, separator);
        self.children.insert(index + 1, child);
    }

    /// Move the upper half into a new node at `sibling_address`
    ///
    /// The middle key moves up: it is returned as the separator and kept in
    /// neither half. `None` (no mutation) if the node is not full or a half
    /// would fall below the minimum.
    pub fn split(&mut self, sibling_address: PageAddress) -> Option<(K, InternalNode<K>)> {
        if !self.is_full() {
            return None;
        }

        // Number of children the left half keeps
        let midpoint = (self.keys.len() + 1) / 2;
        let minimum = minimum_keys(self.order);
        if midpoint == 0 || midpoint - 1 < minimum || self.keys.len() - midpoint < minimum {
            return None;
        }

        let keys = self.keys.split_off(midpoint);
        let children = self.children.split_off(midpoint);
        let separator = self.keys.pop()?;

        let sibling = InternalNode {
            address: sibling_address,
            order: self.order,
            keys,
            children,
        };

        Some((separator, sibling))
    }

    /// Absorb the right sibling `other`, pulling `separator` down between them
    ///
    /// Refused (false, nothing moved) if the result would exceed
    /// `order - 1` keys.
    pub fn merge(&mut self, separator: K, other: &mut InternalNode<K>) -> bool {
        if self.keys.len() + 1 + other.keys.len() > (self.order as usize).saturating_sub(1) {
            return false;
        }

        self.keys.push(separator);
        self.keys.append(&mut other.keys);
        self.children.append(&mut other.children);
        true
    }
}

// =============================================================================
// Node
// =============================================================================

/// One index page, resolved to its kind once on load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node<K, P> {
    Leaf(LeafNode<K, P>),
    Internal(InternalNode<K>),
}

impl<K, P> Record for Node<K, P>
where
    K: Serialize + DeserializeOwned,
    P: Serialize + DeserializeOwned,
{
    const TAG: [u8; 4] = *b"PKND";
}

impl<K: Ord + Clone, P: PartialEq> Node<K, P> {
    pub fn address(&self) -> &PageAddress {
        match self {
            Node::Leaf(leaf) => &leaf.address,
            Node::Internal(internal) => &internal.address,
        }
    }

    pub fn keys(&self) -> &[K] {
        match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        }
    }

    pub fn order(&self) -> u32 {
        match self {
            Node::Leaf(leaf) => leaf.order,
            Node::Internal(internal) => internal.order,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn is_full(&self) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.is_full(),
            Node::Internal(internal) => internal.is_full(),
        }
    }

    pub fn split(&mut self, sibling_address: PageAddress) -> Option<(K, Node<K, P>)> {
        match self {
            Node::Leaf(leaf) => leaf
                .split(sibling_address)
                .map(|(separator, sibling)| (separator, Node::Leaf(sibling))),
            Node::Internal(internal) => internal
                .split(sibling_address)
                .map(|(separator, sibling)| (separator, Node::Internal(sibling))),
        }
    }

    /// Merge the right sibling `other` into this node
    ///
    /// `separator` is the parent key between the two; leaves ignore it.
    /// Nodes of different kinds are never merged.
    pub fn merge(&mut self, separator: K, other: &mut Node<K, P>) -> bool {
        match (self, other) {
            (Node::Leaf(leaf), Node::Leaf(other)) => leaf.merge(other),
            (Node::Internal(internal), Node::Internal(other)) => internal.merge(separator, other),
            _ => false,
        }
    }
}
