//! Paged B+-tree
//!
//! Insert and search over nodes stored one per cache entry, with the root
//! address kept in a header entry at the tree's own address.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::address::PageAddress;
use crate::cache::BackingCache;
use crate::codec::{self, Record};
use crate::config::{Config, MIN_INDEX_ORDER};
use crate::error::{PageKvError, Result};

use super::node::{find_index, InternalNode, LeafNode, Node};

/// Header stored at the tree's address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    /// Current root node; replaced whenever the root splits
    pub root: PageAddress,
    /// Maximum keys per node, fixed at creation
    pub order: u32,
}

impl Record for IndexHeader {
    const TAG: [u8; 4] = *b"PKIX";
}

/// Outcome of inserting below one node
struct Insertion<K> {
    /// Whether the pointer was newly recorded
    added: bool,
    /// Separator and new sibling to register in the parent
    promoted: Option<(K, PageAddress)>,
}

/// Duplicate-tolerant ordered index whose nodes live in a backing cache
///
/// Each key maps to a set of pointers. Nodes split on overflow; nothing is
/// ever merged or deleted.
///
/// An insert rewrites several pages with no transaction around them. Pages
/// are written child first (new sibling, then the split node, then its
/// parent, then the header), so an interrupted insert leaves at worst an
/// unreferenced sibling page.
pub struct PagedIndex<C, K, P> {
    cache: C,
    address: PageAddress,
    header: IndexHeader,
    _marker: PhantomData<fn() -> (K, P)>,
}

impl<C, K, P> PagedIndex<C, K, P>
where
    C: BackingCache,
    K: Ord + Clone + Serialize + DeserializeOwned,
    P: PartialEq + Clone + Serialize + DeserializeOwned,
{
    /// Create an empty index at `address`
    ///
    /// Fails if something is already stored there.
    pub fn create(cache: C, address: PageAddress, order: u32) -> Result<Self> {
        if order < MIN_INDEX_ORDER {
            return Err(PageKvError::InvalidArgument(format!(
                "index order must be at least {}, got {}",
                MIN_INDEX_ORDER, order
            )));
        }

        if cache.contains(&address)? {
            return Err(PageKvError::InvalidArgument(format!(
                "address {} is already in use",
                address
            )));
        }

        let root: LeafNode<K, P> = LeafNode::new(address.generate_child(), order)?;
        let header = IndexHeader {
            root: root.address.clone(),
            order,
        };

        codec::store(&cache, &header.root, &Node::Leaf(root))?;
        codec::store(&cache, &address, &header)?;
        debug!(index = %address, order, "Created index");

        Ok(Self {
            cache,
            address,
            header,
            _marker: PhantomData,
        })
    }

    /// Open the index stored at `address`; `NotFound` if there is none
    pub fn open(cache: C, address: PageAddress) -> Result<Self> {
        let header: IndexHeader = codec::load(&cache, &address)?
            .ok_or_else(|| PageKvError::NotFound(format!("index {}", address)))?;

        if header.order < MIN_INDEX_ORDER {
            return Err(PageKvError::Corruption(format!(
                "index {} has order {}",
                address, header.order
            )));
        }

        Ok(Self {
            cache,
            address,
            header,
            _marker: PhantomData,
        })
    }

    /// Open the index at `address`, creating it with `order` if absent
    pub fn open_or_create(cache: C, address: PageAddress, order: u32) -> Result<Self> {
        if cache.contains(&address)? {
            Self::open(cache, address)
        } else {
            Self::create(cache, address, order)
        }
    }

    /// Open or create using the configured order
    pub fn with_config(cache: C, address: PageAddress, config: &Config) -> Result<Self> {
        Self::open_or_create(cache, address, config.index_order)
    }

    /// Reload the header, picking up root changes made by other handles
    pub fn refresh(&mut self) -> Result<()> {
        self.header = codec::load(&self.cache, &self.address)?
            .ok_or_else(|| PageKvError::NotFound(format!("index {}", self.address)))?;
        Ok(())
    }

    // =========================================================================
    // Index Operations
    // =========================================================================

    /// Record `pointer` under `key`
    ///
    /// Returns false if the pair was already present (nothing is written).
    pub fn insert(&mut self, key: K, pointer: P) -> Result<bool> {
        let root = self.header.root.clone();
        let insertion = self.insert_below(&root, key, pointer)?;

        if let Some((separator, sibling)) = insertion.promoted {
            let new_root = InternalNode::new_root(
                self.address.generate_child(),
                self.header.order,
                root,
                separator,
                sibling,
            )?;
            let root_address = new_root.address.clone();
            self.store_node(&Node::Internal(new_root))?;

            self.header.root = root_address;
            codec::store(&self.cache, &self.address, &self.header)?;
            debug!(index = %self.address, root = %self.header.root, "Root split, index grew a level");
        }

        Ok(insertion.added)
    }

    /// Lazily look up the pointers stored under `key`
    ///
    /// Nothing is read until the first call to `next`. An absent key yields
    /// an empty sequence.
    pub fn search(&self, key: &K) -> Search<'_, C, K, P> {
        Search {
            index: self,
            key: key.clone(),
            state: SearchState::Pending,
        }
    }

    /// Pointers stored under `key`, empty if absent
    pub fn get(&self, key: &K) -> Result<Vec<P>> {
        let mut address = self.header.root.clone();
        loop {
            match self.load_node(&address)? {
                Node::Internal(internal) => {
                    address = internal.child_for(key).cloned().ok_or_else(|| {
                        PageKvError::Corruption(format!(
                            "node {} has {} keys but {} children",
                            internal.address,
                            internal.keys.len(),
                            internal.children.len()
                        ))
                    })?;
                }
                Node::Leaf(leaf) => {
                    return Ok(leaf.pointers_for(key).map(<[P]>::to_vec).unwrap_or_default());
                }
            }
        }
    }

    /// Deleting entries is not supported
    pub fn remove(&mut self, _key: &K) -> Result<()> {
        Err(PageKvError::Unsupported(
            "removing keys from a paged index".to_string(),
        ))
    }

    /// Walk the leaf chain from the leftmost leaf
    pub fn leaves(&self) -> Leaves<'_, C, K, P> {
        Leaves {
            index: self,
            next: None,
            started: false,
        }
    }

    /// Every key with its pointers, in ascending key order
    pub fn entries(&self) -> Result<Vec<(K, Vec<P>)>> {
        let mut entries = Vec::new();
        for leaf in self.leaves() {
            let leaf = leaf?;
            entries.extend(leaf.keys.into_iter().zip(leaf.pointers));
        }
        Ok(entries)
    }

    /// Number of levels from the root to the leaves
    pub fn depth(&self) -> Result<usize> {
        let mut depth = 1;
        let mut address = self.header.root.clone();
        while let Node::Internal(internal) = self.load_node(&address)? {
            address = self.first_child(&internal)?;
            depth += 1;
        }
        Ok(depth)
    }

    /// Load one node page
    pub fn load_node(&self, address: &PageAddress) -> Result<Node<K, P>> {
        codec::load(&self.cache, address)?.ok_or_else(|| {
            PageKvError::Corruption(format!(
                "index {} references missing node {}",
                self.address, address
            ))
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn address(&self) -> &PageAddress {
        &self.address
    }

    pub fn root_address(&self) -> &PageAddress {
        &self.header.root
    }

    pub fn order(&self) -> u32 {
        self.header.order
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn insert_below(&self, address: &PageAddress, key: K, pointer: P) -> Result<Insertion<K>> {
        match self.load_node(address)? {
            Node::Leaf(mut leaf) => {
                if !leaf.insert(key, pointer) {
                    trace!(node = %address, "Pointer already present");
                    return Ok(Insertion {
                        added: false,
                        promoted: None,
                    });
                }

                let promoted = self.store_splitting(Node::Leaf(leaf))?;
                Ok(Insertion {
                    added: true,
                    promoted,
                })
            }
            Node::Internal(mut internal) => {
                let index = find_index(&internal.keys, &key);
                let child = internal.children.get(index).cloned().ok_or_else(|| {
                    PageKvError::Corruption(format!(
                        "node {} has no child at {}",
                        internal.address, index
                    ))
                })?;

                let insertion = self.insert_below(&child, key, pointer)?;
                match insertion.promoted {
                    Some((separator, sibling)) => {
                        internal.insert_child(index, separator, sibling);
                        let promoted = self.store_splitting(Node::Internal(internal))?;
                        Ok(Insertion {
                            added: insertion.added,
                            promoted,
                        })
                    }
                    None => Ok(insertion),
                }
            }
        }
    }

    /// Store `node`, splitting it first if it filled up
    ///
    /// Returns the separator and sibling address the parent must register.
    fn store_splitting(&self, mut node: Node<K, P>) -> Result<Option<(K, PageAddress)>> {
        let mut promoted = None;

        if node.is_full() {
            match node.split(self.address.generate_child()) {
                Some((separator, sibling)) => {
                    self.store_node(&sibling)?;
                    debug!(
                        node = %node.address(),
                        sibling = %sibling.address(),
                        leaf = node.is_leaf(),
                        "Split full node"
                    );
                    promoted = Some((separator, sibling.address().clone()));
                }
                None => {
                    warn!(node = %node.address(), "Full node could not be split");
                }
            }
        }

        self.store_node(&node)?;
        Ok(promoted)
    }

    fn store_node(&self, node: &Node<K, P>) -> Result<()> {
        codec::store(&self.cache, node.address(), node)
    }

    fn first_child(&self, internal: &InternalNode<K>) -> Result<PageAddress> {
        internal.children.first().cloned().ok_or_else(|| {
            PageKvError::Corruption(format!("node {} has no children", internal.address))
        })
    }

    fn leftmost_leaf(&self) -> Result<PageAddress> {
        let mut address = self.header.root.clone();
        while let Node::Internal(internal) = self.load_node(&address)? {
            address = self.first_child(&internal)?;
        }
        Ok(address)
    }
}

// =============================================================================
// Search
// =============================================================================

enum SearchState<P> {
    Pending,
    Yielding(std::vec::IntoIter<P>),
    Done,
}

/// Lazy, restartable sequence of the pointers stored under one key
pub struct Search<'a, C, K, P> {
    index: &'a PagedIndex<C, K, P>,
    key: K,
    state: SearchState<P>,
}

impl<C, K, P> Search<'_, C, K, P> {
    /// Forget progress; the next call to `next` descends the tree again
    pub fn restart(&mut self) {
        self.state = SearchState::Pending;
    }
}

impl<C, K, P> Iterator for Search<'_, C, K, P>
where
    C: BackingCache,
    K: Ord + Clone + Serialize + DeserializeOwned,
    P: PartialEq + Clone + Serialize + DeserializeOwned,
{
    type Item = Result<P>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                SearchState::Pending => match self.index.get(&self.key) {
                    Ok(pointers) => self.state = SearchState::Yielding(pointers.into_iter()),
                    Err(e) => {
                        self.state = SearchState::Done;
                        return Some(Err(e));
                    }
                },
                SearchState::Yielding(pointers) => match pointers.next() {
                    Some(pointer) => return Some(Ok(pointer)),
                    None => self.state = SearchState::Done,
                },
                SearchState::Done => return None,
            }
        }
    }
}

// =============================================================================
// Leaf Chain
// =============================================================================

/// Iterator over the leaves in ascending key order
pub struct Leaves<'a, C, K, P> {
    index: &'a PagedIndex<C, K, P>,
    next: Option<PageAddress>,
    started: bool,
}

impl<C, K, P> Iterator for Leaves<'_, C, K, P>
where
    C: BackingCache,
    K: Ord + Clone + Serialize + DeserializeOwned,
    P: PartialEq + Clone + Serialize + DeserializeOwned,
{
    type Item = Result<LeafNode<K, P>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            match self.index.leftmost_leaf() {
                Ok(address) => self.next = Some(address),
                Err(e) => return Some(Err(e)),
            }
        }

        let address = self.next.take()?;
        match self.index.load_node(&address) {
            Ok(Node::Leaf(leaf)) => {
                self.next = leaf.next.clone();
                Some(Ok(leaf))
            }
            Ok(Node::Internal(_)) => Some(Err(PageKvError::Corruption(format!(
                "leaf chain reaches internal node {}",
                address
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
