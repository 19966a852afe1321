//! Page addressing
//!
//! Every page (stream header, segment, index node, index header) lives in
//! exactly one backing-cache entry identified by a namespace and a key.
//!
//! ## Key Naming
//! ```text
//! stream header      {key}
//! stream segment     {key}_{segment_index}
//! index header       {key}
//! index node         {key}_{random 128-bit hex}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of one backing-cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageAddress {
    /// Optional region of the cache; `None` is the default namespace
    namespace: Option<String>,
    /// Key within the namespace
    key: String,
}

impl PageAddress {
    /// Address in the default namespace
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            namespace: None,
            key: key.into(),
        }
    }

    /// Address in an explicit namespace (`None` means the default one)
    pub fn with_namespace(namespace: Option<String>, key: impl Into<String>) -> Self {
        Self {
            namespace,
            key: key.into(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Address of segment `index` belonging to the stream stored here
    pub fn segment(&self, index: u64) -> PageAddress {
        Self {
            namespace: self.namespace.clone(),
            key: format!("{}_{}", self.key, index),
        }
    }

    /// Fresh address for a node owned by the tree stored here
    pub fn generate_child(&self) -> PageAddress {
        let id: u128 = rand::random();
        Self {
            namespace: self.namespace.clone(),
            key: format!("{}_{:032x}", self.key, id),
        }
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.key),
            None => write!(f, "{}", self.key),
        }
    }
}
