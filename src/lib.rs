//! # pagekv
//!
//! Storage primitives built on a plain namespaced key-value cache that only
//! offers get/set/remove/contains on single entries:
//! - Segmented streams: seekable byte streams split into fixed-size chunks
//! - Paged index: a B+-tree with one node per cache entry
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │      SegmentStream       │   │        PagedIndex        │
//! │ seek/read/write/truncate │   │  insert/search/leaves    │
//! └────────────┬─────────────┘   └────────────┬─────────────┘
//!              │  header + segments           │  header + nodes
//!              └──────────────┬───────────────┘
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 BackingCache (PageAddress → bytes)          │
//! │          MemoryCache │ FileCache │ MeasuredCache            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every multi-page operation is a sequence of single-page writes with no
//! transaction around it. Handles are single-threaded, and two handles on
//! the same address race without detection.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod address;
pub mod cache;
pub mod codec;
pub mod index;
pub mod lock;
pub mod stream;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use address::PageAddress;
pub use cache::{BackingCache, FileCache, MemoryCache};
pub use config::Config;
pub use error::{PageKvError, Result};
pub use index::PagedIndex;
pub use lock::CacheLock;
pub use stream::{SegmentStream, StreamOptions};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pagekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
