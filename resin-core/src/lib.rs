//! Resin persists graphs of immutable nodes into a growable byte region and reads
//! them back lazily.
//!
//! Core concepts:
//! - **Region**: a growable, byte-addressable buffer (in memory or a mapped file)
//! - **Reference**: a packed `u64` naming an ident, an inline scalar or a record
//! - **Record**: a tagged block appended once and never modified
//! - **Node**: an immutable value or expression; decoded arrays, strings and binaries
//!   are views that read the region on demand
//! - **Mold**: owns a region, writes nodes (children first, deduplicated) and decodes
//!   references back into nodes
//!
//! # Example
//!
//! ```
//! use resin_core::{Mold, Node};
//!
//! let mold = Mold::in_memory()?;
//! let ab = mold.put(&Node::string("ab"))?;
//! let root = mold.set(&Node::array(vec![Node::Integer(1), Node::string("ab"), Node::Bool(true)]))?;
//!
//! // The array stores a reference to the string written before.
//! assert_eq!(mold.reusables(), vec![ab, mold.put(&Node::Integer(1))?, root]);
//! # Ok::<(), resin_core::Error>(())
//! ```
//!
//! # Layout
//!
//! A region starts with a 24-byte [`Header`]: magic, next free address and root
//! reference, all little-endian. Records follow at 8-byte aligned addresses. A crash
//! in the middle of a write may leave unreachable bytes behind; there is no recovery.

mod arena;
mod array;
mod binary;
mod cache;
mod config;
mod decode;
mod encode;
mod error;
pub mod hash;
pub mod header;
mod index;
mod key;
mod mold;
mod node;
pub mod record;
mod reference;
mod region;
mod text;
mod view;

pub use arena::{ALIGNMENT, Arena};
pub use array::Array;
pub use binary::Binary;
pub use config::{DEFAULT_GROW_STEP, MoldConfig};
pub use error::{Error, Result};
pub use header::{HEADER_SIZE, Header, MAGIC};
pub use index::{BucketTable, MIN_BUCKETS, bucket_count_for};
pub use mold::{Mold, MoldStats};
pub use node::{Call, Deferred, Native, Node, NodeKind, Proxy};
pub use reference::{KIND_BITS, Kind, MAX_PAYLOAD, PAYLOAD_BITS, Reference};
pub use region::{MemoryRegion, Region, RegionError, checked_range};
pub use text::Text;
