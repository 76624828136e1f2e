//! Vector storage and exact similarity search.
//!
//! Vectors live in a contiguous append-only arena. Each product owns one
//! slot; removal only unmaps the slot, and `compact` rewrites the arena
//! without tombstones. Search is a brute-force inner product over every live
//! slot, parallelized with rayon.
//!
//! # Storage
//! Two artifacts live in the index directory:
//! - `vectors.arena`: binary header plus little-endian f32 vectors
//! - `mapping.json`: id↔slot mapping and product metadata

mod index;
mod mapping;
pub mod math;
mod storage;
mod types;

pub use index::{DEFAULT_CANDIDATE_MULTIPLIER, IndexStats, SearchHit, VectorIndex};
pub use mapping::{IndexMapping, MAPPING_FILE_NAME, MappingError};
pub use storage::{ARENA_FILE_NAME, Arena, ArenaStorageError};
pub use types::{
    Slot, UNIT_NORM_TOLERANCE, VECTOR_DIMENSION_512, VectorDimension, VectorError,
};
