//! Vector arena and its on-disk representation.
//!
//! The arena is a single contiguous `f32` buffer holding one fixed-width
//! vector per slot. On disk it is stored in `vectors.arena`:
//! - Header (24 bytes): magic, version, dimension, slot count, epoch
//! - Vectors: contiguous f32 arrays in little-endian format, slot order
//!
//! Files are loaded through a read-only memory map and copied into memory;
//! writes go to a temporary file in the same directory that is renamed over
//! the previous arena, so a reader never sees a half-written file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;
use thiserror::Error;

use crate::vector::types::{Slot, VectorDimension, VectorError};

/// Current arena format version.
const ARENA_VERSION: u32 = 1;

/// Size of the arena header in bytes.
const HEADER_SIZE: usize = 24;

/// Magic bytes to identify arena files.
const MAGIC_BYTES: &[u8; 4] = b"SSVA";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// File name of the arena inside the index directory.
pub const ARENA_FILE_NAME: &str = "vectors.arena";

/// Errors specific to arena storage operations.
#[derive(Error, Debug)]
pub enum ArenaStorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid arena format: {0}")]
    InvalidFormat(String),

    #[error(
        "Invalid arena version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// In-memory append-only vector arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Arena {
    dimension: VectorDimension,
    data: Vec<f32>,
}

impl Arena {
    /// Creates an empty arena for vectors of `dimension`.
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Creates an arena over an existing buffer.
    ///
    /// The buffer length must be a multiple of the dimension.
    pub fn from_raw(dimension: VectorDimension, data: Vec<f32>) -> Result<Self, ArenaStorageError> {
        if data.len() % dimension.get() != 0 {
            return Err(ArenaStorageError::InvalidFormat(format!(
                "buffer of {} floats is not a multiple of dimension {}",
                data.len(),
                dimension.get()
            )));
        }
        Ok(Self { dimension, data })
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Number of slots, live or tombstoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension.get()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a vector at the next slot.
    pub fn push(&mut self, vector: &[f32]) -> Result<Slot, VectorError> {
        self.dimension.validate_vector(vector)?;
        let slot = Slot::new(self.len() as u32);
        self.data.extend_from_slice(vector);
        Ok(slot)
    }

    /// Returns the vector stored at `slot`.
    #[must_use]
    pub fn vector(&self, slot: Slot) -> Option<&[f32]> {
        let dim = self.dimension.get();
        let start = slot.index().checked_mul(dim)?;
        self.data.get(start..start + dim)
    }

    /// Raw contiguous buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Path of the arena file inside `base_path`.
pub fn arena_path(base_path: &Path) -> PathBuf {
    base_path.join(ARENA_FILE_NAME)
}

/// Writes `arena` to `path`, replacing any previous file.
pub fn write_arena(path: &Path, arena: &Arena, epoch: u64) -> Result<(), ArenaStorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write_header(&mut writer, arena.dimension(), arena.len(), epoch)?;

        let mut bytes = Vec::with_capacity(arena.as_slice().len() * BYTES_PER_F32);
        for value in arena.as_slice() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        writer.write_all(&bytes)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ArenaStorageError::Io(e.error))?;

    Ok(())
}

/// Reads an arena file, returning the arena and its epoch.
pub fn read_arena(path: &Path) -> Result<(Arena, u64), ArenaStorageError> {
    let file = File::open(path)?;
    if file.metadata()?.len() < HEADER_SIZE as u64 {
        return Err(ArenaStorageError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }

    let mmap = unsafe { MmapOptions::new().map(&file)? };
    let header = read_header(&mmap)?;

    let dim = header.dimension.get();
    let expected_len = header
        .count
        .checked_mul(dim)
        .and_then(|floats| floats.checked_mul(BYTES_PER_F32))
        .and_then(|bytes| bytes.checked_add(HEADER_SIZE))
        .ok_or_else(|| {
            ArenaStorageError::InvalidFormat(format!(
                "header declares {} vectors of dimension {dim}, which overflows",
                header.count
            ))
        })?;
    if mmap.len() != expected_len {
        return Err(ArenaStorageError::InvalidFormat(format!(
            "expected {expected_len} bytes for {} vectors of dimension {dim}, found {}",
            header.count,
            mmap.len()
        )));
    }

    let data: Vec<f32> = mmap[HEADER_SIZE..]
        .chunks_exact(BYTES_PER_F32)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let arena = Arena::from_raw(header.dimension, data)?;
    Ok((arena, header.epoch))
}

struct ArenaHeader {
    dimension: VectorDimension,
    count: usize,
    epoch: u64,
}

fn write_header(
    writer: &mut impl Write,
    dimension: VectorDimension,
    count: usize,
    epoch: u64,
) -> Result<(), io::Error> {
    writer.write_all(MAGIC_BYTES)?;
    writer.write_all(&ARENA_VERSION.to_le_bytes())?;
    writer.write_all(&(dimension.get() as u32).to_le_bytes())?;
    writer.write_all(&(count as u32).to_le_bytes())?;
    writer.write_all(&epoch.to_le_bytes())?;
    Ok(())
}

fn read_header(bytes: &[u8]) -> Result<ArenaHeader, ArenaStorageError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ArenaStorageError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }

    if &bytes[0..4] != MAGIC_BYTES {
        return Err(ArenaStorageError::InvalidFormat(
            "Invalid magic bytes".to_string(),
        ));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != ARENA_VERSION {
        return Err(ArenaStorageError::VersionMismatch {
            expected: ARENA_VERSION,
            actual: version,
        });
    }

    let dim_value = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let dimension = VectorDimension::new(dim_value as usize)?;

    let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;

    let mut epoch_bytes = [0u8; 8];
    epoch_bytes.copy_from_slice(&bytes[16..24]);
    let epoch = u64::from_le_bytes(epoch_bytes);

    Ok(ArenaHeader {
        dimension,
        count,
        epoch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dim(n: usize) -> VectorDimension {
        VectorDimension::new(n).unwrap()
    }

    #[test]
    fn test_push_assigns_sequential_slots() {
        let mut arena = Arena::new(dim(2));
        assert!(arena.is_empty());

        assert_eq!(arena.push(&[1.0, 0.0]).unwrap(), Slot::new(0));
        assert_eq!(arena.push(&[0.0, 1.0]).unwrap(), Slot::new(1));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.vector(Slot::new(1)), Some(&[0.0, 1.0][..]));
        assert_eq!(arena.vector(Slot::new(2)), None);
    }

    #[test]
    fn test_push_rejects_wrong_dimension() {
        let mut arena = Arena::new(dim(3));
        assert!(arena.push(&[1.0, 0.0]).is_err());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = arena_path(temp_dir.path());

        let mut arena = Arena::new(dim(3));
        arena.push(&[1.0, 2.0, 3.0]).unwrap();
        arena.push(&[4.0, 5.0, 6.0]).unwrap();

        write_arena(&path, &arena, 7).unwrap();
        let (loaded, epoch) = read_arena(&path).unwrap();

        assert_eq!(epoch, 7);
        assert_eq!(loaded, arena);
    }

    #[test]
    fn test_empty_arena_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = arena_path(temp_dir.path());

        write_arena(&path, &Arena::new(dim(4)), 0).unwrap();
        let (loaded, _) = read_arena(&path).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension(), dim(4));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let temp_dir = TempDir::new().unwrap();
        let path = arena_path(temp_dir.path());
        std::fs::write(&path, [0u8; 32]).unwrap();

        assert!(matches!(
            read_arena(&path),
            Err(ArenaStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = arena_path(temp_dir.path());

        let mut arena = Arena::new(dim(2));
        arena.push(&[1.0, 2.0]).unwrap();
        write_arena(&path, &arena, 0).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(matches!(
            read_arena(&path),
            Err(ArenaStorageError::InvalidFormat(_))
        ));
    }

    fn write_header_only(path: &Path, dimension: u32, count: u32) {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&ARENA_VERSION.to_le_bytes());
        bytes.extend_from_slice(&dimension.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_rejects_header_with_overflowing_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = arena_path(temp_dir.path());
        write_header_only(&path, u32::MAX, u32::MAX);

        assert!(matches!(
            read_arena(&path),
            Err(ArenaStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rejects_count_larger_than_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = arena_path(temp_dir.path());
        write_header_only(&path, 4, 1_000);

        assert!(matches!(
            read_arena(&path),
            Err(ArenaStorageError::InvalidFormat(_))
        ));
    }
}
