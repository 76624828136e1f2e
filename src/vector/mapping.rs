//! Bidirectional id↔slot mapping plus per-product metadata.
//!
//! A slot whose entry in `slot_to_id` is `None` is a tombstone: the arena
//! still holds its vector but no product points at it.
//!
//! The mapping is persisted as `mapping.json` next to the arena. The file
//! records the arena slot count and epoch it was written against so the
//! loader can detect artifacts that belong to different generations.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ProductRecord;
use crate::vector::types::Slot;

/// Current mapping format version.
const MAPPING_VERSION: u32 = 1;

/// File name of the mapping inside the index directory.
pub const MAPPING_FILE_NAME: &str = "mapping.json";

/// Errors specific to mapping persistence.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed mapping file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "Invalid mapping version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Inconsistent mapping: {0}")]
    Inconsistent(String),
}

/// In-memory id↔slot association and product metadata.
#[derive(Debug, Clone, Default)]
pub struct IndexMapping {
    id_to_slot: HashMap<String, Slot>,
    slot_to_id: Vec<Option<Arc<str>>>,
    products: HashMap<String, Arc<ProductRecord>>,
}

impl IndexMapping {
    /// Creates an empty mapping covering `slot_count` tombstoned slots.
    pub fn with_slots(slot_count: usize) -> Self {
        Self {
            slot_to_id: vec![None; slot_count],
            ..Self::default()
        }
    }

    /// Maps `product.id` to `slot`, replacing any previous association.
    ///
    /// Returns the slot the id pointed at before, which is now a tombstone.
    pub fn assign(&mut self, product: ProductRecord, slot: Slot) -> Option<Slot> {
        let id: Arc<str> = Arc::from(product.id.as_str());

        if slot.index() >= self.slot_to_id.len() {
            self.slot_to_id.resize(slot.index() + 1, None);
        }

        let previous = self.id_to_slot.insert(product.id.clone(), slot);
        if let Some(old) = previous
            && old != slot
        {
            self.slot_to_id[old.index()] = None;
        }

        self.slot_to_id[slot.index()] = Some(id);
        self.products.insert(product.id.clone(), Arc::new(product));
        previous.filter(|old| *old != slot)
    }

    /// Removes the id, tombstoning its slot. Returns the freed slot.
    pub fn unmap(&mut self, id: &str) -> Option<Slot> {
        let slot = self.id_to_slot.remove(id)?;
        if let Some(entry) = self.slot_to_id.get_mut(slot.index()) {
            *entry = None;
        }
        self.products.remove(id);
        Some(slot)
    }

    /// Replaces the stored metadata of an already mapped product.
    pub fn replace_product(&mut self, product: ProductRecord) -> bool {
        if !self.id_to_slot.contains_key(&product.id) {
            return false;
        }
        self.products.insert(product.id.clone(), Arc::new(product));
        true
    }

    #[must_use]
    pub fn slot_of(&self, id: &str) -> Option<Slot> {
        self.id_to_slot.get(id).copied()
    }

    #[must_use]
    pub fn id_at(&self, slot: Slot) -> Option<&Arc<str>> {
        self.slot_to_id.get(slot.index())?.as_ref()
    }

    #[must_use]
    pub fn product(&self, id: &str) -> Option<&Arc<ProductRecord>> {
        self.products.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.id_to_slot.contains_key(id)
    }

    /// Iterates over live `(slot, id)` pairs in slot order.
    pub fn live_slots(&self) -> impl Iterator<Item = (Slot, &Arc<str>)> {
        self.slot_to_id
            .iter()
            .enumerate()
            .filter_map(|(i, id)| id.as_ref().map(|id| (Slot::new(i as u32), id)))
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.id_to_slot.len()
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_to_id.len()
    }

    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.slot_count() - self.live_count()
    }

    /// Serializable form of the mapping.
    pub fn to_file(&self, dimension: usize, epoch: u64) -> MappingFile {
        let entries = self
            .live_slots()
            .filter_map(|(slot, id)| {
                self.products.get(id.as_ref()).map(|product| MappingEntry {
                    slot: slot.get(),
                    product: ProductRecord::clone(product),
                })
            })
            .collect();

        MappingFile {
            version: MAPPING_VERSION,
            dimension,
            epoch,
            slot_count: self.slot_count(),
            entries,
        }
    }

    /// Rebuilds the mapping from its serialized form.
    ///
    /// `arena_slots` is the number of slots in the arena loaded alongside.
    /// Arena slots beyond the mapping's own slot count become tombstones.
    pub fn from_file(file: MappingFile, arena_slots: usize) -> Result<Self, MappingError> {
        if file.version != MAPPING_VERSION {
            return Err(MappingError::VersionMismatch {
                expected: MAPPING_VERSION,
                actual: file.version,
            });
        }
        if file.slot_count > arena_slots {
            return Err(MappingError::Inconsistent(format!(
                "mapping covers {} slots but the arena holds only {arena_slots}",
                file.slot_count
            )));
        }

        let mut mapping = Self::with_slots(arena_slots);
        for entry in file.entries {
            let slot = Slot::new(entry.slot);
            if slot.index() >= file.slot_count {
                return Err(MappingError::Inconsistent(format!(
                    "product '{}' points at slot {slot} beyond slot count {}",
                    entry.product.id, file.slot_count
                )));
            }
            if mapping.id_at(slot).is_some() {
                return Err(MappingError::Inconsistent(format!(
                    "slot {slot} is mapped more than once"
                )));
            }
            if mapping.contains(&entry.product.id) {
                return Err(MappingError::Inconsistent(format!(
                    "product '{}' is mapped more than once",
                    entry.product.id
                )));
            }
            mapping.assign(entry.product, slot);
        }

        Ok(mapping)
    }
}

/// On-disk mapping document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingFile {
    pub version: u32,
    pub dimension: usize,
    pub epoch: u64,
    pub slot_count: usize,
    pub entries: Vec<MappingEntry>,
}

/// One live product and the slot holding its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub slot: u32,
    pub product: ProductRecord,
}

/// Path of the mapping file inside `base_path`.
pub fn mapping_path(base_path: &Path) -> PathBuf {
    base_path.join(MAPPING_FILE_NAME)
}

/// Writes the mapping document, replacing any previous file.
pub fn write_mapping(path: &Path, file: &MappingFile) -> Result<(), MappingError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, file)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| MappingError::Io(e.error))?;
    Ok(())
}

/// Reads a mapping document.
pub fn read_mapping(path: &Path) -> Result<MappingFile, MappingError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn product(id: &str) -> ProductRecord {
        ProductRecord::new(id).with_brand("Zara")
    }

    #[test]
    fn test_assign_and_unmap() {
        let mut mapping = IndexMapping::default();
        assert_eq!(mapping.assign(product("a"), Slot::new(0)), None);
        assert_eq!(mapping.assign(product("b"), Slot::new(1)), None);

        assert_eq!(mapping.slot_of("b"), Some(Slot::new(1)));
        assert_eq!(mapping.id_at(Slot::new(0)).map(|s| s.as_ref()), Some("a"));
        assert_eq!(mapping.live_count(), 2);

        assert_eq!(mapping.unmap("a"), Some(Slot::new(0)));
        assert_eq!(mapping.unmap("a"), None);
        assert!(mapping.id_at(Slot::new(0)).is_none());
        assert!(mapping.product("a").is_none());
        assert_eq!(mapping.slot_count(), 2);
        assert_eq!(mapping.tombstone_count(), 1);
    }

    #[test]
    fn test_reassign_tombstones_previous_slot() {
        let mut mapping = IndexMapping::default();
        mapping.assign(product("a"), Slot::new(0));
        assert_eq!(mapping.assign(product("a"), Slot::new(1)), Some(Slot::new(0)));

        assert!(mapping.id_at(Slot::new(0)).is_none());
        assert_eq!(mapping.slot_of("a"), Some(Slot::new(1)));
        assert_eq!(mapping.live_count(), 1);
        assert_eq!(mapping.tombstone_count(), 1);
    }

    #[test]
    fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = mapping_path(temp_dir.path());

        let mut mapping = IndexMapping::default();
        mapping.assign(product("a"), Slot::new(0));
        mapping.assign(product("b"), Slot::new(1));
        mapping.unmap("a");

        write_mapping(&path, &mapping.to_file(4, 3)).unwrap();
        let file = read_mapping(&path).unwrap();
        assert_eq!(file.epoch, 3);
        assert_eq!(file.dimension, 4);

        let loaded = IndexMapping::from_file(file, 2).unwrap();
        assert_eq!(loaded.slot_of("b"), Some(Slot::new(1)));
        assert!(!loaded.contains("a"));
        assert_eq!(loaded.slot_count(), 2);
    }

    #[test]
    fn test_extra_arena_slots_become_tombstones() {
        let mut mapping = IndexMapping::default();
        mapping.assign(product("a"), Slot::new(0));

        let loaded = IndexMapping::from_file(mapping.to_file(4, 0), 3).unwrap();
        assert_eq!(loaded.slot_count(), 3);
        assert_eq!(loaded.tombstone_count(), 2);
    }

    #[test]
    fn test_rejects_mapping_larger_than_arena() {
        let mut mapping = IndexMapping::default();
        mapping.assign(product("a"), Slot::new(0));
        mapping.assign(product("b"), Slot::new(1));

        let result = IndexMapping::from_file(mapping.to_file(4, 0), 1);
        assert!(matches!(result, Err(MappingError::Inconsistent(_))));
    }

    #[test]
    fn test_rejects_duplicate_slots() {
        let file = MappingFile {
            version: MAPPING_VERSION,
            dimension: 4,
            epoch: 0,
            slot_count: 1,
            entries: vec![
                MappingEntry {
                    slot: 0,
                    product: product("a"),
                },
                MappingEntry {
                    slot: 0,
                    product: product("b"),
                },
            ],
        };
        assert!(matches!(
            IndexMapping::from_file(file, 1),
            Err(MappingError::Inconsistent(_))
        ));
    }
}
