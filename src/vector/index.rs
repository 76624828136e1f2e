//! Exact brute-force vector index over an append-only arena.
//!
//! The index keeps the arena, the id↔slot mapping and product metadata in one
//! immutable snapshot. Readers clone the current `Arc<IndexSnapshot>` and scan
//! it without holding any lock. Writers serialize on a write gate, build the
//! next snapshot, persist it and only then publish it, so a failed mutation
//! leaves the visible state untouched and a reader never sees a torn state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{ProductPatch, ProductRecord};
use crate::error::{EngineError, EngineResult};
use crate::vector::mapping::{self, IndexMapping, MappingError};
use crate::vector::math::{dot, normalized};
use crate::vector::storage::{self, Arena, ArenaStorageError};
use crate::vector::types::{Slot, VectorDimension, VectorError};

/// Default candidate pool size relative to the requested limit.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 5;

/// One scored match from a scan.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub slot: Slot,
    /// Inner product with the query; cosine similarity for unit vectors.
    pub score: f32,
    pub product: Arc<ProductRecord>,
}

/// Point-in-time counters for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_slots: usize,
    pub live_vectors: usize,
    pub tombstones: usize,
    pub dimension: usize,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
struct IndexSnapshot {
    arena: Arc<Arena>,
    mapping: IndexMapping,
    epoch: u64,
}

impl IndexSnapshot {
    fn empty(dimension: VectorDimension) -> Self {
        Self {
            arena: Arc::new(Arena::new(dimension)),
            mapping: IndexMapping::default(),
            epoch: 0,
        }
    }
}

/// Which artifacts a mutation has to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    Nothing,
    Mapping,
    All,
}

/// Shared, persistent vector index.
#[derive(Debug)]
pub struct VectorIndex {
    base_path: PathBuf,
    dimension: VectorDimension,
    candidate_multiplier: usize,
    current: RwLock<Arc<IndexSnapshot>>,
    /// Serializes writers. Holds `true` while the arena on disk may differ
    /// from the published snapshot, after a mutation failed between the
    /// arena and mapping writes.
    write_gate: Mutex<bool>,
}

impl VectorIndex {
    /// Opens the index stored in `base_path`, or starts empty when the
    /// directory holds neither artifact.
    ///
    /// Corrupt or mutually inconsistent artifacts are reported as
    /// [`EngineError::Fatal`].
    pub fn open(base_path: impl AsRef<Path>, dimension: VectorDimension) -> EngineResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let snapshot = load_snapshot(&base_path, dimension)?;

        info!(
            path = %base_path.display(),
            live = snapshot.mapping.live_count(),
            slots = snapshot.arena.len(),
            epoch = snapshot.epoch,
            "Opened vector index"
        );

        Ok(Self {
            base_path,
            dimension,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            current: RwLock::new(Arc::new(snapshot)),
            write_gate: Mutex::new(false),
        })
    }

    /// Sets how many candidates per requested result `search_candidates` returns.
    #[must_use]
    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of live products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().mapping.live_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().mapping.contains(id)
    }

    /// Adds a product and its vector.
    ///
    /// The vector is normalized before storage. Re-adding a live id replaces
    /// it: the old slot becomes a tombstone.
    pub fn add(&self, id: &str, vector: &[f32], mut metadata: ProductRecord) -> EngineResult<Slot> {
        let unit = self.prepare_vector(id, vector)?;
        metadata.id = id.to_string();

        self.mutate(|next| {
            let slot = Arc::make_mut(&mut next.arena).push(&unit)?;
            if let Some(old) = next.mapping.assign(metadata, slot) {
                debug!(id, old_slot = %old, new_slot = %slot, "Replaced existing product");
            }
            Ok((slot, Persist::All))
        })
    }

    /// Adds many products with a single persistence write.
    ///
    /// Every item is validated before anything is appended; one bad item
    /// rejects the whole batch.
    pub fn add_batch(&self, items: Vec<(ProductRecord, Vec<f32>)>) -> EngineResult<Vec<Slot>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = items
            .into_iter()
            .map(|(product, vector)| {
                let unit = self.prepare_vector(&product.id, &vector)?;
                Ok((product, unit))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let count = prepared.len();
        let slots = self.mutate(|next| {
            let arena = Arc::make_mut(&mut next.arena);
            let mut slots = Vec::with_capacity(prepared.len());
            for (product, unit) in prepared {
                let slot = arena.push(&unit)?;
                next.mapping.assign(product, slot);
                slots.push(slot);
            }
            Ok((slots, Persist::All))
        })?;

        info!(count, "Added product batch");
        Ok(slots)
    }

    /// Tombstones the product's slot and drops its metadata.
    ///
    /// Returns `false` without touching anything when the id is not mapped.
    pub fn remove(&self, id: &str) -> EngineResult<bool> {
        self.mutate(|next| match next.mapping.unmap(id) {
            Some(slot) => {
                debug!(id, %slot, "Removed product");
                Ok((true, Persist::Mapping))
            }
            None => Ok((false, Persist::Nothing)),
        })
    }

    /// Merges `patch` into the stored metadata.
    pub fn update(&self, id: &str, patch: ProductPatch) -> EngineResult<Arc<ProductRecord>> {
        self.mutate(|next| {
            let mut record = next
                .mapping
                .product(id)
                .map(|p| ProductRecord::clone(p))
                .ok_or_else(|| EngineError::not_found(id))?;
            patch.apply(&mut record);
            next.mapping.replace_product(record);

            let updated = next
                .mapping
                .product(id)
                .cloned()
                .ok_or_else(|| EngineError::not_found(id))?;
            Ok((updated, Persist::Mapping))
        })
    }

    /// Stored unit vector of a live product.
    pub fn reconstruct(&self, id: &str) -> EngineResult<Vec<f32>> {
        let snapshot = self.snapshot();
        snapshot
            .mapping
            .slot_of(id)
            .and_then(|slot| snapshot.arena.vector(slot))
            .map(<[f32]>::to_vec)
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Metadata of a live product.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ProductRecord>> {
        self.snapshot().mapping.product(id).cloned()
    }

    /// Every live product, in slot order.
    #[must_use]
    pub fn products(&self) -> Vec<Arc<ProductRecord>> {
        let snapshot = self.snapshot();
        snapshot
            .mapping
            .live_slots()
            .filter_map(|(_, id)| snapshot.mapping.product(id).cloned())
            .collect()
    }

    /// Top `limit` live products by inner product with `query`.
    ///
    /// Ordered by score descending, ties by ascending slot.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        exclude: &HashSet<String>,
    ) -> EngineResult<Vec<SearchHit>> {
        self.validate_query(query)?;
        Ok(scan(&self.snapshot(), query, exclude, limit))
    }

    /// Candidate pool for downstream ranking: `limit × multiplier` hits,
    /// capped at the number of live products.
    pub fn search_candidates(
        &self,
        query: &[f32],
        limit: usize,
        exclude: &HashSet<String>,
    ) -> EngineResult<Vec<SearchHit>> {
        self.validate_query(query)?;
        let snapshot = self.snapshot();
        let pool = limit
            .saturating_mul(self.candidate_multiplier)
            .min(snapshot.mapping.live_count());
        Ok(scan(&snapshot, query, exclude, pool))
    }

    /// Rewrites the arena with live slots only and bumps the epoch.
    ///
    /// Returns the number of reclaimed slots.
    pub fn compact(&self) -> EngineResult<usize> {
        let reclaimed = self.mutate(|next| {
            let reclaimed = next.mapping.tombstone_count();
            if reclaimed == 0 {
                return Ok((0, Persist::Nothing));
            }

            let mut arena = Arena::new(self.dimension);
            let mut mapping = IndexMapping::default();
            for (old_slot, id) in next.mapping.live_slots() {
                let (Some(vector), Some(product)) =
                    (next.arena.vector(old_slot), next.mapping.product(id))
                else {
                    continue;
                };
                let slot = arena.push(vector)?;
                mapping.assign(ProductRecord::clone(product), slot);
            }

            next.arena = Arc::new(arena);
            next.mapping = mapping;
            next.epoch += 1;
            Ok((reclaimed, Persist::All))
        })?;

        if reclaimed > 0 {
            info!(reclaimed, "Compacted vector index");
        }
        Ok(reclaimed)
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot();
        IndexStats {
            total_slots: snapshot.arena.len(),
            live_vectors: snapshot.mapping.live_count(),
            tombstones: snapshot.arena.len() - snapshot.mapping.live_count(),
            dimension: self.dimension.get(),
            epoch: snapshot.epoch,
        }
    }

    fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read())
    }

    fn prepare_vector(&self, id: &str, vector: &[f32]) -> EngineResult<Vec<f32>> {
        if id.trim().is_empty() {
            return Err(EngineError::invalid_input("product id must not be empty"));
        }
        self.dimension.validate_vector(vector)?;
        Ok(normalized(vector)?)
    }

    fn validate_query(&self, query: &[f32]) -> EngineResult<()> {
        self.dimension.validate_vector(query)?;
        if let Some(position) = query.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite { position }.into());
        }
        Ok(())
    }

    /// Applies `f` to a copy of the current snapshot, persists the result and
    /// publishes it. Mutations are serialized by the write gate.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut IndexSnapshot) -> EngineResult<(T, Persist)>,
    ) -> EngineResult<T> {
        let mut arena_stale = self.write_gate.lock();

        let mut next = IndexSnapshot::clone(&self.snapshot());
        let (value, mut persist) = f(&mut next)?;

        if persist != Persist::Nothing {
            if *arena_stale {
                debug!("Rewriting arena left behind by a failed write");
                persist = Persist::All;
            }
            if persist == Persist::All {
                *arena_stale = true;
            }
            self.persist(&next, persist)?;
            *arena_stale = false;
            *self.current.write() = Arc::new(next);
        }
        Ok(value)
    }

    fn persist(&self, snapshot: &IndexSnapshot, persist: Persist) -> EngineResult<()> {
        if persist == Persist::All {
            let path = storage::arena_path(&self.base_path);
            storage::write_arena(&path, &snapshot.arena, snapshot.epoch)
                .map_err(|e| arena_error(path, e))?;
        }

        let path = mapping::mapping_path(&self.base_path);
        let file = snapshot.mapping.to_file(self.dimension.get(), snapshot.epoch);
        mapping::write_mapping(&path, &file).map_err(|e| mapping_error(path, e))
    }
}

fn scan(
    snapshot: &IndexSnapshot,
    query: &[f32],
    exclude: &HashSet<String>,
    limit: usize,
) -> Vec<SearchHit> {
    if limit == 0 || snapshot.arena.is_empty() {
        return Vec::new();
    }

    let dim = snapshot.arena.dimension().get();
    let mapping = &snapshot.mapping;

    let mut scored: Vec<(Slot, f32)> = snapshot
        .arena
        .as_slice()
        .par_chunks_exact(dim)
        .enumerate()
        .filter_map(|(i, vector)| {
            let slot = Slot::new(i as u32);
            let id = mapping.id_at(slot)?;
            if exclude.contains(id.as_ref()) {
                return None;
            }
            Some((slot, dot(query, vector)))
        })
        .collect();

    let by_rank = |a: &(Slot, f32), b: &(Slot, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
    if limit < scored.len() {
        scored.select_nth_unstable_by(limit, by_rank);
        scored.truncate(limit);
    }
    scored.sort_unstable_by(by_rank);

    scored
        .into_iter()
        .filter_map(|(slot, score)| {
            let id = mapping.id_at(slot)?;
            let product = mapping.product(id)?;
            Some(SearchHit {
                id: id.to_string(),
                slot,
                score,
                product: Arc::clone(product),
            })
        })
        .collect()
}

fn load_snapshot(base_path: &Path, dimension: VectorDimension) -> EngineResult<IndexSnapshot> {
    let arena_path = storage::arena_path(base_path);
    let mapping_path = mapping::mapping_path(base_path);

    match (arena_path.exists(), mapping_path.exists()) {
        (false, false) => {
            debug!(path = %base_path.display(), "No index artifacts found, starting empty");
            return Ok(IndexSnapshot::empty(dimension));
        }
        (true, false) => {
            return Err(EngineError::fatal(
                mapping_path,
                "mapping file is missing while the vector arena exists",
            ));
        }
        (false, true) => {
            return Err(EngineError::fatal(
                arena_path,
                "vector arena is missing while the mapping file exists",
            ));
        }
        (true, true) => {}
    }

    let (arena, arena_epoch) =
        storage::read_arena(&arena_path).map_err(|e| EngineError::fatal(&arena_path, e.to_string()))?;
    if arena.dimension() != dimension {
        return Err(EngineError::fatal(
            &arena_path,
            format!(
                "arena dimension {} differs from configured dimension {}",
                arena.dimension().get(),
                dimension.get()
            ),
        ));
    }

    let file = mapping::read_mapping(&mapping_path)
        .map_err(|e| EngineError::fatal(&mapping_path, e.to_string()))?;
    if file.dimension != dimension.get() {
        return Err(EngineError::fatal(
            &mapping_path,
            format!(
                "mapping dimension {} differs from configured dimension {}",
                file.dimension,
                dimension.get()
            ),
        ));
    }
    if file.epoch != arena_epoch {
        return Err(EngineError::fatal(
            &mapping_path,
            format!(
                "mapping epoch {} does not match arena epoch {arena_epoch}; a compaction was interrupted",
                file.epoch
            ),
        ));
    }

    let mapped_slots = file.slot_count;
    let mapping = IndexMapping::from_file(file, arena.len())
        .map_err(|e| EngineError::fatal(&mapping_path, e.to_string()))?;
    if arena.len() > mapped_slots {
        warn!(
            extra = arena.len() - mapped_slots,
            "Arena holds vectors the mapping does not know; loading them as tombstones"
        );
    }

    Ok(IndexSnapshot {
        arena: Arc::new(arena),
        mapping,
        epoch: arena_epoch,
    })
}

fn arena_error(path: PathBuf, error: ArenaStorageError) -> EngineError {
    match error {
        ArenaStorageError::Io(source) => EngineError::Persistence { path, source },
        ArenaStorageError::Vector(e) => EngineError::InvalidVector(e),
        other => EngineError::fatal(path, other.to_string()),
    }
}

fn mapping_error(path: PathBuf, error: MappingError) -> EngineError {
    match error {
        MappingError::Io(source) => EngineError::Persistence { path, source },
        other => EngineError::fatal(path, other.to_string()),
    }
}
