//! Property-keyed batch registry.
//!
//! Maps each distinct property key to the batch holding all instances that
//! share it. Batches are created on first use and never destroyed: clearing
//! the registry only empties their stores, so the derived parameters and
//! the allocated chunks survive from round to round.

use std::collections::HashMap;

use tracing::debug;

use crate::chunked_store::ChunkedStore;
use crate::components::InstanceData;
use crate::config::{PoolConfig, RenderSettings};
use crate::handle::BatchId;
use crate::properties::PropertyKey;

/// One property key, its derived parameters and its instances.
pub struct Batch<K: PropertyKey, T: InstanceData, O> {
    id: BatchId,
    key: K,
    params: K::Params,
    store: ChunkedStore<T, O>,
}

impl<K: PropertyKey, T: InstanceData, O: Copy> Batch<K, T, O> {
    fn new(id: BatchId, key: K, config: &PoolConfig, settings: &RenderSettings) -> Self {
        let params = key.derive_params(settings);
        Self {
            id,
            key,
            params,
            store: ChunkedStore::new(config),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn params(&self) -> &K::Params {
        &self.params
    }

    pub fn store(&self) -> &ChunkedStore<T, O> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChunkedStore<T, O> {
        &mut self.store
    }

    /// Re-derive the shared parameters; instance data is untouched.
    pub fn reinit(&mut self, settings: &RenderSettings) {
        self.params = self.key.derive_params(settings);
    }
}

pub struct Registry<K: PropertyKey, T: InstanceData, O> {
    index: HashMap<K, BatchId>,
    batches: Vec<Batch<K, T, O>>,
    config: PoolConfig,
    settings: RenderSettings,
}

impl<K: PropertyKey, T: InstanceData, O: Copy> Registry<K, T, O> {
    pub fn new(config: PoolConfig, settings: RenderSettings) -> Self {
        Self {
            index: HashMap::new(),
            batches: Vec::new(),
            config,
            settings,
        }
    }

    /// Batch for `key`, created (and its parameters derived) on first use.
    pub fn get_or_create(&mut self, key: &K) -> &mut Batch<K, T, O> {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => {
                let id = BatchId(self.batches.len() as u32);
                debug!(batch = id.0, ?key, "created batch");
                self.batches
                    .push(Batch::new(id, key.clone(), &self.config, &self.settings));
                self.index.insert(key.clone(), id);
                id
            }
        };
        &mut self.batches[id.0 as usize]
    }

    pub fn find(&self, key: &K) -> Option<BatchId> {
        self.index.get(key).copied()
    }

    pub fn batch(&self, id: BatchId) -> Option<&Batch<K, T, O>> {
        self.batches.get(id.0 as usize)
    }

    pub fn batch_mut(&mut self, id: BatchId) -> Option<&mut Batch<K, T, O>> {
        self.batches.get_mut(id.0 as usize)
    }

    /// Visit every batch exactly once.
    pub fn for_each(&self, mut visit: impl FnMut(&Batch<K, T, O>)) {
        self.batches.iter().for_each(&mut visit);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch<K, T, O>> + '_ {
        self.batches.iter()
    }

    /// Number of batches ever created in this registry.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Live instances across all batches.
    pub fn live_count(&self) -> usize {
        self.batches.iter().map(|b| b.store.live_count()).sum()
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Re-derive every batch's parameters from its key under new settings.
    pub fn reinit_all(&mut self, settings: &RenderSettings) {
        self.settings = *settings;
        for batch in &mut self.batches {
            batch.reinit(settings);
        }
    }

    /// Empty every batch; batches and their chunks are kept.
    pub fn clear_all(&mut self) {
        for batch in &mut self.batches {
            batch.store.clear();
        }
    }

    pub fn release_spare_chunks(&mut self) -> usize {
        self.batches
            .iter_mut()
            .map(|b| b.store.release_spare_chunks())
            .sum()
    }
}
