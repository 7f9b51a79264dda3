use ash::vk;
use tracing::{debug, warn};

use crate::backend::DeviceBackend;
use crate::error::{LayerError, LayerResult};

/// Sets per pool.
pub const POOL_CAPACITY: u32 = 32;

/// What to do after an allocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolDecision {
    UseCurrent,
    GrowAndRetry,
    Fail,
}

impl PoolDecision {
    /// Grow once on pool exhaustion, never twice for the same request.
    pub fn after(result: vk::Result, already_grew: bool) -> Self {
        match result {
            vk::Result::SUCCESS => PoolDecision::UseCurrent,
            result if is_exhaustion(result) && !already_grew => PoolDecision::GrowAndRetry,
            _ => PoolDecision::Fail,
        }
    }
}

/// A pool plus the number of its sets that have not been freed.
#[derive(Debug, Clone, Copy)]
struct PoolSlot {
    pool: vk::DescriptorPool,
    live: u32,
}

/// Growable list of fixed-capacity descriptor pools for decode sets.
///
/// Allocation targets the newest pool. On exhaustion an older pool whose sets
/// have all been freed is moved to the back before a new one is created, so
/// the pool count follows peak in-flight decodes.
pub struct DescriptorPoolManager {
    pools: Vec<PoolSlot>,
    layout: vk::DescriptorSetLayout,
    destination_type: vk::DescriptorType,
}

impl DescriptorPoolManager {
    /// `destination_type` is the binding 0 type of `layout`.
    pub fn new(
        backend: &dyn DeviceBackend,
        layout: vk::DescriptorSetLayout,
        destination_type: vk::DescriptorType,
    ) -> LayerResult<Self> {
        let mut manager = Self {
            pools: Vec::new(),
            layout,
            destination_type,
        };
        manager.grow(backend)?;
        Ok(manager)
    }

    fn grow(&mut self, backend: &dyn DeviceBackend) -> LayerResult<vk::DescriptorPool> {
        let sizes = pool_sizes(self.destination_type);
        let pool = backend
            .create_descriptor_pool(POOL_CAPACITY, &sizes)
            .map_err(LayerError::backend("vkCreateDescriptorPool"))?;
        self.pools.push(PoolSlot { pool, live: 0 });
        debug!("descriptor pool {} created ({:?})", self.pools.len(), pool);
        Ok(pool)
    }

    /// Make an idle older pool the newest one. Returns false if every older
    /// pool still has live sets.
    fn recycle(&mut self) -> bool {
        let newest = self.pools.len().saturating_sub(1);
        let Some(idle) = self.pools[..newest].iter().position(|slot| slot.live == 0) else {
            return false;
        };
        let slot = self.pools.remove(idle);
        debug!("reusing idle descriptor pool {:?}", slot.pool);
        self.pools.push(slot);
        true
    }

    /// Allocate one decode set, recycling or growing the pool list at most once.
    pub fn allocate(&mut self, backend: &dyn DeviceBackend) -> LayerResult<(vk::DescriptorPool, vk::DescriptorSet)> {
        let mut grew = false;
        loop {
            let pool = match self.pools.last() {
                Some(slot) => slot.pool,
                None => {
                    grew = true;
                    self.grow(backend)?
                }
            };
            let result = match backend.allocate_descriptor_set(pool, self.layout) {
                Ok(set) => {
                    if let Some(slot) = self.pools.last_mut() {
                        slot.live += 1;
                    }
                    return Ok((pool, set));
                }
                Err(result) => result,
            };
            match PoolDecision::after(result, grew) {
                PoolDecision::GrowAndRetry => {
                    if !self.recycle() {
                        self.grow(backend)?;
                    }
                    grew = true;
                }
                _ if is_exhaustion(result) => {
                    warn!("descriptor allocation failed after growing to {} pools", self.pools.len());
                    return Err(LayerError::PoolExhausted {
                        pools: self.pools.len(),
                    });
                }
                _ => return Err(LayerError::backend("vkAllocateDescriptorSets")(result)),
            }
        }
    }

    /// Return `set` to `pool`. Sets of pools already destroyed are dropped.
    pub fn free(&mut self, backend: &dyn DeviceBackend, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        let Some(slot) = self.pools.iter_mut().find(|slot| slot.pool == pool) else {
            warn!("descriptor set {:?} outlived its pool {:?}", set, pool);
            return;
        };
        slot.live = slot.live.saturating_sub(1);
        backend.free_descriptor_set(pool, set);
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Sets handed out and not yet freed, across every pool.
    pub fn live_sets(&self) -> usize {
        self.pools.iter().map(|slot| slot.live as usize).sum()
    }

    pub fn destroy(&mut self, backend: &dyn DeviceBackend) {
        for slot in self.pools.drain(..) {
            backend.destroy_descriptor_pool(slot.pool);
        }
    }
}

fn is_exhaustion(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL
    )
}

fn pool_sizes(destination_type: vk::DescriptorType) -> Vec<vk::DescriptorPoolSize> {
    if destination_type == vk::DescriptorType::STORAGE_BUFFER {
        vec![vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 2 * POOL_CAPACITY,
        }]
    } else {
        vec![
            vk::DescriptorPoolSize {
                ty: destination_type,
                descriptor_count: POOL_CAPACITY,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: POOL_CAPACITY,
            },
        ]
    }
}
