//! Integration test: descriptor pool growth
//!
//! Decode sets come from fixed 32-set pools. Running past a pool's capacity
//! must grow the pool list transparently; a pool that cannot satisfy even
//! a fresh allocation fails the request with `PoolExhausted`.

mod common;

use ash::vk;
use bcn_core::descriptor_pool::{DescriptorPoolManager, POOL_CAPACITY};
use bcn_core::{DecodePath, LayerError};
use common::{harness, Call, RecordingBackend};

#[test]
fn test_allocations_beyond_one_pool_succeed() {
    let h = harness(DecodePath::Image);
    let image = h.image(vk::Format::BC1_RGBA_UNORM_BLOCK, 64, 64);
    let src = h.upload_buffer(4096);
    let cb = h.command_buffer();

    // Nothing is reclaimed while recording, so every copy needs a new set.
    for _ in 0..POOL_CAPACITY + 8 {
        h.copy(cb, src, image, 64, 64);
    }

    let dispatches = h
        .backend
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Dispatch { .. }))
        .count();
    assert_eq!(dispatches, (POOL_CAPACITY + 8) as usize);
    assert_eq!(h.device.descriptor_pool_count(), 2);
    assert_eq!(h.backend.live_sets(), (POOL_CAPACITY + 8) as usize);
}

#[test]
fn test_pool_count_is_bounded_by_in_flight_decodes() {
    let h = harness(DecodePath::Buffer);
    let image = h.image(vk::Format::BC3_UNORM_BLOCK, 16, 16);
    let src = h.upload_buffer(256);

    // Ten rounds each one decode past a pool's capacity, every round waited
    // on before the next. The idle first pool is reused, not replaced.
    for round in 0..10 {
        let cb = h.command_buffer();
        let fence = h.fence();
        for _ in 0..POOL_CAPACITY + 1 {
            h.copy(cb, src, image, 16, 16);
        }
        h.submit(cb, fence);
        h.backend.signal(fence);
        h.device.wait_for_fences(&[fence], true, u64::MAX).unwrap();
        assert_eq!(h.backend.live_sets(), 0, "round {}", round);
        assert_eq!(h.device.descriptor_pool_count(), 2, "round {}", round);
    }

    assert_eq!(h.backend.pool_count(), 2);
    assert_eq!(h.backend.double_frees(), 0);
}

#[test]
fn test_idle_pool_is_recycled_before_growing() {
    let backend = RecordingBackend::new();
    let mut pools = DescriptorPoolManager::new(
        backend.as_ref(),
        vk::DescriptorSetLayout::null(),
        vk::DescriptorType::STORAGE_BUFFER,
    )
    .unwrap();

    let first: Vec<_> = (0..POOL_CAPACITY + 1)
        .map(|_| pools.allocate(backend.as_ref()).unwrap())
        .collect();
    assert_eq!(pools.pool_count(), 2);
    assert_eq!(pools.live_sets(), (POOL_CAPACITY + 1) as usize);
    for (pool, set) in first {
        pools.free(backend.as_ref(), pool, set);
    }
    assert_eq!(pools.live_sets(), 0);

    // The second pool serves 32 again, then the idle first one takes over.
    for _ in 0..POOL_CAPACITY + 1 {
        pools.allocate(backend.as_ref()).unwrap();
    }
    assert_eq!(pools.pool_count(), 2);
    assert_eq!(backend.pool_count(), 2);
    assert_eq!(backend.live_sets(), (POOL_CAPACITY + 1) as usize);
}

#[test]
fn test_second_failure_is_pool_exhausted() {
    let backend = RecordingBackend::new();
    *backend.pool_capacity.lock() = Some(0);
    let mut pools = DescriptorPoolManager::new(
        backend.as_ref(),
        vk::DescriptorSetLayout::null(),
        vk::DescriptorType::STORAGE_IMAGE,
    )
    .unwrap();

    let err = pools.allocate(backend.as_ref()).unwrap_err();
    assert!(matches!(err, LayerError::PoolExhausted { pools: 2 }));
    assert_eq!(err.as_vk_result(), vk::Result::ERROR_OUT_OF_POOL_MEMORY);

    // The first pool has no live sets, so the next request retries it
    // instead of growing; it still fails only once.
    let err = pools.allocate(backend.as_ref()).unwrap_err();
    assert!(matches!(err, LayerError::PoolExhausted { pools: 2 }));
    assert_eq!(pools.pool_count(), 2);
}

#[test]
fn test_exhausted_decode_is_skipped_not_recorded() {
    let h = harness(DecodePath::Image);
    *h.backend.pool_capacity.lock() = Some(0);
    let image = h.image(vk::Format::BC7_UNORM_BLOCK, 8, 8);
    let src = h.upload_buffer(64);
    let cb = h.command_buffer();

    // The first pool still has its 32 sets.
    for _ in 0..POOL_CAPACITY {
        h.copy(cb, src, image, 8, 8);
    }
    h.backend.clear_calls();
    h.copy(cb, src, image, 8, 8);

    assert!(h.backend.calls().is_empty());
    assert_eq!(h.backend.live_views(), POOL_CAPACITY as usize);
}
