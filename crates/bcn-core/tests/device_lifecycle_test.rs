//! Integration test: decode device creation and teardown
//!
//! Pipeline set construction, the resolved decode path, and cleanup when
//! any part of device setup fails.

mod common;

use std::sync::Arc;

use ash::vk::{self, Handle};
use bcn_core::{DecodeDevice, DecodePath, FormatFamily, LayerError, Registry};
use common::{harness, settings, MissingKernel, RecordingBackend};

#[test]
fn test_pipeline_set_is_built_once() {
    let h = harness(DecodePath::Auto);
    assert_eq!(h.device.decode_path(), DecodePath::Image);
    assert_eq!(h.backend.live_pipelines(), 4);
    assert_eq!(h.backend.live_shader_modules(), 0);
    assert_eq!(h.backend.pool_count(), 1);
}

#[test]
fn test_missing_kernel_fails_device_creation() {
    let backend = RecordingBackend::new();
    let err = DecodeDevice::new(
        vk::Device::from_raw(1),
        backend.clone(),
        Arc::new(Registry::new()),
        settings(DecodePath::Buffer),
        &MissingKernel(FormatFamily::Bc6),
    )
    .unwrap_err();

    assert!(matches!(err, LayerError::Kernel { family: FormatFamily::Bc6, .. }));
    assert_eq!(err.as_vk_result(), vk::Result::ERROR_INITIALIZATION_FAILED);
    assert_eq!(backend.live_pipelines(), 0);
    assert_eq!(backend.pool_count(), 0);
}

#[test]
fn test_pipeline_failure_cleans_up() {
    let backend = RecordingBackend::new();
    *backend.fail_pipelines.lock() = true;
    let err = DecodeDevice::new(
        vk::Device::from_raw(1),
        backend.clone(),
        Arc::new(Registry::new()),
        settings(DecodePath::Image),
        &common::FakeKernels,
    )
    .unwrap_err();

    assert_eq!(err.as_vk_result(), vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    assert_eq!(backend.live_shader_modules(), 0);
    assert_eq!(backend.pool_count(), 0);
}

#[test]
fn test_devices_share_registry_without_interference() {
    let backend = RecordingBackend::new();
    let registry = Arc::new(Registry::new());
    let make = |raw| {
        DecodeDevice::new(
            vk::Device::from_raw(raw),
            backend.clone(),
            registry.clone(),
            settings(DecodePath::Buffer),
            &common::FakeKernels,
        )
        .unwrap()
    };
    let first = make(1);
    let second = make(2);

    let info = vk::BufferCreateInfo::default().size(64);
    let kept = second.create_buffer(&info).unwrap();
    first.create_buffer(&info).unwrap();
    first.destroy();

    registry.with(|t| {
        assert_eq!(t.buffers.len(), 1);
        assert!(t.buffers.lookup(kept).is_some());
    });
}
