//! Integration test: end-to-end upload
//!
//! Creates a compressed image, records a block-aligned upload through the
//! intercepted copy, submits it with a fence and waits, on both decode
//! paths.
//!
//! Run with: cargo test --test end_to_end_test -- --nocapture

mod common;

use ash::vk;
use bcn_core::DecodePath;
use common::{harness, Harness};

fn upload(h: &Harness, format: vk::Format) -> vk::Image {
    let image = h.image(format, 64, 64);
    let src = h.upload_buffer(64 * 64);
    let cb = h.command_buffer();
    let fence = h.fence();

    h.device.cmd_copy_buffer_to_image(
        cb,
        src,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[common::region(64, 64)],
    );
    h.submit(cb, fence);
    h.backend.signal(fence);
    h.device.wait_for_fences(&[fence], true, u64::MAX).unwrap();
    println!("{:?} via {:?}: {:?}", format, h.device.decode_path(), h.backend.call_names());
    image
}

#[test]
fn test_bc7_upload() {
    for path in [DecodePath::Image, DecodePath::Buffer] {
        let h = harness(path);
        let image = upload(&h, vk::Format::BC7_UNORM_BLOCK);

        assert_eq!(h.backend.image_format(image), Some(vk::Format::R8G8B8A8_UNORM));
        h.registry.with(|t| {
            let shadow = t.images.lookup(image).unwrap();
            assert_eq!(shadow.format, vk::Format::BC7_UNORM_BLOCK);
            assert_eq!(shadow.device_format(), vk::Format::R8G8B8A8_UNORM);
        });
        assert_eq!(
            h.backend.image_layout(image),
            Some(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        );
        assert_eq!(h.backend.submissions(), 1);
        assert_eq!(h.backend.live_sets(), 0);
        assert_eq!(h.backend.live_views(), 0);
        assert_eq!(h.backend.live_memory(), 0);
    }
}

#[test]
fn test_bc6h_upload() {
    for path in [DecodePath::Image, DecodePath::Buffer] {
        let h = harness(path);
        let image = upload(&h, vk::Format::BC6H_UFLOAT_BLOCK);

        assert_eq!(
            h.backend.image_format(image),
            Some(vk::Format::R16G16B16A16_SFLOAT)
        );
        assert_eq!(
            h.backend.image_layout(image),
            Some(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        );
        assert_eq!(h.backend.live_sets(), 0);
        assert_eq!(h.backend.double_frees(), 0);
    }
}
