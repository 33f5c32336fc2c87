//! Integration test: memory type selection
//!
//! Run with: cargo test -p ngf-vk --test memory_test

use ash::vk;
use ash::vk::MemoryPropertyFlags as F;
use ngf_core::types::BufferStorage;
use ngf_vk::memory::{find_memory_type, storage_flags};

fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
    let mut props = vk::PhysicalDeviceMemoryProperties::default();
    for (i, f) in flags.iter().enumerate() {
        props.memory_types[i].property_flags = *f;
    }
    props.memory_type_count = flags.len() as u32;
    props
}

#[test]
fn test_host_writeable_prefers_device_local_mapping() {
    ngf_common::try_init_logging();
    let p = props(&[
        F::DEVICE_LOCAL,
        F::HOST_VISIBLE | F::HOST_COHERENT,
        F::HOST_VISIBLE | F::HOST_COHERENT | F::DEVICE_LOCAL,
    ]);
    let (req, pref) = storage_flags(BufferStorage::HostWriteable);
    assert_eq!(find_memory_type(&p, 0b111, req, pref), Some(2));
    // Type 2 masked out: first type meeting the requirement.
    assert_eq!(find_memory_type(&p, 0b011, req, pref), Some(1));
}

#[test]
fn test_private_storage_needs_device_local() {
    ngf_common::try_init_logging();
    let p = props(&[F::HOST_VISIBLE | F::HOST_COHERENT, F::DEVICE_LOCAL]);
    let (req, pref) = storage_flags(BufferStorage::Private);
    assert_eq!(find_memory_type(&p, 0b11, req, pref), Some(1));
}

#[test]
fn test_type_bits_filter_candidates() {
    ngf_common::try_init_logging();
    let p = props(&[F::DEVICE_LOCAL, F::DEVICE_LOCAL]);
    assert_eq!(find_memory_type(&p, 0b10, F::DEVICE_LOCAL, F::empty()), Some(1));
    assert_eq!(find_memory_type(&p, 0b00, F::DEVICE_LOCAL, F::empty()), None);
    assert_eq!(find_memory_type(&p, 0b11, F::HOST_VISIBLE, F::empty()), None);
}
