//! Integration test: descriptor set emulation
//!
//! Run with: cargo test -p ngf-core --test descriptor_test

use ngf_core::descriptor::{
    validate_layout, DescriptorPayload, DescriptorWrite, EmulatedDescriptorSet,
};
use ngf_core::types::{DescriptorInfo, DescriptorSetLayoutInfo, DescriptorType, StageFlags};
use ngf_core::{ErrorCode, Handle, HostAllocator};

fn layout() -> DescriptorSetLayoutInfo {
    let d = |ty, id| DescriptorInfo {
        ty,
        id,
        stage_flags: StageFlags::FRAGMENT,
    };
    DescriptorSetLayoutInfo {
        descriptors: vec![
            d(DescriptorType::UniformBuffer, 0),
            d(DescriptorType::Image, 1),
            d(DescriptorType::Sampler, 2),
            d(DescriptorType::CombinedImageSampler, 3),
        ],
    }
}

fn writes() -> Vec<DescriptorWrite> {
    vec![
        DescriptorWrite {
            binding: 3,
            ty: DescriptorType::CombinedImageSampler,
            payload: DescriptorPayload::CombinedImageSampler {
                image: Handle::from_raw(30),
                sampler: Handle::from_raw(31),
            },
        },
        DescriptorWrite {
            binding: 0,
            ty: DescriptorType::UniformBuffer,
            payload: DescriptorPayload::Buffer {
                buffer: Handle::from_raw(10),
                offset: 256,
                range: 64,
            },
        },
        DescriptorWrite {
            binding: 2,
            ty: DescriptorType::Sampler,
            payload: DescriptorPayload::Sampler {
                sampler: Handle::from_raw(20),
            },
        },
        DescriptorWrite {
            binding: 1,
            ty: DescriptorType::Image,
            payload: DescriptorPayload::Image {
                image: Handle::from_raw(11),
            },
        },
    ]
}

#[test]
fn test_new_set_has_typed_empty_slots() {
    let set = EmulatedDescriptorSet::new(&layout(), &HostAllocator::default()).expect("set");
    assert_eq!(set.bind_ops().len(), 4);
    for (op, d) in set.bind_ops().iter().zip(layout().descriptors) {
        assert_eq!(op.ty, d.ty);
        assert_eq!(op.binding, d.id);
        assert_eq!(op.payload, DescriptorPayload::Empty);
    }
}

#[test]
fn test_full_batch_in_any_order_fills_every_slot() {
    let mut set = EmulatedDescriptorSet::new(&layout(), &HostAllocator::default()).expect("set");
    let mut batch = writes();
    batch.reverse();
    set.apply_writes(&batch).expect("apply");
    for w in writes() {
        let op = set.slot(w.ty, w.binding).expect("slot");
        assert_eq!(op.payload, w.payload);
    }
}

#[test]
fn test_unknown_binding_fails_whole_batch_without_mutation() {
    let mut set = EmulatedDescriptorSet::new(&layout(), &HostAllocator::default()).expect("set");
    let mut batch = writes();
    batch.insert(
        2,
        DescriptorWrite {
            binding: 9,
            ty: DescriptorType::UniformBuffer,
            payload: DescriptorPayload::Buffer {
                buffer: Handle::from_raw(1),
                offset: 0,
                range: 16,
            },
        },
    );
    let err = set.apply_writes(&batch).expect_err("unknown binding");
    assert_eq!(err.code(), ErrorCode::InvalidBinding);
    assert!(set
        .bind_ops()
        .iter()
        .all(|op| op.payload == DescriptorPayload::Empty));
}

#[test]
fn test_type_mismatch_is_invalid_binding() {
    let mut set = EmulatedDescriptorSet::new(&layout(), &HostAllocator::default()).expect("set");
    let wrong_type = [DescriptorWrite {
        binding: 0,
        ty: DescriptorType::StorageBuffer,
        payload: DescriptorPayload::Buffer {
            buffer: Handle::from_raw(1),
            offset: 0,
            range: 16,
        },
    }];
    assert_eq!(
        set.apply_writes(&wrong_type).expect_err("type").code(),
        ErrorCode::InvalidBinding
    );
    let wrong_payload = [DescriptorWrite {
        binding: 1,
        ty: DescriptorType::Image,
        payload: DescriptorPayload::Sampler {
            sampler: Handle::from_raw(1),
        },
    }];
    assert_eq!(
        set.apply_writes(&wrong_payload).expect_err("payload").code(),
        ErrorCode::InvalidBinding
    );
}

#[test]
fn test_layout_validation() {
    validate_layout(&layout()).expect("valid layout");

    let mut dup = layout();
    dup.descriptors[1].id = 0;
    assert_eq!(
        validate_layout(&dup).expect_err("duplicate").code(),
        ErrorCode::InvalidBinding
    );

    let mut invisible = layout();
    invisible.descriptors[0].stage_flags = StageFlags::empty();
    assert!(validate_layout(&invisible).is_err());
}
