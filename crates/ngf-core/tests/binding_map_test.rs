//! Integration test: NativeBindingMap
//!
//! Verifies per-type native numbering across sets, combined image/sampler
//! propagation, lookup misses, and all-or-nothing construction.
//!
//! Run with: cargo test -p ngf-core --test binding_map_test

use std::alloc::Layout;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ngf_core::binding_map::NativeBindingMap;
use ngf_core::types::{
    CombinedImageSamplerEntry, CombinedImageSamplerMap, DescriptorInfo, DescriptorSetLayoutInfo,
    DescriptorType, PipelineLayoutInfo, StageFlags,
};
use ngf_core::{AllocationCallbacks, HostAllocator, NgfError};

fn desc(ty: DescriptorType, id: u32) -> DescriptorInfo {
    DescriptorInfo {
        ty,
        id,
        stage_flags: StageFlags::VERTEX | StageFlags::FRAGMENT,
    }
}

fn sample_layout() -> PipelineLayoutInfo {
    PipelineLayoutInfo {
        sets: vec![
            DescriptorSetLayoutInfo {
                descriptors: vec![
                    desc(DescriptorType::UniformBuffer, 0),
                    desc(DescriptorType::Image, 1),
                    desc(DescriptorType::Sampler, 2),
                    desc(DescriptorType::UniformBuffer, 3),
                ],
            },
            DescriptorSetLayoutInfo {
                descriptors: vec![
                    desc(DescriptorType::Sampler, 0),
                    desc(DescriptorType::UniformBuffer, 5),
                    desc(DescriptorType::StorageBuffer, 7),
                ],
            },
        ],
    }
}

#[test]
fn test_every_declared_binding_resolves() {
    let layout = sample_layout();
    let map = NativeBindingMap::build(&layout, None, None, &HostAllocator::default())
        .expect("build");
    assert_eq!(map.set_count(), 2);
    for (set, set_layout) in layout.sets.iter().enumerate() {
        for d in &set_layout.descriptors {
            let b = map
                .lookup(set as u32, d.id)
                .unwrap_or_else(|| panic!("missing ({set}, {})", d.id));
            assert_eq!(b.ty, d.ty);
            assert_eq!(b.abstract_id, d.id);
        }
    }
}

#[test]
fn test_native_ids_are_contiguous_per_type_across_sets() {
    let layout = sample_layout();
    let map = NativeBindingMap::build(&layout, None, None, &HostAllocator::default())
        .expect("build");

    let mut by_type: Vec<Vec<u32>> = vec![Vec::new(); DescriptorType::COUNT];
    for (set, set_layout) in layout.sets.iter().enumerate() {
        for d in &set_layout.descriptors {
            let b = map.lookup(set as u32, d.id).expect("lookup");
            by_type[d.ty.index()].push(b.native_id);
        }
    }
    for ids in by_type.iter().filter(|ids| !ids.is_empty()) {
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate native ids {ids:?}");
        let expected: Vec<u32> = (0..ids.len() as u32).collect();
        assert_eq!(ids, &expected);
    }
    assert_eq!(map.native_count(DescriptorType::UniformBuffer), 3);
    assert_eq!(map.native_count(DescriptorType::Sampler), 2);
    assert_eq!(map.lookup(1, 5).expect("ubo").native_id, 2);
}

#[test]
fn test_lookup_miss_returns_none() {
    let map = NativeBindingMap::build(&sample_layout(), None, None, &HostAllocator::default())
        .expect("build");
    assert!(map.lookup(0, 42).is_none());
    assert!(map.lookup(9, 0).is_none());
    assert!(map.bindings(9).is_empty());
}

#[test]
fn test_combined_image_sampler_ids_are_attached() {
    let images = CombinedImageSamplerMap {
        entries: vec![CombinedImageSamplerEntry {
            set: 0,
            binding: 1,
            combined_ids: vec![4, 5],
        }],
    };
    let samplers = CombinedImageSamplerMap {
        entries: vec![
            CombinedImageSamplerEntry {
                set: 0,
                binding: 2,
                combined_ids: vec![4],
            },
            CombinedImageSamplerEntry {
                set: 1,
                binding: 0,
                combined_ids: vec![5],
            },
        ],
    };
    let map = NativeBindingMap::build(
        &sample_layout(),
        Some(&images),
        Some(&samplers),
        &HostAllocator::default(),
    )
    .expect("build");

    assert_eq!(map.lookup(0, 1).expect("image").combined_ids, vec![4, 5]);
    assert_eq!(map.lookup(0, 2).expect("sampler").combined_ids, vec![4]);
    assert_eq!(map.lookup(1, 0).expect("sampler").combined_ids, vec![5]);
    assert!(map.lookup(0, 0).expect("ubo").combined_ids.is_empty());
}

/// Grants a fixed number of allocations, then refuses. Tracks balance.
struct Budget {
    remaining: AtomicUsize,
    live: AtomicUsize,
}

impl AllocationCallbacks for Budget {
    fn allocate(&self, _layout: Layout) -> bool {
        let ok = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok();
        if ok {
            self.live.fetch_add(1, Ordering::SeqCst);
        }
        ok
    }

    fn free(&self, _layout: Layout) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn test_failed_construction_releases_everything() {
    for budget in 0..3 {
        let cb = Arc::new(Budget {
            remaining: AtomicUsize::new(budget),
            live: AtomicUsize::new(0),
        });
        let host = HostAllocator::new(Some(cb.clone()));
        let result = NativeBindingMap::build(&sample_layout(), None, None, &host);
        assert!(matches!(result, Err(NgfError::OutOfMemory)), "budget {budget}");
        assert_eq!(cb.live.load(Ordering::SeqCst), 0, "leak at budget {budget}");
    }

    let cb = Arc::new(Budget {
        remaining: AtomicUsize::new(100),
        live: AtomicUsize::new(0),
    });
    let host = HostAllocator::new(Some(cb.clone()));
    let map = NativeBindingMap::build(&sample_layout(), None, None, &host).expect("build");
    assert_eq!(cb.live.load(Ordering::SeqCst), 3);
    drop(map);
    assert_eq!(cb.live.load(Ordering::SeqCst), 0);
}
