//! Translation of `(set, binding)` coordinates to native binding slots.
//!
//! Backends with flat per-type binding spaces (OpenGL) have no notion of
//! descriptor sets. The map assigns every abstract binding a native index
//! from a running per-type counter, so e.g. all uniform buffers across all
//! sets share one contiguous range. Separate images and samplers that the
//! shader sees as combined samplers also carry the list of combined native
//! slots they feed.

use crate::alloc::{HostAllocation, HostAllocator};
use crate::error::Result;
use crate::types::{CombinedImageSamplerMap, DescriptorType, PipelineLayoutInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBinding {
    pub abstract_id: u32,
    pub native_id: u32,
    pub ty: DescriptorType,
    /// Combined image/sampler slots that must be updated alongside this one.
    pub combined_ids: Vec<u32>,
}

#[derive(Debug)]
pub struct NativeBindingMap {
    sets: Vec<Vec<NativeBinding>>,
    totals: [u32; DescriptorType::COUNT],
    _reservations: Vec<HostAllocation>,
}

impl NativeBindingMap {
    /// Build the map for `layout`. Any refused host allocation drops what was
    /// built so far and returns `OutOfMemory`.
    pub fn build(
        layout: &PipelineLayoutInfo,
        images_to_combined: Option<&CombinedImageSamplerMap>,
        samplers_to_combined: Option<&CombinedImageSamplerMap>,
        host: &HostAllocator,
    ) -> Result<Self> {
        let mut reservations = Vec::with_capacity(layout.sets.len() + 1);
        reservations.push(host.reserve_array::<Vec<NativeBinding>>(layout.sets.len())?);

        let mut totals = [0u32; DescriptorType::COUNT];
        let mut sets = Vec::with_capacity(layout.sets.len());
        for (set_idx, set_layout) in layout.sets.iter().enumerate() {
            let set_idx = set_idx as u32;
            reservations.push(host.reserve_array::<NativeBinding>(set_layout.descriptors.len())?);
            let mut bindings = Vec::with_capacity(set_layout.descriptors.len());
            for desc in &set_layout.descriptors {
                let counter = &mut totals[desc.ty.index()];
                let native_id = *counter;
                *counter += 1;

                let combined_map = match desc.ty {
                    DescriptorType::Image => images_to_combined,
                    DescriptorType::Sampler => samplers_to_combined,
                    _ => None,
                };
                let combined_ids = match combined_map.and_then(|m| m.find(set_idx, desc.id)) {
                    Some(entry) => {
                        reservations.push(host.reserve_array::<u32>(entry.combined_ids.len())?);
                        entry.combined_ids.clone()
                    }
                    None => Vec::new(),
                };
                bindings.push(NativeBinding {
                    abstract_id: desc.id,
                    native_id,
                    ty: desc.ty,
                    combined_ids,
                });
            }
            sets.push(bindings);
        }

        tracing::trace!(sets = sets.len(), ?totals, "built native binding map");
        Ok(Self {
            sets,
            totals,
            _reservations: reservations,
        })
    }

    /// Linear scan of `set` for `binding`.
    pub fn lookup(&self, set: u32, binding: u32) -> Option<&NativeBinding> {
        self.sets
            .get(set as usize)?
            .iter()
            .find(|b| b.abstract_id == binding)
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn bindings(&self, set: u32) -> &[NativeBinding] {
        self.sets.get(set as usize).map_or(&[], |s| s.as_slice())
    }

    /// Number of native slots of type `ty` the map uses.
    pub fn native_count(&self, ty: DescriptorType) -> u32 {
        self.totals[ty.index()]
    }
}
