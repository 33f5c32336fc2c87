//! Descriptor set emulation.
//!
//! A set is an array of bind operations parallel to its layout. Writes are
//! matched to slots by `(type, binding)`; the whole batch is checked before
//! any slot is touched, so a failed batch leaves the set unchanged.

use std::collections::HashSet;

use crate::alloc::{HostAllocation, HostAllocator};
use crate::error::{NgfError, Result};
use crate::handle::Handle;
use crate::types::{DescriptorSetLayoutInfo, DescriptorType};

/// Check a set layout before any backend object is created from it.
pub fn validate_layout(info: &DescriptorSetLayoutInfo) -> Result<()> {
    let mut seen = HashSet::with_capacity(info.descriptors.len());
    for desc in &info.descriptors {
        if !seen.insert(desc.id) {
            return Err(NgfError::InvalidBinding(format!(
                "binding {} declared more than once in set layout",
                desc.id
            )));
        }
        if desc.stage_flags.is_empty() {
            return Err(NgfError::InvalidBinding(format!(
                "binding {} is not visible to any shader stage",
                desc.id
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum DescriptorPayload {
    #[default]
    Empty,
    Buffer {
        buffer: Handle,
        offset: u64,
        range: u64,
    },
    Image {
        image: Handle,
    },
    Sampler {
        sampler: Handle,
    },
    CombinedImageSampler {
        image: Handle,
        sampler: Handle,
    },
}

impl DescriptorPayload {
    fn fits(&self, ty: DescriptorType) -> bool {
        matches!(
            (ty, self),
            (DescriptorType::UniformBuffer, DescriptorPayload::Buffer { .. })
                | (DescriptorType::StorageBuffer, DescriptorPayload::Buffer { .. })
                | (DescriptorType::LoadStoreImage, DescriptorPayload::Image { .. })
                | (DescriptorType::Image, DescriptorPayload::Image { .. })
                | (DescriptorType::Sampler, DescriptorPayload::Sampler { .. })
                | (
                    DescriptorType::CombinedImageSampler,
                    DescriptorPayload::CombinedImageSampler { .. }
                )
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub ty: DescriptorType,
    pub payload: DescriptorPayload,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindOp {
    pub ty: DescriptorType,
    pub binding: u32,
    pub payload: DescriptorPayload,
}

#[derive(Debug)]
pub struct EmulatedDescriptorSet {
    ops: Vec<BindOp>,
    _reservation: HostAllocation,
}

impl EmulatedDescriptorSet {
    /// Pre-populate one empty slot per declared descriptor.
    pub fn new(layout: &DescriptorSetLayoutInfo, host: &HostAllocator) -> Result<Self> {
        let reservation = host.reserve_array::<BindOp>(layout.descriptors.len())?;
        let ops = layout
            .descriptors
            .iter()
            .map(|d| BindOp {
                ty: d.ty,
                binding: d.id,
                payload: DescriptorPayload::Empty,
            })
            .collect();
        Ok(Self {
            ops,
            _reservation: reservation,
        })
    }

    fn slot_of(&self, write: &DescriptorWrite) -> Option<usize> {
        self.ops
            .iter()
            .position(|op| op.ty == write.ty && op.binding == write.binding)
    }

    /// Apply `writes`. If any write names a slot the layout lacks, or carries
    /// a payload of the wrong kind, nothing is applied.
    pub fn apply_writes(&mut self, writes: &[DescriptorWrite]) -> Result<()> {
        let mut targets = Vec::with_capacity(writes.len());
        for write in writes {
            let slot = self.slot_of(write).ok_or_else(|| {
                NgfError::InvalidBinding(format!(
                    "no {:?} slot at binding {} in descriptor set",
                    write.ty, write.binding
                ))
            })?;
            if !write.payload.fits(write.ty) {
                return Err(NgfError::InvalidBinding(format!(
                    "payload {:?} does not fit {:?} binding {}",
                    write.payload, write.ty, write.binding
                )));
            }
            targets.push(slot);
        }
        for (slot, write) in targets.into_iter().zip(writes) {
            self.ops[slot] = BindOp {
                ty: write.ty,
                binding: write.binding,
                payload: write.payload,
            };
        }
        Ok(())
    }

    pub fn bind_ops(&self) -> &[BindOp] {
        &self.ops
    }

    pub fn slot(&self, ty: DescriptorType, binding: u32) -> Option<&BindOp> {
        self.ops
            .iter()
            .find(|op| op.ty == ty && op.binding == binding)
    }
}
