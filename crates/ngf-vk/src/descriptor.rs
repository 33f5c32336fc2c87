//! Descriptor pool management and native descriptor writes.

use ash::vk;
use ngf_core::descriptor::{DescriptorPayload, DescriptorWrite};
use ngf_core::types::{DescriptorSetLayoutInfo, DescriptorType};
use ngf_core::{NgfError, Result};

use crate::convert;
use crate::device::VkShared;
use crate::vk_err;

const SETS_PER_POOL: u32 = 64;
const DESCRIPTORS_PER_TYPE: u32 = SETS_PER_POOL * 4;

/// Grows by whole pools; sets are freed back to the pool they came from.
#[derive(Default)]
pub(crate) struct DescriptorPools {
    pools: Vec<vk::DescriptorPool>,
}

impl DescriptorPools {
    pub fn allocate(
        &mut self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<(vk::DescriptorPool, vk::DescriptorSet)> {
        let layouts = [layout];
        // Newest pool first; older ones only have room if sets were freed.
        for &pool in self.pools.iter().rev() {
            match allocate_from(device, pool, &layouts) {
                Ok(set) => return Ok((pool, set)),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                    continue
                }
                Err(e) => return Err(vk_err(e)),
            }
        }
        let pool = create_pool(device)?;
        self.pools.push(pool);
        tracing::debug!(pools = self.pools.len(), "descriptor pool added");
        let set = allocate_from(device, pool, &layouts).map_err(vk_err)?;
        Ok((pool, set))
    }

    pub fn free(&mut self, device: &ash::Device, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        if let Err(e) = unsafe { device.free_descriptor_sets(pool, &[set]) } {
            tracing::warn!(error = ?e, "failed to free descriptor set");
        }
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }
}

fn allocate_from(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layouts: &[vk::DescriptorSetLayout],
) -> std::result::Result<vk::DescriptorSet, vk::Result> {
    let info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(layouts);
    let sets = unsafe { device.allocate_descriptor_sets(&info) }?;
    sets.into_iter()
        .next()
        .ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
}

fn create_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let sizes: Vec<vk::DescriptorPoolSize> = [
        DescriptorType::UniformBuffer,
        DescriptorType::StorageBuffer,
        DescriptorType::LoadStoreImage,
        DescriptorType::Image,
        DescriptorType::Sampler,
        DescriptorType::CombinedImageSampler,
    ]
    .into_iter()
    .map(|ty| vk::DescriptorPoolSize {
        ty: convert::descriptor_type(ty),
        descriptor_count: DESCRIPTORS_PER_TYPE,
    })
    .collect();
    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(SETS_PER_POOL)
        .pool_sizes(&sizes);
    unsafe { device.create_descriptor_pool(&info, None) }.map_err(vk_err)
}

pub(crate) fn create_set_layout(
    device: &ash::Device,
    info: &DescriptorSetLayoutInfo,
) -> Result<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = info
        .descriptors
        .iter()
        .map(|d| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(d.id)
                .descriptor_type(convert::descriptor_type(d.ty))
                .descriptor_count(1)
                .stage_flags(convert::stage_flags(d.stage_flags))
        })
        .collect();
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&create_info, None) }.map_err(vk_err)
}

enum Resolved {
    Buffer(usize),
    Image(usize),
}

/// Resolve `writes` against the object registries. Fails without side
/// effects if a referenced object does not exist.
pub(crate) struct NativeWrites {
    buffers: Vec<vk::DescriptorBufferInfo>,
    images: Vec<vk::DescriptorImageInfo>,
    entries: Vec<(u32, vk::DescriptorType, Resolved)>,
}

impl NativeWrites {
    pub fn resolve(shared: &VkShared, writes: &[DescriptorWrite]) -> Result<Self> {
        let mut out = NativeWrites {
            buffers: Vec::new(),
            images: Vec::new(),
            entries: Vec::with_capacity(writes.len()),
        };
        for write in writes {
            let resolved = match write.payload {
                DescriptorPayload::Empty => continue,
                DescriptorPayload::Buffer {
                    buffer,
                    offset,
                    range,
                } => {
                    let raw = shared
                        .buffers
                        .get(&buffer)
                        .map(|b| b.raw)
                        .ok_or(NgfError::InvalidHandle(buffer))?;
                    out.buffers.push(vk::DescriptorBufferInfo {
                        buffer: raw,
                        offset,
                        range,
                    });
                    Resolved::Buffer(out.buffers.len() - 1)
                }
                DescriptorPayload::Image { image } => {
                    let view = image_view(shared, image)?;
                    let layout = if write.ty == DescriptorType::LoadStoreImage {
                        vk::ImageLayout::GENERAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    };
                    out.images.push(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: view,
                        image_layout: layout,
                    });
                    Resolved::Image(out.images.len() - 1)
                }
                DescriptorPayload::Sampler { sampler } => {
                    let raw = sampler_raw(shared, sampler)?;
                    out.images.push(vk::DescriptorImageInfo {
                        sampler: raw,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    });
                    Resolved::Image(out.images.len() - 1)
                }
                DescriptorPayload::CombinedImageSampler { image, sampler } => {
                    let view = image_view(shared, image)?;
                    let raw = sampler_raw(shared, sampler)?;
                    out.images.push(vk::DescriptorImageInfo {
                        sampler: raw,
                        image_view: view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    });
                    Resolved::Image(out.images.len() - 1)
                }
            };
            out.entries
                .push((write.binding, convert::descriptor_type(write.ty), resolved));
        }
        Ok(out)
    }

    pub fn apply(&self, device: &ash::Device, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .entries
            .iter()
            .map(|(binding, ty, resolved)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty);
                match resolved {
                    Resolved::Buffer(i) => {
                        write.buffer_info(std::slice::from_ref(&self.buffers[*i]))
                    }
                    Resolved::Image(i) => write.image_info(std::slice::from_ref(&self.images[*i])),
                }
            })
            .collect();
        if !writes.is_empty() {
            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }
    }
}

fn image_view(shared: &VkShared, image: ngf_core::Handle) -> Result<vk::ImageView> {
    shared
        .images
        .get(&image)
        .map(|i| i.view)
        .ok_or(NgfError::InvalidHandle(image))
}

fn sampler_raw(shared: &VkShared, sampler: ngf_core::Handle) -> Result<vk::Sampler> {
    shared
        .samplers
        .get(&sampler)
        .map(|s| *s)
        .ok_or(NgfError::InvalidHandle(sampler))
}
