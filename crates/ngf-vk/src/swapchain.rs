//! Presentable surface and swapchain.

use std::ffi::CStr;

use ash::vk;
use ngf_core::types::{
    AttachmentDescription, AttachmentType, ImageFormat, LoadOp, SampleCount, StoreOp,
    SwapchainInfo,
};
use ngf_core::{NgfError, Result};

use crate::convert;
use crate::device::VkShared;
use crate::memory::Allocation;
use crate::pass::create_render_pass;
use crate::vk_err;

/// Window-system glue: creates the `VkSurfaceKHR` a context presents to.
pub trait SurfaceSource: Send {
    /// Platform surface extensions (`VK_KHR_surface` is added implicitly).
    fn instance_extensions(&self) -> Vec<&'static CStr>;

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance)
        -> Result<vk::SurfaceKHR>;
}

struct DepthBuffer {
    image: vk::Image,
    view: vk::ImageView,
    memory: Allocation,
}

pub(crate) struct Swapchain {
    surface: vk::SurfaceKHR,
    raw: vk::SwapchainKHR,
    info: SwapchainInfo,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    render_pass: vk::RenderPass,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Option<DepthBuffer>,
    framebuffers: Vec<vk::Framebuffer>,
    /// One per image, handed out round-robin at acquire.
    acquire_semaphores: Vec<vk::Semaphore>,
    next_semaphore: usize,
}

impl Swapchain {
    /// Takes ownership of `surface`; it is destroyed on failure.
    pub fn new(shared: &VkShared, surface: vk::SurfaceKHR, info: &SwapchainInfo) -> Result<Self> {
        let setup = match Self::negotiate(shared, surface, info) {
            Ok(setup) => setup,
            Err(e) => {
                unsafe { shared.surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };
        let (caps, format, present_mode, extent, render_pass) = setup;
        let mut swapchain = Swapchain {
            surface,
            raw: vk::SwapchainKHR::null(),
            info: *info,
            format,
            present_mode,
            extent,
            render_pass,
            images: Vec::new(),
            views: Vec::new(),
            depth: None,
            framebuffers: Vec::new(),
            acquire_semaphores: Vec::new(),
            next_semaphore: 0,
        };
        if let Err(e) = swapchain.build(shared, caps) {
            swapchain.destroy(shared);
            return Err(e);
        }
        Ok(swapchain)
    }

    #[allow(clippy::type_complexity)]
    fn negotiate(
        shared: &VkShared,
        surface: vk::SurfaceKHR,
        info: &SwapchainInfo,
    ) -> Result<(
        vk::SurfaceCapabilitiesKHR,
        vk::SurfaceFormatKHR,
        vk::PresentModeKHR,
        vk::Extent2D,
        vk::RenderPass,
    )> {
        let loader = &shared.surface_loader;
        let pd = shared.physical_device;
        let caps = unsafe { loader.get_physical_device_surface_capabilities(pd, surface) }
            .map_err(vk_err)?;
        let formats =
            unsafe { loader.get_physical_device_surface_formats(pd, surface) }.map_err(vk_err)?;
        let modes = unsafe { loader.get_physical_device_surface_present_modes(pd, surface) }
            .map_err(vk_err)?;

        let format = choose_format(&formats, convert::format(info.color_format))?;
        let present_mode = choose_present_mode(&modes, convert::present_mode(info.present_mode));
        let extent = choose_extent(&caps, info.width, info.height);

        let mut pass_attachments = vec![(color_attachment(info), format.format)];
        if let Some(depth) = info.depth_format {
            pass_attachments.push((depth_attachment(depth), convert::format(depth)));
        }
        let render_pass = create_render_pass(&shared.device, &pass_attachments, true)?;
        Ok((caps, format, present_mode, extent, render_pass))
    }

    /// Attachments of the render target that draws into the swapchain.
    pub fn attachments(&self) -> Vec<AttachmentDescription> {
        let mut out = vec![color_attachment(&self.info)];
        if let Some(depth) = self.info.depth_format {
            out.push(depth_attachment(depth));
        }
        out
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    fn build(&mut self, shared: &VkShared, caps: vk::SurfaceCapabilitiesKHR) -> Result<()> {
        let loader = shared
            .swapchain_loader
            .as_ref()
            .ok_or_else(|| NgfError::Unsupported("device cannot present".into()))?;
        let image_count = choose_image_count(&caps, self.info.capacity_hint);
        let composite_alpha = if caps
            .supported_composite_alpha
            .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
        {
            vk::CompositeAlphaFlagsKHR::OPAQUE
        } else {
            vk::CompositeAlphaFlagsKHR::INHERIT
        };
        let old = self.raw;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old);
        let raw = unsafe { loader.create_swapchain(&create_info, None) }.map_err(vk_err)?;
        if old != vk::SwapchainKHR::null() {
            unsafe { loader.destroy_swapchain(old, None) };
        }
        self.raw = raw;
        self.images = unsafe { loader.get_swapchain_images(raw) }.map_err(vk_err)?;

        let device = &shared.device;
        for &image in &self.images {
            let view = create_view(device, image, self.format.format, vk::ImageAspectFlags::COLOR)?;
            self.views.push(view);
        }
        if let Some(depth) = self.info.depth_format {
            self.depth = Some(create_depth(shared, depth, self.extent)?);
        }
        for &view in &self.views {
            let mut attachments = vec![view];
            if let Some(depth) = &self.depth {
                attachments.push(depth.view);
            }
            let fb_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let fb = unsafe { device.create_framebuffer(&fb_info, None) }.map_err(vk_err)?;
            self.framebuffers.push(fb);
        }
        for _ in 0..self.images.len() {
            let semaphore =
                unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                    .map_err(vk_err)?;
            self.acquire_semaphores.push(semaphore);
        }
        self.next_semaphore = 0;
        tracing::debug!(
            images = self.images.len(),
            width = self.extent.width,
            height = self.extent.height,
            mode = ?self.present_mode,
            "swapchain built"
        );
        Ok(())
    }

    /// Destroy the per-image resources, keeping the swapchain itself and
    /// its render pass.
    fn release_images(&mut self, shared: &VkShared) {
        let device = &shared.device;
        unsafe {
            for fb in self.framebuffers.drain(..) {
                device.destroy_framebuffer(fb, None);
            }
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if let Some(depth) = self.depth.take() {
                device.destroy_image_view(depth.view, None);
                device.destroy_image(depth.image, None);
                depth.memory.free(device);
            }
            for semaphore in self.acquire_semaphores.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
        }
        self.images.clear();
    }

    /// Rebuild for a new size. The caller has drained in-flight frames.
    pub fn resize(&mut self, shared: &VkShared, width: u32, height: u32) -> Result<()> {
        self.release_images(shared);
        let caps = unsafe {
            shared
                .surface_loader
                .get_physical_device_surface_capabilities(shared.physical_device, self.surface)
        }
        .map_err(vk_err)?;
        self.info.width = width;
        self.info.height = height;
        self.extent = choose_extent(&caps, width, height);
        self.build(shared, caps)
    }

    /// Acquire the next image. Returns its index and the semaphore that is
    /// signalled once it may be rendered to.
    pub fn acquire(&mut self, shared: &VkShared, timeout_ns: u64) -> Result<(u32, vk::Semaphore)> {
        let loader = shared
            .swapchain_loader
            .as_ref()
            .ok_or_else(|| NgfError::Unsupported("device cannot present".into()))?;
        let semaphore = *self
            .acquire_semaphores
            .get(self.next_semaphore)
            .ok_or_else(|| NgfError::invalid_op("swapchain has no images"))?;
        self.next_semaphore = (self.next_semaphore + 1) % self.acquire_semaphores.len();
        let (index, suboptimal) = unsafe {
            loader.acquire_next_image(self.raw, timeout_ns, semaphore, vk::Fence::null())
        }
        .map_err(vk_err)?;
        if suboptimal {
            tracing::debug!("swapchain suboptimal for surface");
        }
        Ok((index, semaphore))
    }

    pub fn present(
        &self,
        shared: &VkShared,
        image_index: u32,
        wait: &[vk::Semaphore],
    ) -> Result<()> {
        let loader = shared
            .swapchain_loader
            .as_ref()
            .ok_or_else(|| NgfError::Unsupported("device cannot present".into()))?;
        let swapchains = [self.raw];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let queue = shared.queue.lock();
        match unsafe { loader.queue_present(*queue, &info) } {
            Ok(_) => Ok(()),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                tracing::warn!("swapchain out of date; waiting for resize");
                Ok(())
            }
            Err(e) => Err(vk_err(e)),
        }
    }

    pub fn destroy(&mut self, shared: &VkShared) {
        self.release_images(shared);
        unsafe {
            if let Some(loader) = shared.swapchain_loader.as_ref() {
                if self.raw != vk::SwapchainKHR::null() {
                    loader.destroy_swapchain(self.raw, None);
                }
            }
            shared.device.destroy_render_pass(self.render_pass, None);
            shared.surface_loader.destroy_surface(self.surface, None);
        }
        self.raw = vk::SwapchainKHR::null();
    }
}

// Swapchain images are single-sampled; the requested sample count is not
// resolved here.
fn color_attachment(info: &SwapchainInfo) -> AttachmentDescription {
    AttachmentDescription {
        ty: AttachmentType::Color,
        format: info.color_format,
        sample_count: SampleCount::S1,
        is_sampled: false,
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
    }
}

fn depth_attachment(format: ImageFormat) -> AttachmentDescription {
    AttachmentDescription {
        ty: if format.has_stencil() {
            AttachmentType::DepthStencil
        } else {
            AttachmentType::Depth
        },
        format,
        sample_count: SampleCount::S1,
        is_sampled: false,
        load_op: LoadOp::Clear,
        store_op: StoreOp::DontCare,
    }
}

fn choose_format(
    formats: &[vk::SurfaceFormatKHR],
    wanted: vk::Format,
) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| NgfError::Unsupported("surface reports no formats".into()))
}

fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    wanted: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&wanted) {
        wanted
    } else {
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, hint: u32) -> u32 {
    let count = hint.max(caps.min_image_count + 1);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub(crate) fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&info, None) }.map_err(vk_err)
}

fn create_depth(
    shared: &VkShared,
    format: ImageFormat,
    extent: vk::Extent2D,
) -> Result<DepthBuffer> {
    let device = &shared.device;
    let vk_format = convert::format(format);
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk_format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { device.create_image(&info, None) }.map_err(vk_err)?;
    let reqs = unsafe { device.get_image_memory_requirements(image) };
    let memory = match Allocation::allocate(
        device,
        &shared.memory_props,
        reqs,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::MemoryPropertyFlags::empty(),
    ) {
        Ok(m) => m,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };
    let bound = unsafe { device.bind_image_memory(image, memory.memory, 0) }.map_err(vk_err);
    let view = bound.and_then(|_| create_view(device, image, vk_format, convert::aspect(format)));
    match view {
        Ok(view) => Ok(DepthBuffer {
            image,
            view,
            memory,
        }),
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            memory.free(device);
            Err(e)
        }
    }
}
