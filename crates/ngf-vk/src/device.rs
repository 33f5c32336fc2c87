//! Instance, device and the object registries shared between contexts.

use std::ffi::{c_char, CStr, CString};

use ash::vk;
use dashmap::DashMap;
use ngf_core::types::{BackendKind, DevicePreference};
use ngf_core::{DeviceCapabilities, Handle, HostAllocator, NgfConfig, NgfError, Result};
use parking_lot::Mutex;

use crate::descriptor::DescriptorPools;
use crate::objects::{
    VkBuffer, VkCmdBuffer, VkDescriptorSet, VkImage, VkPipeline, VkRenderTarget, VkSetLayout,
    VkShaderStage,
};
use crate::swapchain::SurfaceSource;
use crate::vk_err;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device-level state. Contexts created with `shared_with` hold the same
/// `Arc<VkShared>` and see the same objects.
pub struct VkShared {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) swapchain_loader: Option<ash::khr::swapchain::Device>,
    pub(crate) queue_family: u32,
    /// Queue submission and present are externally synchronized.
    pub(crate) queue: Mutex<vk::Queue>,
    pub(crate) memory_props: vk::PhysicalDeviceMemoryProperties,
    pub(crate) caps: DeviceCapabilities,
    pub(crate) host: HostAllocator,

    pub(crate) buffers: DashMap<Handle, VkBuffer>,
    pub(crate) images: DashMap<Handle, VkImage>,
    pub(crate) samplers: DashMap<Handle, vk::Sampler>,
    pub(crate) shader_stages: DashMap<Handle, VkShaderStage>,
    pub(crate) pipelines: DashMap<Handle, VkPipeline>,
    pub(crate) render_targets: DashMap<Handle, VkRenderTarget>,
    pub(crate) set_layouts: DashMap<Handle, VkSetLayout>,
    pub(crate) descriptor_sets: DashMap<Handle, VkDescriptorSet>,
    pub(crate) cmd_buffers: DashMap<Handle, VkCmdBuffer>,
    pub(crate) descriptor_pools: Mutex<DescriptorPools>,
}

/// A freshly created device plus the surface made for the first context.
pub(crate) struct CreatedDevice {
    pub shared: VkShared,
    pub surface: Option<vk::SurfaceKHR>,
}

impl VkShared {
    pub(crate) fn create(
        config: &NgfConfig,
        preference: DevicePreference,
        surface_source: Option<&dyn SurfaceSource>,
        host: HostAllocator,
    ) -> Result<CreatedDevice> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| NgfError::Unsupported(format!("Vulkan loader not available: {e}")))?;
        let instance = create_instance(&entry, config, surface_source)?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let surface = match surface_source {
            Some(source) => match source.create_surface(&entry, &instance) {
                Ok(surface) => Some(surface),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            },
            None => None,
        };

        let picked = pick_physical_device(&instance, &surface_loader, surface, preference);
        let (physical_device, queue_family) = match picked {
            Ok(p) => p,
            Err(e) => {
                unsafe {
                    if let Some(surface) = surface {
                        surface_loader.destroy_surface(surface, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let (device, has_swapchain) =
            match create_device(&instance, physical_device, queue_family) {
                Ok(d) => d,
                Err(e) => {
                    unsafe {
                        if let Some(surface) = surface {
                            surface_loader.destroy_surface(surface, None);
                        }
                        instance.destroy_instance(None);
                    }
                    return Err(e);
                }
            };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader =
            has_swapchain.then(|| ash::khr::swapchain::Device::new(&instance, &device));
        let memory_props =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let caps = probe_capabilities(&instance, physical_device);

        tracing::info!(
            device = %caps.device_name,
            discrete = caps.is_discrete,
            queue_family,
            "Vulkan device created"
        );

        Ok(CreatedDevice {
            shared: VkShared {
                entry,
                instance,
                surface_loader,
                physical_device,
                device,
                swapchain_loader,
                queue_family,
                queue: Mutex::new(queue),
                memory_props,
                caps,
                host,
                buffers: DashMap::new(),
                images: DashMap::new(),
                samplers: DashMap::new(),
                shader_stages: DashMap::new(),
                pipelines: DashMap::new(),
                render_targets: DashMap::new(),
                set_layouts: DashMap::new(),
                descriptor_sets: DashMap::new(),
                cmd_buffers: DashMap::new(),
                descriptor_pools: Mutex::new(DescriptorPools::default()),
            },
            surface,
        })
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    pub(crate) fn wait_idle(&self) {
        let _queue = self.queue.lock();
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            tracing::warn!(error = ?e, "device_wait_idle failed");
        }
    }
}

impl Drop for VkShared {
    fn drop(&mut self) {
        self.wait_idle();
        // Command pools go first; they hold device function tables only.
        self.cmd_buffers.clear();
        let device = &self.device;
        let leaked = self.buffers.len()
            + self.images.len()
            + self.samplers.len()
            + self.pipelines.len()
            + self.render_targets.len();
        if leaked > 0 {
            tracing::warn!(leaked, "destroying Vulkan device with live objects");
        }
        unsafe {
            // Sets go with their pools.
            self.descriptor_sets.clear();
            self.descriptor_pools.lock().destroy(device);
            for (_, layout) in std::mem::take(&mut self.set_layouts) {
                device.destroy_descriptor_set_layout(layout.raw, None);
            }
            for (_, p) in std::mem::take(&mut self.pipelines) {
                device.destroy_pipeline(p.raw, None);
                device.destroy_pipeline_layout(p.layout, None);
                for layout in p.owned_set_layouts {
                    device.destroy_descriptor_set_layout(layout, None);
                }
            }
            for (_, rt) in std::mem::take(&mut self.render_targets) {
                // Swapchain targets were removed by their context.
                rt.destroy(device);
            }
            for (_, stage) in std::mem::take(&mut self.shader_stages) {
                device.destroy_shader_module(stage.module, None);
            }
            for (_, sampler) in std::mem::take(&mut self.samplers) {
                device.destroy_sampler(sampler, None);
            }
            for (_, image) in std::mem::take(&mut self.images) {
                device.destroy_image_view(image.view, None);
                device.destroy_image(image.raw, None);
                if let Some(memory) = image.memory {
                    memory.free(device);
                }
            }
            for (_, buffer) in std::mem::take(&mut self.buffers) {
                device.destroy_buffer(buffer.raw, None);
                buffer.memory.free(device);
            }
            device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        tracing::debug!("Vulkan device destroyed");
    }
}

fn create_instance(
    entry: &ash::Entry,
    config: &NgfConfig,
    surface_source: Option<&dyn SurfaceSource>,
) -> Result<ash::Instance> {
    let app_name = CString::new(config.vulkan.application_name.as_str())
        .map_err(|_| NgfError::Config("vulkan.application_name contains a NUL byte".into()))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(app_name.as_c_str())
        .application_version(0)
        .engine_name(c"ngf")
        .engine_version(0)
        .api_version(vk::make_api_version(0, 1, 1, 0));

    let mut extensions: Vec<*const c_char> = Vec::new();
    if let Some(source) = surface_source {
        extensions.push(ash::khr::surface::NAME.as_ptr());
        extensions.extend(source.instance_extensions().iter().map(|e| e.as_ptr()));
    }

    let mut layers: Vec<*const c_char> = Vec::new();
    if config.vulkan.validation {
        let available = unsafe { entry.enumerate_instance_layer_properties() }.map_err(vk_err)?;
        let present = available.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER
        });
        if present {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);
    unsafe { entry.create_instance(&create_info, None) }.map_err(vk_err)
}

fn device_type_rank(ty: vk::PhysicalDeviceType, preference: DevicePreference) -> u32 {
    let wanted = match preference {
        DevicePreference::Discrete => vk::PhysicalDeviceType::DISCRETE_GPU,
        DevicePreference::Integrated => vk::PhysicalDeviceType::INTEGRATED_GPU,
        DevicePreference::DontCare => return 0,
    };
    u32::from(ty != wanted)
}

fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: Option<vk::SurfaceKHR>,
    preference: DevicePreference,
) -> Result<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(vk_err)?;
    let mut best: Option<(u32, vk::PhysicalDevice, u32)> = None;
    for pd in devices {
        let props = unsafe { instance.get_physical_device_properties(pd) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(pd) };
        let family = families.iter().enumerate().find_map(|(i, f)| {
            let index = i as u32;
            if !f.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                return None;
            }
            let presents = match surface {
                Some(surface) => unsafe {
                    surface_loader
                        .get_physical_device_surface_support(pd, index, surface)
                        .unwrap_or(false)
                },
                None => true,
            };
            presents.then_some(index)
        });
        let Some(family) = family else {
            continue;
        };
        let rank = device_type_rank(props.device_type, preference);
        match best {
            Some((r, _, _)) if r <= rank => {}
            _ => best = Some((rank, pd, family)),
        }
    }
    best.map(|(_, pd, family)| (pd, family)).ok_or_else(|| {
        NgfError::Unsupported("no Vulkan device with a usable graphics queue".into())
    })
}

fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<(ash::Device, bool)> {
    let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .map_err(vk_err)?;
    let has_swapchain = available.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    });
    let mut extensions: Vec<*const c_char> = Vec::new();
    if has_swapchain {
        extensions.push(ash::khr::swapchain::NAME.as_ptr());
    }

    let supported = unsafe { instance.get_physical_device_features(physical_device) };
    let features = vk::PhysicalDeviceFeatures::default()
        .tessellation_shader(supported.tessellation_shader == vk::TRUE)
        .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
        .wide_lines(supported.wide_lines == vk::TRUE)
        .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE);

    let priorities = [1.0f32];
    let queue_info = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&priorities)];
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_info)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);
    let device =
        unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(vk_err)?;
    Ok((device, has_swapchain))
}

fn probe_capabilities(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> DeviceCapabilities {
    let props = unsafe { instance.get_physical_device_properties(physical_device) };
    let features = unsafe { instance.get_physical_device_features(physical_device) };
    let device_name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let limits = &props.limits;
    DeviceCapabilities {
        backend: BackendKind::Vulkan,
        device_name,
        is_discrete: props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
        max_uniform_buffer_bindings: limits.max_descriptor_set_uniform_buffers,
        max_storage_buffer_bindings: limits.max_descriptor_set_storage_buffers,
        max_texture_units: limits.max_descriptor_set_sampled_images,
        max_sampler_units: limits.max_descriptor_set_samplers,
        max_vertex_input_attributes: limits.max_vertex_input_attributes,
        uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
        max_viewport_dims: limits.max_viewport_dimensions,
        max_framebuffer_extent: [limits.max_framebuffer_width, limits.max_framebuffer_height],
        max_line_width: limits.line_width_range[1],
        supports_tessellation: features.tessellation_shader == vk::TRUE,
        supports_native_descriptor_sets: true,
    }
}
